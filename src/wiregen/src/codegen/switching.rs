use std::collections::HashMap;
use std::mem;

use proc_macro2::{Literal, Span, TokenStream};
use quote::quote;
use syn::Ident;
use tracing::debug;

use crate::graph::{ComponentId, Key};
use crate::output::{FieldSpec, Location, MethodSpec, Receiver, TypeSpec};

use super::{GenerationError, Generator};

/// Per-component switching-provider builders.
///
/// Each builder owns a monotonically-growing Key → switch-id table and the
/// pending case fragments; a new builder (and thus a new generated dispatch
/// class) starts once the current one reaches the configured ceiling.
#[derive(Debug, Default)]
pub(crate) struct SwitchingState {
    classes: Vec<SwitchingClass>,
}

impl SwitchingState {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
struct SwitchingClass {
    name: Ident,
    ids: HashMap<Key, usize>,
    order: Vec<Key>,
    cases: Vec<TokenStream>,
}

impl Generator<'_> {
    /// The provider-shaped value expression multiplexing `key` through a
    /// switching dispatch class.
    pub(crate) fn switching_provider_value(
        &mut self,
        cid: ComponentId,
        key: &Key,
        loc: Location,
    ) -> Result<TokenStream, GenerationError> {
        let (class_name, id) = self.switching_case(cid, key)?;
        let path = self.component_ref(cid, loc);
        let id_literal = Literal::usize_unsuffixed(id);
        Ok(quote! { Arc::new(#class_name::new(#path.clone(), #id_literal)) })
    }

    /// Assigns (or finds) the switch id for `key` and records its case.
    ///
    /// Ids grow in first-request order. The id is reserved before the case
    /// expression is computed, so a dependency cycle that re-requests the
    /// same key observes the assigned id instead of recursing.
    fn switching_case(
        &mut self,
        cid: ComponentId,
        key: &Key,
    ) -> Result<(Ident, usize), GenerationError> {
        for class in &self.state(cid).switching.classes {
            if let Some(&id) = class.ids.get(key) {
                return Ok((class.name.clone(), id));
            }
        }

        let full = self
            .state(cid)
            .switching
            .classes
            .last()
            .is_none_or(|class| class.order.len() >= self.config.keys_per_switching_class);
        if full {
            let name = self.state_mut(cid).type_names.claim("SwitchingProvider");
            debug!(class = %name, "starting a new switching provider class");
            self.state_mut(cid).switching.classes.push(SwitchingClass {
                name,
                ids: HashMap::new(),
                order: Vec::new(),
                cases: Vec::new(),
            });
        }

        let class_index = self.state(cid).switching.classes.len() - 1;
        let (class_name, id) = {
            let class = &mut self.state_mut(cid).switching.classes[class_index];
            let id = class.order.len();
            class.ids.insert(key.clone(), id);
            class.order.push(key.clone());
            class.cases.push(TokenStream::new());
            (class.name.clone(), id)
        };

        // The case evaluates the binding's unscoped direct-instance
        // expression; any caching discipline wraps the dispatch class from
        // the outside.
        let expression = self.direct_expression(cid, key, Location::nested(cid))?;
        let id_literal = Literal::usize_unsuffixed(id);
        self.state_mut(cid).switching.classes[class_index].cases[id] =
            quote! { #id_literal => unbox(Box::new(#expression)), };
        Ok((class_name, id))
    }

    /// Builds the dispatch class for every switching builder of this
    /// component: cases grouped into `get0`, `get1`, … helpers of at most
    /// the configured size, routed by an integer-division dispatcher.
    pub(crate) fn finalize_switching(&mut self, cid: ComponentId) -> Vec<TypeSpec> {
        let impl_name = self.state(cid).impl_name.clone();
        let cases_per_method = self.config.cases_per_method;
        let classes = mem::take(&mut self.state_mut(cid).switching.classes);

        classes
            .into_iter()
            .map(|class| {
                let mut spec = TypeSpec::new(class.name.clone());
                let value_param = Ident::new("T", Span::call_site());
                spec.type_params.push(value_param.clone());
                spec.fields.push(FieldSpec {
                    name: Ident::new("component", Span::call_site()),
                    ty: quote! { #impl_name },
                });
                spec.fields.push(FieldSpec {
                    name: Ident::new("id", Span::call_site()),
                    ty: quote! { usize },
                });
                spec.fields.push(FieldSpec {
                    name: Ident::new("_marker", Span::call_site()),
                    ty: quote! { ::std::marker::PhantomData<T> },
                });

                let mut constructor =
                    MethodSpec::new(Ident::new("new", Span::call_site()), Receiver::Static);
                constructor.public = true;
                constructor.params.push((
                    Ident::new("component", Span::call_site()),
                    quote! { #impl_name },
                ));
                constructor
                    .params
                    .push((Ident::new("id", Span::call_site()), quote! { usize }));
                constructor.ret = Some(quote! { Self });
                constructor.body.push(quote! {
                    Self { component, id, _marker: ::std::marker::PhantomData }
                });
                spec.methods.push(constructor);

                let group_count = class.cases.len().div_ceil(cases_per_method);
                for (group, cases) in class.cases.chunks(cases_per_method).enumerate() {
                    let name = Ident::new(&format!("get{group}"), Span::call_site());
                    let mut getter = MethodSpec::new(name, Receiver::Ref);
                    getter.ret = Some(quote! { T });
                    getter.body.push(quote! {
                        match self.id {
                            #(#cases)*
                            _ => unreachable!("unknown provider id"),
                        }
                    });
                    spec.methods.push(getter);
                }

                let class_name = &class.name;
                let divisor = Literal::usize_unsuffixed(cases_per_method);
                let arms = (0..group_count).map(|group| {
                    let group_literal = Literal::usize_unsuffixed(group);
                    let getter = Ident::new(&format!("get{group}"), Span::call_site());
                    quote! { #group_literal => self.#getter(), }
                });
                spec.extra_items.push(quote! {
                    impl<T: 'static> Provider<T> for #class_name<T> {
                        fn get(&self) -> T {
                            match self.id / #divisor {
                                #(#arms)*
                                _ => unreachable!("unknown provider id"),
                            }
                        }
                    }
                });
                spec
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{CodegenConfig, CompilerMode};
    use crate::diagnostics::CollectingDiagnostics;
    use crate::graph::{Binding, BindingRequest, GraphBuilder};

    use super::*;

    fn key(source: &str) -> Key {
        Key::parse(source).unwrap()
    }

    fn path(source: &str) -> syn::Path {
        syn::parse_str(source).unwrap()
    }

    fn graph_of(count: usize) -> crate::graph::BindingGraph {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        for at in 0..count {
            let name = format!("T{at}");
            builder.bind(root, Binding::injection(key(&name), path(&name), Vec::new()));
        }
        builder.finish().unwrap()
    }

    #[test]
    fn switch_ids_are_assigned_in_first_request_order() {
        let graph = graph_of(3);
        let config = CodegenConfig::with_mode(CompilerMode::FastInit);
        let mut diagnostics = CollectingDiagnostics::new();
        let mut generator = Generator::new(&graph, &config, &mut diagnostics);
        generator.setup_component(graph.root());

        let loc = Location::shard(graph.root(), crate::output::ShardId::COMPONENT);
        for (expected, name) in ["T2", "T0", "T1"].iter().enumerate() {
            let rendered = generator
                .switching_provider_value(graph.root(), &key(name), loc)
                .unwrap()
                .to_string();
            assert!(
                rendered.contains(&format!(", {expected})")),
                "{rendered} should use id {expected}"
            );
        }
    }

    #[test]
    fn repeated_requests_reuse_the_assigned_id() {
        let graph = graph_of(1);
        let config = CodegenConfig::with_mode(CompilerMode::FastInit);
        let mut diagnostics = CollectingDiagnostics::new();
        let mut generator = Generator::new(&graph, &config, &mut diagnostics);
        generator.setup_component(graph.root());

        let loc = Location::shard(graph.root(), crate::output::ShardId::COMPONENT);
        let first = generator
            .switching_provider_value(graph.root(), &key("T0"), loc)
            .unwrap()
            .to_string();
        let second = generator
            .switching_provider_value(graph.root(), &key("T0"), loc)
            .unwrap()
            .to_string();
        assert_eq!(first, second);
        assert_eq!(generator.state(graph.root()).switching.classes.len(), 1);
        assert_eq!(generator.state(graph.root()).switching.classes[0].order.len(), 1);
    }

    #[test]
    fn a_full_class_rolls_over_to_a_new_dispatch_class() {
        let graph = graph_of(3);
        let mut config = CodegenConfig::with_mode(CompilerMode::FastInit);
        config.keys_per_switching_class = 2;
        let mut diagnostics = CollectingDiagnostics::new();
        let mut generator = Generator::new(&graph, &config, &mut diagnostics);
        generator.setup_component(graph.root());

        let loc = Location::shard(graph.root(), crate::output::ShardId::COMPONENT);
        for name in ["T0", "T1", "T2"] {
            generator
                .switching_provider_value(graph.root(), &key(name), loc)
                .unwrap();
        }

        let classes = &generator.state(graph.root()).switching.classes;
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].name.to_string(), "SwitchingProvider");
        assert_eq!(classes[1].name.to_string(), "SwitchingProvider2");
        assert_eq!(classes[0].order.len(), 2);
        assert_eq!(classes[1].order.len(), 1);
    }

    #[test]
    fn cases_are_grouped_into_bounded_dispatch_methods() {
        let graph = graph_of(5);
        let mut config = CodegenConfig::with_mode(CompilerMode::FastInit);
        config.cases_per_method = 2;
        let mut diagnostics = CollectingDiagnostics::new();
        let mut generator = Generator::new(&graph, &config, &mut diagnostics);
        generator.setup_component(graph.root());

        let loc = Location::shard(graph.root(), crate::output::ShardId::COMPONENT);
        for at in 0..5 {
            generator
                .switching_provider_value(graph.root(), &key(&format!("T{at}")), loc)
                .unwrap();
        }

        let specs = generator.finalize_switching(graph.root());
        assert_eq!(specs.len(), 1);
        let getters: Vec<String> = specs[0]
            .methods
            .iter()
            .map(|method| method.name.to_string())
            .filter(|name| name.starts_with("get"))
            .collect();
        assert_eq!(getters, vec!["get0", "get1", "get2"]);

        let dispatcher = specs[0].extra_items[0].to_string();
        assert!(dispatcher.contains("self . id / 2"));
    }
}
