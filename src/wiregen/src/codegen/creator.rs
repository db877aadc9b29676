use proc_macro2::{Literal, Span, TokenStream};
use quote::quote;
use syn::Ident;
use tracing::debug;

use crate::graph::{
    Binding, BindingElement, BindingKind, ComponentId, ComponentRequirement, Key, RequirementKind,
};
use crate::output::{
    FieldSpec, Location, MemberSelect, MethodSpec, NameAllocator, Receiver, ShardId, TypeSpec,
};

use super::Generator;

/// How the generated creator treats one component requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequirementStatus {
    /// Supplied through the creator and stored in a component-shard field.
    Needed,
    /// Unused by the component; the setter is a deprecated no-op kept for
    /// source compatibility, or omitted when the type is inaccessible.
    Unneeded,
    /// A module already owned by an ancestor component; the setter fails
    /// unconditionally.
    RepeatedModule,
}

#[derive(Debug, Clone)]
pub(crate) struct RequirementState {
    pub(crate) requirement: ComponentRequirement,
    pub(crate) status: RequirementStatus,
    pub(crate) field: Option<Ident>,
    pub(crate) setter: Ident,
}

impl Generator<'_> {
    /// Classifies every declared requirement and declares component-shard
    /// fields for the needed ones.
    pub(crate) fn setup_requirements(&mut self, cid: ComponentId) {
        let node = self.graph.node(cid);
        let mut setter_names = NameAllocator::new();
        setter_names.preclaim("new");
        setter_names.preclaim("build");

        for requirement in node.requirements().to_vec() {
            let status = self.classify_requirement(cid, &requirement);
            let stem = requirement.name_stem();
            let setter = setter_names.claim(&stem);
            let field = match status {
                RequirementStatus::Needed => {
                    let target = requirement.key().target().clone();
                    let state = self.state_mut(cid);
                    let shard = &mut state.shards[ShardId::COMPONENT.index()];
                    let field = shard.field_names.claim(&stem);
                    shard.fields.push(FieldSpec {
                        name: field.clone(),
                        ty: quote! { #target },
                    });
                    Some(field)
                }
                _ => None,
            };
            debug!(requirement = %requirement.key(), status = ?status, "classified requirement");
            self.state_mut(cid).requirements.push(RequirementState {
                requirement,
                status,
                field,
                setter,
            });
        }
    }

    fn classify_requirement(
        &self,
        cid: ComponentId,
        requirement: &ComponentRequirement,
    ) -> RequirementStatus {
        if requirement.kind() == RequirementKind::Module {
            let mut ancestor = self.graph.node(cid).parent();
            while let Some(at) = ancestor {
                if self.graph.node(at).requirements().contains(requirement) {
                    return RequirementStatus::RepeatedModule;
                }
                ancestor = self.graph.node(at).parent();
            }
        }
        if self.requirement_is_used(cid, requirement) {
            RequirementStatus::Needed
        } else {
            RequirementStatus::Unneeded
        }
    }

    /// A requirement is used when a binding of this component or of any
    /// descendant invokes or returns it.
    fn requirement_is_used(&self, cid: ComponentId, requirement: &ComponentRequirement) -> bool {
        let mut stack = vec![cid];
        while let Some(at) = stack.pop() {
            let node = self.graph.node(at);
            if node
                .bindings()
                .any(|binding| binding_uses_requirement(binding, requirement))
            {
                return true;
            }
            stack.extend(node.children().iter().copied());
        }
        false
    }

    /// The expression resolving a requirement value from `loc`, through the
    /// component-shard field it was stored in at construction time.
    pub(crate) fn requirement_expression(
        &mut self,
        cid: ComponentId,
        kind: RequirementKind,
        key: &Key,
        loc: Location,
    ) -> TokenStream {
        let found = self.state(cid).requirements.iter().find(|state| {
            state.requirement.kind() == kind
                && match kind {
                    RequirementKind::BoundInstance => state.requirement.key() == key,
                    _ => state.requirement.key().target() == key.target(),
                }
        });
        let field = match found {
            Some(state) => match &state.field {
                Some(field) => field.clone(),
                None => unreachable!("an unneeded requirement should never be referenced"),
            },
            None => unreachable!("a requirement should be declared by the owning component"),
        };
        let select = MemberSelect::field(cid, ShardId::COMPONENT, field);
        self.member_expression(&select, loc)
    }

    /// Generates the creator type: one setter per requirement according to
    /// its status, plus the build method feeding the component constructor.
    pub(crate) fn finalize_creator(&mut self, cid: ComponentId) -> TypeSpec {
        let state = self.state(cid);
        let impl_name = state.impl_name.clone();
        let requirements = state.requirements.clone();
        let parent_impl = self
            .graph
            .node(cid)
            .parent()
            .map(|parent| self.state(parent).impl_name.clone());

        let mut spec = TypeSpec::new(self.state(cid).builder_name.clone());
        let parent_field = Ident::new("parent", Span::call_site());
        if let Some(parent_impl) = &parent_impl {
            spec.fields.push(FieldSpec {
                name: parent_field.clone(),
                ty: quote! { #parent_impl },
            });
        }
        for requirement in &requirements {
            if let Some(field) = &requirement.field {
                let target = requirement.requirement.key().target().clone();
                spec.fields.push(FieldSpec {
                    name: field.clone(),
                    ty: quote! { Option<#target> },
                });
            }
        }

        let mut constructor = MethodSpec::new(Ident::new("new", Span::call_site()), Receiver::Static);
        constructor.public = true;
        constructor.ret = Some(quote! { Self });
        if let Some(parent_impl) = &parent_impl {
            constructor
                .params
                .push((parent_field.clone(), quote! { #parent_impl }));
        }
        let field_defaults = requirements.iter().filter_map(|requirement| {
            requirement.field.as_ref().map(|field| quote! { #field: None, })
        });
        let parent_init = parent_impl
            .as_ref()
            .map(|_| quote! { #parent_field, })
            .unwrap_or_default();
        constructor.body.push(quote! {
            Self { #parent_init #(#field_defaults)* }
        });
        spec.methods.push(constructor);

        for requirement in &requirements {
            let target = requirement.requirement.key().target().clone();
            let setter = requirement.setter.clone();
            let param = setter.clone();
            match requirement.status {
                RequirementStatus::Needed => {
                    let field = match &requirement.field {
                        Some(field) => field.clone(),
                        None => unreachable!("a needed requirement should have a field"),
                    };
                    let mut method = MethodSpec::new(setter, Receiver::Owned);
                    method.public = true;
                    method.params.push((param.clone(), quote! { #target }));
                    method.ret = Some(quote! { Self });
                    method.body.push(quote! { self.#field = Some(#param); });
                    method.body.push(quote! { self });
                    spec.methods.push(method);
                }
                RequirementStatus::Unneeded => {
                    if !requirement.requirement.is_accessible() {
                        continue;
                    }
                    let mut method = MethodSpec::new(setter, Receiver::Owned);
                    method.public = true;
                    method.attrs.push(quote! {
                        #[deprecated(note = "this value is unused; the setter is retained for source compatibility")]
                    });
                    method.params.push((param.clone(), quote! { #target }));
                    method.ret = Some(quote! { Self });
                    method.body.push(quote! { let _ = #param; });
                    method.body.push(quote! { self });
                    spec.methods.push(method);
                }
                RequirementStatus::RepeatedModule => {
                    let message = Literal::string(&format!(
                        "{} cannot be set because it is inherited from an ancestor component",
                        requirement.requirement.key()
                    ));
                    let mut method = MethodSpec::new(setter, Receiver::Owned);
                    method.public = true;
                    method.params.push((param.clone(), quote! { #target }));
                    method.ret = Some(quote! { Self });
                    method.body.push(quote! { let _ = #param; });
                    method.body.push(quote! { panic!(#message) });
                    spec.methods.push(method);
                }
            }
        }

        let mut build = MethodSpec::new(Ident::new("build", Span::call_site()), Receiver::Owned);
        build.public = true;
        build.ret = Some(quote! { #impl_name });
        let mut args = Vec::new();
        if parent_impl.is_some() {
            args.push(quote! { self.#parent_field });
        }
        for requirement in &requirements {
            if let Some(field) = &requirement.field {
                let message = Literal::string(&format!(
                    "{} must be set before building the component",
                    requirement.requirement.key()
                ));
                args.push(quote! {
                    self.#field.unwrap_or_else(|| panic!(#message))
                });
            }
        }
        build.body.push(quote! { #impl_name::new(#(#args),*) });
        spec.methods.push(build);
        spec
    }
}

fn binding_uses_requirement(binding: &Binding, requirement: &ComponentRequirement) -> bool {
    match (binding.element(), requirement.kind()) {
        (BindingElement::ModuleMethod { module, .. }, RequirementKind::Module) => {
            module == requirement.key().target()
        }
        (BindingElement::DependencyMethod { dependency, .. }, RequirementKind::Dependency) => {
            dependency == requirement.key().target()
        }
        _ => match (binding.kind(), requirement.kind()) {
            (BindingKind::BoundInstance, RequirementKind::BoundInstance) => {
                binding.key() == requirement.key()
            }
            (BindingKind::ComponentDependency, RequirementKind::Dependency) => {
                binding.key().target() == requirement.key().target()
            }
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use proc_macro2::Span;
    use quote::ToTokens;

    use crate::config::CodegenConfig;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::graph::GraphBuilder;

    use super::*;

    fn key(source: &str) -> Key {
        Key::parse(source).unwrap()
    }

    fn ty(source: &str) -> syn::Type {
        syn::parse_str(source).unwrap()
    }

    fn method_named<'a>(spec: &'a TypeSpec, name: &str) -> Option<&'a MethodSpec> {
        spec.methods.iter().find(|method| method.name == name)
    }

    #[test]
    fn a_used_module_gets_a_real_setter_and_a_field() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        builder.require(root, ComponentRequirement::module(ty("HttpModule")));
        builder.bind(
            root,
            Binding::provision(
                key("Client"),
                ty("HttpModule"),
                Ident::new("client", Span::call_site()),
                Vec::new(),
            ),
        );
        let graph = builder.finish().unwrap();
        let config = CodegenConfig::default();
        let mut diagnostics = CollectingDiagnostics::new();
        let mut generator = Generator::new(&graph, &config, &mut diagnostics);
        generator.setup_component(graph.root());

        let creator = generator.finalize_creator(graph.root());
        let setter = method_named(&creator, "http_module").unwrap();
        assert!(setter.attrs.is_empty());
        assert!(creator
            .fields
            .iter()
            .any(|field| field.name == "http_module"));

        let build = method_named(&creator, "build").unwrap();
        let body = build.body[0].to_string();
        assert!(body.contains("self . http_module"));
        assert!(body.contains("must be set"));
    }

    #[test]
    fn an_unused_module_gets_a_deprecated_no_op_setter() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        builder.require(root, ComponentRequirement::module(ty("UnusedModule")));
        let graph = builder.finish().unwrap();
        let config = CodegenConfig::default();
        let mut diagnostics = CollectingDiagnostics::new();
        let mut generator = Generator::new(&graph, &config, &mut diagnostics);
        generator.setup_component(graph.root());

        let creator = generator.finalize_creator(graph.root());
        let setter = method_named(&creator, "unused_module").unwrap();
        assert!(setter.attrs[0].to_string().contains("deprecated"));
        assert!(!creator
            .fields
            .iter()
            .any(|field| field.name == "unused_module"));
    }

    #[test]
    fn an_inaccessible_unused_module_has_no_setter_at_all() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        builder.require(
            root,
            ComponentRequirement::module(ty("hidden::Module")).inaccessible(),
        );
        let graph = builder.finish().unwrap();
        let config = CodegenConfig::default();
        let mut diagnostics = CollectingDiagnostics::new();
        let mut generator = Generator::new(&graph, &config, &mut diagnostics);
        generator.setup_component(graph.root());

        let creator = generator.finalize_creator(graph.root());
        assert!(method_named(&creator, "hidden_module").is_none());
    }

    #[test]
    fn a_module_owned_by_an_ancestor_gets_a_failing_setter() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        let child = builder.component(root, "RequestComponent");
        builder.require(root, ComponentRequirement::module(ty("HttpModule")));
        builder.require(child, ComponentRequirement::module(ty("HttpModule")));
        builder.bind(
            root,
            Binding::provision(
                key("Client"),
                ty("HttpModule"),
                Ident::new("client", Span::call_site()),
                Vec::new(),
            ),
        );
        let graph = builder.finish().unwrap();
        let config = CodegenConfig::default();
        let mut diagnostics = CollectingDiagnostics::new();
        let mut generator = Generator::new(&graph, &config, &mut diagnostics);
        generator.setup_component(graph.root());
        generator.setup_component(child);

        let creator = generator.finalize_creator(child);
        let setter = method_named(&creator, "http_module").unwrap();
        let body = setter.body.iter().map(ToString::to_string).collect::<String>();
        assert!(body.contains("panic !"));
        assert!(body.contains("inherited from an ancestor component"));
    }

    #[test]
    fn a_subcomponent_creator_holds_its_parent() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        let child = builder.component(root, "RequestComponent");
        let graph = builder.finish().unwrap();
        let config = CodegenConfig::default();
        let mut diagnostics = CollectingDiagnostics::new();
        let mut generator = Generator::new(&graph, &config, &mut diagnostics);
        generator.setup_component(graph.root());
        generator.setup_component(child);

        let creator = generator.finalize_creator(child);
        assert!(creator.fields.iter().any(|field| field.name == "parent"));
        let build = method_named(&creator, "build").unwrap();
        assert!(build.body[0].to_string().contains("self . parent"));
        let _ = creator.to_token_stream();
    }
}
