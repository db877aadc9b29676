use std::sync::Arc;

use proc_macro2::{Literal, Span, TokenStream};
use quote::quote;
use syn::Ident;
use tracing::trace;

use crate::graph::{
    Binding, BindingElement, BindingKind, BindingRequest, ComponentId, Key, RequestKind,
};
use crate::output::{Location, MemberSelect, MethodSpec, Receiver};

use super::{
    AssistedInjectionProviderSnafu, GenerationError, Generator, NoBindingRepresentationSnafu,
    UnsupportedRequestKindSnafu,
};
use snafu::prelude::*;

/// The strategy producing the expression that satisfies one (binding,
/// request-kind) pair.
///
/// An unhandled combination of kinds is a hole in [`Generator::select_representation`]'s
/// dispatch, surfaced as a fatal error rather than a silent fallthrough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    /// Inline invocation of the binding's constructor, module method or
    /// aggregation, wrapped in a method once it has dependencies.
    Direct { key: Key },
    /// `TypeFactory::create()` accessor for a stateless provider.
    StaticFactory { key: Key },
    /// The cached, provider-shaped holder field.
    FrameworkInstance { key: Key },
    /// An instance re-derived from the cached holder.
    DerivedInstance { key: Key },
    /// Lazy wrapper over the provider representation.
    Lazy { key: Key },
    /// Provider-of-lazy wrapper over the provider representation.
    ProviderOfLazy { key: Key },
    /// Pass-through to the delegated binding's provider.
    DelegatedProvider { key: Key, target: BindingRequest },
    /// Multiplexed creation through a switching-provider dispatch class.
    SwitchingProvider { key: Key },
    /// Field injection into an externally-constructed instance.
    MembersInjection { key: Key },
}

/// A memoization slot, reserved before selection so a re-entrant lookup
/// observes work in progress instead of recomputing.
#[derive(Debug, Clone)]
pub(crate) enum ReprSlot {
    InProgress,
    Ready(Arc<Representation>),
}

impl Generator<'_> {
    /// Returns the representation for `request`, creating and caching it on
    /// first use. Lookup starts at `cid` and walks the ancestor path to the
    /// component owning a binding for the key.
    pub(crate) fn representation(
        &mut self,
        cid: ComponentId,
        request: &BindingRequest,
    ) -> Result<(ComponentId, Arc<Representation>), GenerationError> {
        let owner = match self.graph.resolving_component(cid, &request.key) {
            Some(owner) => owner,
            None => {
                return NoBindingRepresentationSnafu {
                    key: request.key.clone(),
                }
                .fail()
            }
        };
        if let Some(slot) = self.state(owner).representations.get(request) {
            match slot {
                ReprSlot::Ready(repr) => return Ok((owner, Arc::clone(repr))),
                ReprSlot::InProgress => {
                    unreachable!("representation selection should not re-enter itself")
                }
            }
        }
        self.state_mut(owner)
            .representations
            .insert(request.clone(), ReprSlot::InProgress);
        let repr = Arc::new(self.select_representation(owner, request)?);
        self.representations_created += 1;
        trace!(key = %request.key, kind = ?request.kind, repr = ?repr, "selected representation");
        self.state_mut(owner)
            .representations
            .insert(request.clone(), ReprSlot::Ready(Arc::clone(&repr)));
        Ok((owner, repr))
    }

    /// The dispatch table over (request kind, binding kind, compiler mode).
    fn select_representation(
        &mut self,
        owner: ComponentId,
        request: &BindingRequest,
    ) -> Result<Representation, GenerationError> {
        let binding = match self.graph.node(owner).binding(&request.key) {
            Some(binding) => binding,
            None => unreachable!("the owning component should hold a binding for the key"),
        };
        let key = request.key.clone();
        match request.kind {
            RequestKind::MembersInjection => Ok(Representation::MembersInjection { key }),
            RequestKind::Lazy => Ok(Representation::Lazy { key }),
            RequestKind::ProviderOfLazy => Ok(Representation::ProviderOfLazy { key }),
            RequestKind::Future => UnsupportedRequestKindSnafu {
                key,
                kind: request.kind,
            }
            .fail(),
            RequestKind::Instance => {
                if binding.kind() == BindingKind::MembersInjection {
                    Ok(Representation::MembersInjection { key })
                } else if self.graph.requires_caching(owner, &key) {
                    Ok(Representation::DerivedInstance { key })
                } else {
                    Ok(Representation::Direct { key })
                }
            }
            RequestKind::Provider => {
                let kind = binding.kind();
                if kind == BindingKind::AssistedInjection {
                    return AssistedInjectionProviderSnafu { key }.fail();
                }
                if kind == BindingKind::Delegate && !self.graph.requires_caching(owner, &key) {
                    let target = binding.dependencies()[0].key.clone();
                    return Ok(Representation::DelegatedProvider {
                        key,
                        target: BindingRequest::provider(target),
                    });
                }
                if static_factory_eligible(kind)
                    && !self.config.mode.is_fast_init()
                    && binding.dependencies().is_empty()
                    && !binding.scope().is_scoped()
                {
                    return Ok(Representation::StaticFactory { key });
                }
                if self.config.mode.is_fast_init() && switching_eligible(kind) {
                    if self.graph.requires_caching(owner, &key) {
                        return Ok(Representation::FrameworkInstance { key });
                    }
                    return Ok(Representation::SwitchingProvider { key });
                }
                Ok(Representation::FrameworkInstance { key })
            }
        }
    }

    /// The expression satisfying `request` from code located at `loc`.
    pub(crate) fn request_expression(
        &mut self,
        cid: ComponentId,
        request: &BindingRequest,
        loc: Location,
    ) -> Result<TokenStream, GenerationError> {
        let (owner, repr) = self.representation(cid, request)?;
        self.representation_expression(owner, &repr, loc)
    }

    fn representation_expression(
        &mut self,
        owner: ComponentId,
        repr: &Representation,
        loc: Location,
    ) -> Result<TokenStream, GenerationError> {
        match repr {
            Representation::Direct { key } => self.direct_expression(owner, key, loc),
            Representation::StaticFactory { key } => {
                let factory = factory_ident(key);
                Ok(quote! { #factory::create() })
            }
            Representation::FrameworkInstance { key } => {
                let select = self.framework_field(owner, key)?;
                Ok(self.member_expression(&select, loc))
            }
            Representation::DerivedInstance { key } => {
                let provider =
                    self.request_expression(owner, &BindingRequest::provider(key.clone()), loc)?;
                Ok(quote! { #provider.get() })
            }
            Representation::Lazy { key } => {
                let provider =
                    self.request_expression(owner, &BindingRequest::provider(key.clone()), loc)?;
                Ok(quote! { Lazy::new(#provider) })
            }
            Representation::ProviderOfLazy { key } => {
                let provider =
                    self.request_expression(owner, &BindingRequest::provider(key.clone()), loc)?;
                Ok(quote! { ProviderOfLazy::new(#provider) })
            }
            Representation::DelegatedProvider { target, .. } => {
                self.request_expression(owner, target, loc)
            }
            Representation::SwitchingProvider { key } => {
                self.switching_provider_value(owner, key, loc)
            }
            Representation::MembersInjection { key } => {
                self.members_injection_expression(owner, key, loc)
            }
        }
    }

    /// The inline creation expression, wrapped in a method once the binding
    /// has dependencies so no single expression tree grows without bound and
    /// recursive requests can reuse the method.
    pub(crate) fn direct_expression(
        &mut self,
        cid: ComponentId,
        key: &Key,
        loc: Location,
    ) -> Result<TokenStream, GenerationError> {
        let binding = self.local_binding(cid, key);
        if binding.dependencies().is_empty() {
            return self.direct_creation_expression(cid, key, loc);
        }

        let request = BindingRequest::instance(key.clone());
        if let Some(select) = self.state(cid).private_methods.get(&request) {
            let select = select.clone();
            let path = self.member_expression(&select, loc);
            return Ok(quote! { #path() });
        }

        let shard = self.shard_of(cid, key);
        let declared = if shard.is_component_shard() {
            self.matching_component_method(cid, &request)
        } else {
            None
        };
        let (name, public) = match declared {
            Some(name) => (name, true),
            None => {
                let stem = key.name_stem();
                let name = self.state_mut(cid).shards[shard.index()]
                    .method_names
                    .claim(&stem);
                (name, false)
            }
        };
        let select = MemberSelect::method(cid, shard, name.clone());
        self.state_mut(cid)
            .private_methods
            .insert(request, select.clone());

        let body_loc = Location::shard(cid, shard);
        let expression = self.direct_creation_expression(cid, key, body_loc)?;
        let target = binding.key().target().clone();
        let mut spec = MethodSpec::new(name, Receiver::Ref);
        spec.public = public;
        spec.ret = Some(quote! { #target });
        spec.body.push(expression);
        self.state_mut(cid).shards[shard.index()].methods.push(spec);

        let path = self.member_expression(&select, loc);
        Ok(quote! { #path() })
    }

    /// The raw creation expression for a binding, with each dependency
    /// satisfied in the shape its request asks for.
    pub(crate) fn direct_creation_expression(
        &mut self,
        cid: ComponentId,
        key: &Key,
        loc: Location,
    ) -> Result<TokenStream, GenerationError> {
        let binding = self.local_binding(cid, key);
        match binding.kind() {
            BindingKind::Injection | BindingKind::AssistedInjection => {
                let BindingElement::Constructor { path } = binding.element().clone() else {
                    unreachable!("an injection binding should carry its constructor")
                };
                let args = self.dependency_expressions(cid, &binding, loc)?;
                Ok(quote! { #path::new(#(#args),*) })
            }
            BindingKind::Provision => {
                let BindingElement::ModuleMethod { module, method } = binding.element().clone()
                else {
                    unreachable!("a provision binding should carry its module method")
                };
                let module_expr = self.requirement_expression(
                    cid,
                    crate::graph::RequirementKind::Module,
                    &Key::of(module),
                    loc,
                );
                let args = self.dependency_expressions(cid, &binding, loc)?;
                Ok(quote! { #module_expr.#method(#(#args),*) })
            }
            BindingKind::MultiboundSet => {
                let args = self.dependency_expressions(cid, &binding, loc)?;
                Ok(quote! { ::std::collections::HashSet::from([#(#args),*]) })
            }
            BindingKind::MultiboundMap => {
                let BindingElement::MapKeys { keys } = binding.element().clone() else {
                    unreachable!("a map multibinding should carry its map keys")
                };
                let values = self.dependency_expressions(cid, &binding, loc)?;
                let entries = keys.iter().zip(values).map(|(map_key, value)| {
                    let literal = Literal::string(map_key);
                    quote! { (#literal, #value) }
                });
                Ok(quote! { ::std::collections::HashMap::from([#(#entries),*]) })
            }
            BindingKind::Delegate => {
                let args = self.dependency_expressions(cid, &binding, loc)?;
                Ok(args.into_iter().next().unwrap_or_else(|| {
                    unreachable!("a delegate binding should depend on its target")
                }))
            }
            BindingKind::Optional => {
                let mut args = self.dependency_expressions(cid, &binding, loc)?;
                match args.pop() {
                    Some(present) => Ok(quote! { Some(#present) }),
                    None => Ok(quote! { None }),
                }
            }
            BindingKind::Component => {
                let path = self.component_ref(cid, loc);
                Ok(quote! { #path.clone() })
            }
            BindingKind::ComponentDependency => Ok(self.requirement_expression(
                cid,
                crate::graph::RequirementKind::Dependency,
                key,
                loc,
            )),
            BindingKind::ComponentProvision => {
                let BindingElement::DependencyMethod { dependency, method } =
                    binding.element().clone()
                else {
                    unreachable!("a component provision binding should carry its method")
                };
                let dependency_expr = self.requirement_expression(
                    cid,
                    crate::graph::RequirementKind::Dependency,
                    &Key::of(dependency),
                    loc,
                );
                Ok(quote! { #dependency_expr.#method() })
            }
            BindingKind::BoundInstance => Ok(self.requirement_expression(
                cid,
                crate::graph::RequirementKind::BoundInstance,
                key,
                loc,
            )),
            BindingKind::SubcomponentCreator => {
                let BindingElement::Subcomponent { component } = binding.element().clone() else {
                    unreachable!("a subcomponent creator binding should name its child")
                };
                let builder = Ident::new(&format!("{component}Builder"), Span::call_site());
                let path = self.component_ref(cid, loc);
                Ok(quote! { #builder::new(#path.clone()) })
            }
            BindingKind::AssistedFactory => {
                let target = binding.dependencies()[0].key.clone();
                let target_field = self.framework_field(cid, &target)?;
                let path = self.member_expression(&target_field, loc);
                let factory_impl =
                    Ident::new(&format!("{}Impl", key.type_stem()), Span::call_site());
                Ok(quote! { #factory_impl::new(#path.clone()) })
            }
            BindingKind::MembersInjection => {
                unreachable!("a members injector has no direct instance expression")
            }
        }
    }

    /// Generates (once) and calls the members-injection method for `key`.
    pub(crate) fn members_injection_expression(
        &mut self,
        cid: ComponentId,
        key: &Key,
        loc: Location,
    ) -> Result<TokenStream, GenerationError> {
        let request = BindingRequest::members_injection(key.clone());
        if let Some(select) = self.state(cid).private_methods.get(&request) {
            let select = select.clone();
            let path = self.member_expression(&select, loc);
            return Ok(quote! { #path(instance) });
        }

        let binding = self.local_binding(cid, key);
        let BindingElement::InjectionSites { fields } = binding.element().clone() else {
            unreachable!("a members injector should carry its injection sites")
        };
        let shard = self.shard_of(cid, key);
        let name = self.state_mut(cid).shards[shard.index()]
            .method_names
            .claim(&format!("inject_{}", key.name_stem()));
        let select = MemberSelect::method(cid, shard, name.clone());
        self.state_mut(cid)
            .private_methods
            .insert(request, select.clone());

        let body_loc = Location::shard(cid, shard);
        let mut body = Vec::new();
        for (field, dependency) in fields.iter().zip(binding.dependencies().to_vec()) {
            let value = self.request_expression(cid, &dependency, body_loc)?;
            body.push(quote! { instance.#field = #value; });
        }
        let target = binding.key().target().clone();
        let mut spec = MethodSpec::new(name, Receiver::Ref);
        spec.params.push((
            Ident::new("instance", Span::call_site()),
            quote! { &mut #target },
        ));
        spec.body = body;
        self.state_mut(cid).shards[shard.index()].methods.push(spec);

        let path = self.member_expression(&select, loc);
        Ok(quote! { #path(instance) })
    }

    fn matching_component_method(
        &self,
        cid: ComponentId,
        request: &BindingRequest,
    ) -> Option<Ident> {
        self.graph
            .node(cid)
            .methods()
            .iter()
            .find(|method| &method.request == request)
            .map(|method| method.name.clone())
    }

    fn dependency_expressions(
        &mut self,
        cid: ComponentId,
        binding: &Binding,
        loc: Location,
    ) -> Result<Vec<TokenStream>, GenerationError> {
        binding
            .dependencies()
            .iter()
            .map(|dependency| self.request_expression(cid, dependency, loc))
            .collect()
    }

    pub(crate) fn local_binding(&self, cid: ComponentId, key: &Key) -> Binding {
        match self.graph.node(cid).binding(key) {
            Some(binding) => binding.clone(),
            None => unreachable!("the owning component should hold a binding for the key"),
        }
    }
}

/// Kinds whose creation logic may be multiplexed into a switching provider:
/// everything not already backed by an existing instance or another
/// provider.
pub(crate) fn switching_eligible(kind: BindingKind) -> bool {
    matches!(
        kind,
        BindingKind::Injection
            | BindingKind::Provision
            | BindingKind::MultiboundSet
            | BindingKind::MultiboundMap
            | BindingKind::Optional
            | BindingKind::AssistedFactory
    )
}

/// Kinds whose factories are stateless enough for a static accessor when
/// the binding has no dependencies and no scope.
fn static_factory_eligible(kind: BindingKind) -> bool {
    matches!(
        kind,
        BindingKind::Injection
            | BindingKind::Provision
            | BindingKind::MultiboundSet
            | BindingKind::MultiboundMap
    )
}

pub(crate) fn factory_ident(key: &Key) -> Ident {
    Ident::new(&format!("{}Factory", key.type_stem()), Span::call_site())
}
