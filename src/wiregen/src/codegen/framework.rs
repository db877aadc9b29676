use proc_macro2::TokenStream;
use quote::quote;
use tracing::debug;

use crate::graph::{BindingElement, BindingKind, BindingRequest, ComponentId, Key, Scope};
use crate::output::{FieldSpec, Location, MemberSelect};

use super::representation::{factory_ident, switching_eligible};
use super::{GenerationError, Generator};

/// Lifecycle of one cached framework-instance field.
///
/// The state only moves forward: an absent entry is uninitialized, a field
/// being computed is `Initializing`, a field whose initialization was
/// re-entered holds a delegate placeholder (`Delegated`) until the real
/// creation expression fixes it up, and `Initialized` is terminal.
#[derive(Debug, Clone)]
pub(crate) enum FrameworkField {
    Initializing { switching_backed: bool },
    Delegated { select: MemberSelect, placeholder: bool },
    Initialized { select: MemberSelect },
}

impl Generator<'_> {
    /// Returns the member select of the cached provider-shaped holder for
    /// `key`, generating the field and its one-time initialization statement
    /// on first use.
    ///
    /// Generated initialization runs eagerly in one pass, so a dependency
    /// cycle would need each field to observe the other before it exists.
    /// Re-entering an in-flight initialization therefore allocates the field
    /// immediately with a delegate placeholder, and the outer computation
    /// emits a fix-up instead of a plain assignment once the real creation
    /// expression is known.
    pub(crate) fn framework_field(
        &mut self,
        cid: ComponentId,
        key: &Key,
    ) -> Result<MemberSelect, GenerationError> {
        match self.state(cid).framework_fields.get(key) {
            Some(FrameworkField::Delegated { select, .. })
            | Some(FrameworkField::Initialized { select }) => return Ok(select.clone()),
            Some(FrameworkField::Initializing { switching_backed }) => {
                let switching_backed = *switching_backed;
                let select = self.allocate_framework_field(cid, key);
                if !switching_backed {
                    // Switching providers have no constructor-time
                    // dependencies, so only plain holders need the
                    // placeholder indirection.
                    debug!(key = %key, "breaking initialization cycle with a delegate placeholder");
                    let name = &select.name;
                    self.push_initialization(
                        cid,
                        select.shard,
                        quote! { self.#name = Arc::new(DelegateProvider::new()); },
                    );
                }
                self.state_mut(cid).framework_fields.insert(
                    key.clone(),
                    FrameworkField::Delegated {
                        select: select.clone(),
                        placeholder: !switching_backed,
                    },
                );
                return Ok(select);
            }
            None => {}
        }

        let switching_backed = self.is_switching_backed(cid, key);
        self.state_mut(cid).framework_fields.insert(
            key.clone(),
            FrameworkField::Initializing { switching_backed },
        );
        let creation = self.framework_creation_expression(cid, key)?;

        let current = match self.state(cid).framework_fields.get(key) {
            Some(state) => state.clone(),
            None => unreachable!("an in-flight framework field should stay registered"),
        };
        let select = match current {
            FrameworkField::Initializing { .. } => {
                let select = self.allocate_framework_field(cid, key);
                let name = &select.name;
                self.push_initialization(
                    cid,
                    select.shard,
                    quote! { self.#name = #creation; },
                );
                select
            }
            FrameworkField::Delegated {
                select,
                placeholder: true,
            } => {
                let name = &select.name;
                self.push_initialization(
                    cid,
                    select.shard,
                    quote! { set_delegate(&self.#name, #creation); },
                );
                select
            }
            FrameworkField::Delegated {
                select,
                placeholder: false,
            } => {
                let name = &select.name;
                self.push_initialization(
                    cid,
                    select.shard,
                    quote! { self.#name = #creation; },
                );
                select
            }
            FrameworkField::Initialized { .. } => {
                unreachable!("a framework field cannot finish initializing twice")
            }
        };
        self.state_mut(cid).framework_fields.insert(
            key.clone(),
            FrameworkField::Initialized {
                select: select.clone(),
            },
        );
        Ok(select)
    }

    /// Declares the holder field in the binding's shard and returns its
    /// select. The field is typed to the contributed type unless that type
    /// is inaccessible here, in which case the erased shape is used;
    /// assisted injection holders use the generated factory type directly.
    fn allocate_framework_field(&mut self, cid: ComponentId, key: &Key) -> MemberSelect {
        let binding = self.local_binding(cid, key);
        let shard = self.shard_of(cid, key);
        let target = key.target();
        let ty = if binding.kind() == BindingKind::AssistedInjection {
            let factory = factory_ident(key);
            quote! { #factory }
        } else if binding.is_accessible() {
            quote! { Arc<dyn Provider<#target>> }
        } else {
            quote! { Arc<dyn Provider<Box<dyn ::std::any::Any + Send + Sync>>> }
        };
        let stem = format!("{}_provider", key.name_stem());
        let state = self.state_mut(cid);
        let shard_state = &mut state.shards[shard.index()];
        let name = shard_state.field_names.claim(&stem);
        shard_state.fields.push(FieldSpec {
            name: name.clone(),
            ty,
        });
        MemberSelect::field(cid, shard, name)
    }

    /// The provider-shaped creation expression for `key`, decorated with the
    /// caching discipline its scope demands.
    fn framework_creation_expression(
        &mut self,
        cid: ComponentId,
        key: &Key,
    ) -> Result<TokenStream, GenerationError> {
        let binding = self.local_binding(cid, key);
        let shard = self.shard_of(cid, key);
        let loc = Location::shard(cid, shard);
        let switching_backed = self.is_switching_backed(cid, key);

        let base = if switching_backed {
            self.switching_provider_value(cid, key, loc)?
        } else {
            match binding.kind() {
                BindingKind::Delegate => {
                    let target = binding.dependencies()[0].key.clone();
                    self.request_expression(cid, &BindingRequest::provider(target), loc)?
                }
                BindingKind::Component
                | BindingKind::BoundInstance
                | BindingKind::ComponentDependency => {
                    let value = self.direct_creation_expression(cid, key, loc)?;
                    quote! { Arc::new(InstanceProvider::new(#value)) }
                }
                BindingKind::AssistedFactory => {
                    let value = self.direct_creation_expression(cid, key, loc)?;
                    quote! { Arc::new(InstanceProvider::new(#value)) }
                }
                _ => {
                    let factory = factory_ident(key);
                    let mut args = Vec::new();
                    match binding.element().clone() {
                        BindingElement::ModuleMethod { module, .. } => {
                            args.push(self.requirement_expression(
                                cid,
                                crate::graph::RequirementKind::Module,
                                &Key::of(module),
                                loc,
                            ));
                        }
                        BindingElement::DependencyMethod { dependency, .. } => {
                            args.push(self.requirement_expression(
                                cid,
                                crate::graph::RequirementKind::Dependency,
                                &Key::of(dependency),
                                loc,
                            ));
                        }
                        BindingElement::Subcomponent { .. } => {
                            let path = self.component_ref(cid, loc);
                            args.push(quote! { #path.clone() });
                        }
                        _ => {}
                    }
                    for dependency in binding.dependencies() {
                        let provider = BindingRequest::provider(dependency.key.clone());
                        args.push(self.request_expression(cid, &provider, loc)?);
                    }
                    quote! { #factory::create(#(#args),*) }
                }
            }
        };

        let decorated = match binding.scope() {
            Scope::Singleton => quote! { DoubleCheck::provider(#base) },
            Scope::Reusable => quote! { SingleCheck::provider(#base) },
            Scope::Unscoped => {
                if switching_backed && binding.kind() == BindingKind::AssistedFactory {
                    // Rebuilding a factory per call buys nothing; cache it
                    // even though it is unscoped.
                    quote! { DoubleCheck::provider(#base) }
                } else {
                    base
                }
            }
        };
        Ok(decorated)
    }

    pub(crate) fn is_switching_backed(&self, cid: ComponentId, key: &Key) -> bool {
        if !self.config.mode.is_fast_init() {
            return false;
        }
        self.graph
            .node(cid)
            .binding(key)
            .is_some_and(|binding| switching_eligible(binding.kind()))
    }
}
