use std::fmt::{Display, Formatter, Result as FmtResult};

use syn::{Ident, Path, Type};

use crate::graph::key::Key;

/// How a binding satisfies its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Constructor injection of a user type.
    Injection,
    /// A module method provides the value.
    Provision,
    /// Aggregation of set contributions.
    MultiboundSet,
    /// Aggregation of map contributions.
    MultiboundMap,
    /// An alias to another binding.
    Delegate,
    /// Present-or-absent wrapper around another binding.
    Optional,
    /// The generated component itself.
    Component,
    /// A provision method exposed by a component dependency.
    ComponentProvision,
    /// A component dependency instance supplied at construction time.
    ComponentDependency,
    /// A value bound into the component at construction time.
    BoundInstance,
    /// A builder for a child component.
    SubcomponentCreator,
    /// Constructor injection with caller-assisted parameters; reachable only
    /// through its assisted factory.
    AssistedInjection,
    /// The factory type for an assisted injection binding.
    AssistedFactory,
    /// Field injection into an externally-constructed instance.
    MembersInjection,
}

/// The caching discipline attached to a binding.
///
/// The ordering reflects caching strength: an unscoped binding caches
/// nothing, a reusable binding caches weakly and a singleton caches for the
/// component's lifetime. [`Ord`] is what the delegate rule compares when it
/// decides whether an alias needs its own cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Scope {
    #[default]
    Unscoped,
    Reusable,
    Singleton,
}

impl Scope {
    pub fn is_scoped(self) -> bool {
        self != Self::Unscoped
    }

    /// Returns true if caching under `self` retains values at least as long
    /// as caching under `other`.
    pub fn outlives(self, other: Self) -> bool {
        self >= other
    }

    pub fn to_str(self) -> &'static str {
        match self {
            Self::Unscoped => "unscoped",
            Self::Reusable => "reusable",
            Self::Singleton => "singleton",
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.to_str())
    }
}

/// The shape in which a dependency is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Instance,
    Provider,
    Lazy,
    ProviderOfLazy,
    MembersInjection,
    Future,
}

/// A (key, request-kind) pair: the unit of request memoization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingRequest {
    pub key: Key,
    pub kind: RequestKind,
}

impl BindingRequest {
    pub fn new(key: Key, kind: RequestKind) -> Self {
        Self { key, kind }
    }

    pub fn instance(key: Key) -> Self {
        Self::new(key, RequestKind::Instance)
    }

    pub fn provider(key: Key) -> Self {
        Self::new(key, RequestKind::Provider)
    }

    pub fn lazy(key: Key) -> Self {
        Self::new(key, RequestKind::Lazy)
    }

    pub fn members_injection(key: Key) -> Self {
        Self::new(key, RequestKind::MembersInjection)
    }
}

/// The language element a binding's invocation is emitted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingElement {
    /// `Type::new(...)` style constructor.
    Constructor { path: Path },
    /// Instance method on a module supplied as a component requirement.
    ModuleMethod { module: Type, method: Ident },
    /// Provision method exposed by a component dependency.
    DependencyMethod { dependency: Type, method: Ident },
    /// Literal map keys, aligned index-for-index with the dependency list of
    /// a map multibinding.
    MapKeys { keys: Vec<String> },
    /// Injected fields, aligned index-for-index with the dependency list of
    /// a members injector.
    InjectionSites { fields: Vec<Ident> },
    /// The child component a subcomponent creator builds.
    Subcomponent { component: String },
    None,
}

/// A rule for producing the value of one key.
///
/// Bindings are immutable value objects owned by the binding graph; the
/// generator reads them through the graph's lookup oracle and never mutates
/// them.
#[derive(Debug, Clone)]
pub struct Binding {
    key: Key,
    kind: BindingKind,
    scope: Scope,
    dependencies: Vec<BindingRequest>,
    element: BindingElement,
    accessible: bool,
}

impl Binding {
    pub fn new(
        key: Key,
        kind: BindingKind,
        dependencies: Vec<BindingRequest>,
        element: BindingElement,
    ) -> Self {
        Self {
            key,
            kind,
            scope: Scope::Unscoped,
            dependencies,
            element,
            accessible: true,
        }
    }

    pub fn injection(key: Key, path: Path, dependencies: Vec<BindingRequest>) -> Self {
        Self::new(
            key,
            BindingKind::Injection,
            dependencies,
            BindingElement::Constructor { path },
        )
    }

    pub fn provision(
        key: Key,
        module: Type,
        method: Ident,
        dependencies: Vec<BindingRequest>,
    ) -> Self {
        Self::new(
            key,
            BindingKind::Provision,
            dependencies,
            BindingElement::ModuleMethod { module, method },
        )
    }

    pub fn multibound_set(key: Key, contributions: Vec<BindingRequest>) -> Self {
        Self::new(
            key,
            BindingKind::MultiboundSet,
            contributions,
            BindingElement::None,
        )
    }

    pub fn multibound_map(key: Key, entries: Vec<(String, BindingRequest)>) -> Self {
        let (keys, dependencies) = entries.into_iter().unzip();
        Self::new(
            key,
            BindingKind::MultiboundMap,
            dependencies,
            BindingElement::MapKeys { keys },
        )
    }

    pub fn delegate(key: Key, target: Key) -> Self {
        Self::new(
            key,
            BindingKind::Delegate,
            vec![BindingRequest::instance(target)],
            BindingElement::None,
        )
    }

    pub fn optional_present(key: Key, dependency: BindingRequest) -> Self {
        Self::new(
            key,
            BindingKind::Optional,
            vec![dependency],
            BindingElement::None,
        )
    }

    pub fn optional_absent(key: Key) -> Self {
        Self::new(key, BindingKind::Optional, Vec::new(), BindingElement::None)
    }

    pub fn component(key: Key) -> Self {
        Self::new(key, BindingKind::Component, Vec::new(), BindingElement::None)
    }

    pub fn component_provision(key: Key, dependency: Type, method: Ident) -> Self {
        Self::new(
            key,
            BindingKind::ComponentProvision,
            Vec::new(),
            BindingElement::DependencyMethod { dependency, method },
        )
    }

    pub fn component_dependency(key: Key) -> Self {
        Self::new(
            key,
            BindingKind::ComponentDependency,
            Vec::new(),
            BindingElement::None,
        )
    }

    pub fn bound_instance(key: Key) -> Self {
        Self::new(
            key,
            BindingKind::BoundInstance,
            Vec::new(),
            BindingElement::None,
        )
    }

    pub fn subcomponent_creator(key: Key, component: impl Into<String>) -> Self {
        Self::new(
            key,
            BindingKind::SubcomponentCreator,
            Vec::new(),
            BindingElement::Subcomponent {
                component: component.into(),
            },
        )
    }

    pub fn assisted_injection(key: Key, path: Path, dependencies: Vec<BindingRequest>) -> Self {
        Self::new(
            key,
            BindingKind::AssistedInjection,
            dependencies,
            BindingElement::Constructor { path },
        )
    }

    pub fn assisted_factory(key: Key, target: Key) -> Self {
        Self::new(
            key,
            BindingKind::AssistedFactory,
            vec![BindingRequest::provider(target)],
            BindingElement::None,
        )
    }

    pub fn members_injection(key: Key, sites: Vec<(Ident, BindingRequest)>) -> Self {
        let (fields, dependencies) = sites.into_iter().unzip();
        Self::new(
            key,
            BindingKind::MembersInjection,
            dependencies,
            BindingElement::InjectionSites { fields },
        )
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Marks the contributed type as not visible from the generated
    /// component's location, which forces erased field types. Visibility
    /// analysis itself belongs to the upstream graph validator.
    pub fn inaccessible(mut self) -> Self {
        self.accessible = false;
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn dependencies(&self) -> &[BindingRequest] {
        &self.dependencies
    }

    pub fn element(&self) -> &BindingElement {
        &self.element
    }

    pub fn is_accessible(&self) -> bool {
        self.accessible
    }
}
