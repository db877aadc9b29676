mod binding;
mod key;

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::hash::{Hash, Hasher};

use proc_macro2::Span;
use snafu::prelude::*;
use syn::{Ident, Type};

pub use binding::{Binding, BindingElement, BindingKind, BindingRequest, RequestKind, Scope};
pub use key::{Key, Qualifier};

/// Index of a component node within its binding graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(usize);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A method declared on the component interface, to be implemented by the
/// generated component.
#[derive(Debug, Clone)]
pub struct ComponentMethod {
    pub name: Ident,
    pub request: BindingRequest,
}

/// What a requirement supplies to the component under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementKind {
    Module,
    BoundInstance,
    Dependency,
}

/// An externally-supplied value a component needs to construct itself: a
/// module instance, a bound value or a dependency component.
///
/// Equality and hashing ignore accessibility, so the same requirement
/// declared on two components compares equal regardless of where it is
/// visible from.
#[derive(Debug, Clone)]
pub struct ComponentRequirement {
    kind: RequirementKind,
    key: Key,
    accessible: bool,
}

impl ComponentRequirement {
    pub fn module(ty: Type) -> Self {
        Self {
            kind: RequirementKind::Module,
            key: Key::of(ty),
            accessible: true,
        }
    }

    pub fn bound_instance(key: Key) -> Self {
        Self {
            kind: RequirementKind::BoundInstance,
            key,
            accessible: true,
        }
    }

    pub fn dependency(ty: Type) -> Self {
        Self {
            kind: RequirementKind::Dependency,
            key: Key::of(ty),
            accessible: true,
        }
    }

    pub fn inaccessible(mut self) -> Self {
        self.accessible = false;
        self
    }

    pub fn kind(&self) -> RequirementKind {
        self.kind
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    pub fn name_stem(&self) -> String {
        self.key.name_stem()
    }
}

impl PartialEq for ComponentRequirement {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.key == other.key
    }
}

impl Eq for ComponentRequirement {}

impl Hash for ComponentRequirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.key.hash(state);
    }
}

/// One node of the component tree: a component interface together with its
/// local bindings, declared methods and requirements.
#[derive(Debug)]
pub struct ComponentNode {
    name: Ident,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
    bindings: Vec<Binding>,
    index: HashMap<Key, usize>,
    methods: Vec<ComponentMethod>,
    requirements: Vec<ComponentRequirement>,
}

impl ComponentNode {
    fn new(name: Ident, parent: Option<ComponentId>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            bindings: Vec::new(),
            index: HashMap::new(),
            methods: Vec::new(),
            requirements: Vec::new(),
        }
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn binding(&self, key: &Key) -> Option<&Binding> {
        self.index.get(key).map(|&at| &self.bindings[at])
    }

    pub fn methods(&self) -> &[ComponentMethod] {
        &self.methods
    }

    pub fn requirements(&self) -> &[ComponentRequirement] {
        &self.requirements
    }
}

/// The immutable, validated input to one generation pass.
///
/// The graph maps each key to the binding that satisfies it, per component,
/// and records the component tree. The generator treats it as a read-only
/// oracle.
#[derive(Debug)]
pub struct BindingGraph {
    nodes: Vec<ComponentNode>,
}

impl BindingGraph {
    pub fn root(&self) -> ComponentId {
        ComponentId(0)
    }

    pub fn component_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: ComponentId) -> &ComponentNode {
        &self.nodes[id.0]
    }

    /// The closest component on the ancestor path of `from` (inclusive)
    /// holding a binding for `key`.
    pub fn resolving_component(&self, from: ComponentId, key: &Key) -> Option<ComponentId> {
        let mut current = Some(from);
        while let Some(id) = current {
            if self.node(id).binding(key).is_some() {
                return Some(id);
            }
            current = self.node(id).parent();
        }
        None
    }

    pub fn child_named(&self, from: ComponentId, name: &str) -> Option<ComponentId> {
        self.node(from)
            .children()
            .iter()
            .copied()
            .find(|&child| self.node(child).name().to_string() == name)
    }

    /// Whether satisfying `key` from `from` requires a cached holder.
    ///
    /// A scoped binding always does, except a delegate whose effective scope
    /// is no stronger than its target's, which can reuse the target's cache.
    pub fn requires_caching(&self, from: ComponentId, key: &Key) -> bool {
        let Some(owner) = self.resolving_component(from, key) else {
            return false;
        };
        let Some(binding) = self.node(owner).binding(key) else {
            return false;
        };
        match binding.kind() {
            BindingKind::Delegate => {
                if !binding.scope().is_scoped() {
                    return false;
                }
                let target = &binding.dependencies()[0].key;
                let target_scope = self
                    .resolving_component(owner, target)
                    .and_then(|id| self.node(id).binding(target))
                    .map_or(Scope::Unscoped, Binding::scope);
                !target_scope.outlives(binding.scope())
            }
            _ => binding.scope().is_scoped(),
        }
    }
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum GraphError {
    #[snafu(display("the key {key} is already bound in component {component}"))]
    #[non_exhaustive]
    KeyDuplicated { key: Key, component: String },
    #[snafu(display("no binding for {key} is reachable from component {component}"))]
    #[non_exhaustive]
    UnresolvedDependency { key: Key, component: String },
    #[snafu(display("aggregated binding graph errors:\n{}", AggregatedDisplayer::new(errors)))]
    Aggregated { errors: Vec<GraphError> },
}

struct AggregatedDisplayer<'a> {
    errors: &'a [GraphError],
}

impl<'a> AggregatedDisplayer<'a> {
    fn new(errors: &'a [GraphError]) -> Self {
        Self { errors }
    }
}

impl Display for AggregatedDisplayer<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for (i, error) in self.errors.iter().enumerate() {
            writeln!(f, "{:4}: {}", i + 1, error)?;
        }
        Ok(())
    }
}

/// Accumulates components, bindings, methods and requirements, then
/// validates the whole graph at once.
///
/// All structural errors are collected rather than failing fast, so a
/// single pass over a broken graph description surfaces every problem.
#[derive(Debug)]
pub struct GraphBuilder {
    nodes: Vec<ComponentNode>,
    errors: Vec<GraphError>,
}

impl GraphBuilder {
    pub fn new(root: &str) -> Self {
        Self {
            nodes: vec![ComponentNode::new(Ident::new(root, Span::call_site()), None)],
            errors: Vec::new(),
        }
    }

    pub fn root(&self) -> ComponentId {
        ComponentId(0)
    }

    /// Adds a child component under `parent` and returns its id.
    pub fn component(&mut self, parent: ComponentId, name: &str) -> ComponentId {
        let id = ComponentId(self.nodes.len());
        self.nodes
            .push(ComponentNode::new(Ident::new(name, Span::call_site()), Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn bind(&mut self, component: ComponentId, binding: Binding) {
        let node = &mut self.nodes[component.0];
        if node.index.contains_key(binding.key()) {
            self.errors.push(GraphError::KeyDuplicated {
                key: binding.key().clone(),
                component: node.name.to_string(),
            });
            return;
        }
        node.index.insert(binding.key().clone(), node.bindings.len());
        node.bindings.push(binding);
    }

    pub fn method(&mut self, component: ComponentId, name: &str, request: BindingRequest) {
        self.nodes[component.0].methods.push(ComponentMethod {
            name: Ident::new(name, Span::call_site()),
            request,
        });
    }

    pub fn require(&mut self, component: ComponentId, requirement: ComponentRequirement) {
        let node = &mut self.nodes[component.0];
        if !node.requirements.contains(&requirement) {
            node.requirements.push(requirement);
        }
    }

    /// Validates resolvability of every dependency edge and entry point,
    /// returning the finished graph or every error found.
    pub fn finish(mut self) -> Result<BindingGraph, GraphError> {
        let graph = BindingGraph { nodes: self.nodes };
        for id in 0..graph.component_count() {
            let id = ComponentId(id);
            let node = graph.node(id);
            let requested = node
                .bindings()
                .flat_map(|binding| binding.dependencies().iter())
                .chain(node.methods().iter().map(|method| &method.request));
            for request in requested {
                if graph.resolving_component(id, &request.key).is_none() {
                    self.errors.push(GraphError::UnresolvedDependency {
                        key: request.key.clone(),
                        component: node.name.to_string(),
                    });
                }
            }
        }

        match self.errors.len() {
            0 => Ok(graph),
            1 => Err(self.errors.remove(0)),
            _ => Err(GraphError::Aggregated {
                errors: self.errors,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(source: &str) -> Key {
        Key::parse(source).unwrap()
    }

    fn path(source: &str) -> syn::Path {
        syn::parse_str(source).unwrap()
    }

    #[test]
    fn builder_finish_succeeds_for_a_resolvable_graph() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));
        builder.bind(
            root,
            Binding::injection(
                key("Server"),
                path("Server"),
                vec![BindingRequest::instance(key("Config"))],
            ),
        );
        builder.method(root, "server", BindingRequest::instance(key("Server")));

        let graph = builder.finish().unwrap();
        assert_eq!(graph.component_count(), 1);
        assert!(graph.node(graph.root()).binding(&key("Server")).is_some());
    }

    #[test]
    fn builder_finish_fails_when_key_is_duplicated() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));
        builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));

        assert!(matches!(
            builder.finish(),
            Err(GraphError::KeyDuplicated { .. })
        ));
    }

    #[test]
    fn builder_finish_aggregates_all_errors() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        builder.bind(
            root,
            Binding::injection(
                key("Server"),
                path("Server"),
                vec![
                    BindingRequest::instance(key("Config")),
                    BindingRequest::instance(key("Logger")),
                ],
            ),
        );

        let Err(GraphError::Aggregated { errors }) = builder.finish() else {
            panic!("expected aggregated errors");
        };
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn resolving_component_walks_the_ancestor_path() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        let child = builder.component(root, "RequestComponent");
        builder.bind(root, Binding::injection(key("Config"), path("Config"), Vec::new()));
        builder.bind(
            child,
            Binding::injection(
                key("Handler"),
                path("Handler"),
                vec![BindingRequest::instance(key("Config"))],
            ),
        );

        let graph = builder.finish().unwrap();
        assert_eq!(graph.resolving_component(child, &key("Config")), Some(root));
        assert_eq!(graph.resolving_component(child, &key("Handler")), Some(child));
        assert_eq!(graph.resolving_component(root, &key("Handler")), None);
    }

    #[test]
    fn requires_caching_spares_a_delegate_no_stronger_than_its_target() {
        let mut builder = GraphBuilder::new("AppComponent");
        let root = builder.root();
        builder.bind(
            root,
            Binding::injection(key("EnglishGreeter"), path("EnglishGreeter"), Vec::new())
                .with_scope(Scope::Singleton),
        );
        builder.bind(
            root,
            Binding::delegate(key("dyn Greeter"), key("EnglishGreeter"))
                .with_scope(Scope::Singleton),
        );
        builder.bind(
            root,
            Binding::delegate(key("dyn Display"), key("Banner")).with_scope(Scope::Singleton),
        );
        builder.bind(root, Binding::injection(key("Banner"), path("Banner"), Vec::new()));

        let graph = builder.finish().unwrap();
        let root = graph.root();
        assert!(!graph.requires_caching(root, &key("dyn Greeter")));
        assert!(graph.requires_caching(root, &key("dyn Display")));
        assert!(graph.requires_caching(root, &key("EnglishGreeter")));
        assert!(!graph.requires_caching(root, &key("Banner")));
    }
}
