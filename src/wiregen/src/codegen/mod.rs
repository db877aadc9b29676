mod creator;
mod framework;
mod representation;
mod shard;
mod switching;

use std::collections::{HashMap, HashSet};

use proc_macro2::{Span, TokenStream};
use quote::quote;
use snafu::prelude::*;
use syn::Ident;
use tracing::debug;

use crate::config::CodegenConfig;
use crate::diagnostics::{Diagnostics, Severity};
use crate::graph::{
    BindingGraph, BindingRequest, ComponentId, ComponentMethod, Key, RequestKind,
};
use crate::output::{
    FieldSpec, Location, MemberKind, MemberSelect, MethodSpec, NameAllocator, Receiver, ShardId,
    TypeSpec,
};

use creator::RequirementState;
use framework::FrameworkField;
use representation::ReprSlot;
pub use representation::Representation;
use shard::ShardState;
use switching::SwitchingState;

/// Fatal generation failures.
///
/// These indicate that the upstream graph validation was bypassed or that a
/// new binding or request kind reached a dispatch table that does not handle
/// it. Generation of the current component aborts, since continuing would
/// emit silently-incorrect code.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum GenerationError {
    #[snafu(display("no binding representation found for {key}"))]
    #[non_exhaustive]
    NoBindingRepresentation { key: Key },
    #[snafu(display(
        "a provider of the assisted injection binding {key} cannot be requested directly; \
         request its assisted factory instead"
    ))]
    #[non_exhaustive]
    AssistedInjectionProvider { key: Key },
    #[snafu(display("request kind {kind:?} for {key} is not supported by this generator"))]
    #[non_exhaustive]
    UnsupportedRequestKind { key: Key, kind: RequestKind },
}

/// Generates the component implementation tree for a binding graph.
pub fn generate(
    graph: &BindingGraph,
    config: &CodegenConfig,
    diagnostics: &mut dyn Diagnostics,
) -> Result<TypeSpec, GenerationError> {
    Generator::new(graph, config, diagnostics).generate()
}

/// One generation pass over a binding graph.
///
/// All mutable state is scoped to this object and the per-component
/// [`ComponentState`] values it owns; nothing outlives the pass.
pub struct Generator<'a> {
    graph: &'a BindingGraph,
    config: &'a CodegenConfig,
    diagnostics: &'a mut dyn Diagnostics,
    components: Vec<Option<ComponentState>>,
    representations_created: usize,
}

/// Per-component generation state: the representation cache, the cached
/// framework fields, the shards and their allocators.
pub(crate) struct ComponentState {
    pub(crate) impl_name: Ident,
    pub(crate) builder_name: Ident,
    pub(crate) component_field: Ident,
    pub(crate) parent_field: Option<Ident>,
    pub(crate) shards: Vec<ShardState>,
    pub(crate) shard_of: HashMap<Key, ShardId>,
    pub(crate) shard_fields: Vec<(ShardId, Ident)>,
    pub(crate) representations: HashMap<BindingRequest, ReprSlot>,
    pub(crate) framework_fields: HashMap<Key, FrameworkField>,
    pub(crate) private_methods: HashMap<BindingRequest, MemberSelect>,
    pub(crate) switching: SwitchingState,
    pub(crate) type_names: NameAllocator,
    pub(crate) requirements: Vec<RequirementState>,
    pub(crate) methods_emitted: HashSet<String>,
}

impl<'a> Generator<'a> {
    pub fn new(
        graph: &'a BindingGraph,
        config: &'a CodegenConfig,
        diagnostics: &'a mut dyn Diagnostics,
    ) -> Self {
        let mut components = Vec::new();
        components.resize_with(graph.component_count(), || None);
        Self {
            graph,
            config,
            diagnostics,
            components,
            representations_created: 0,
        }
    }

    /// Generates the whole component tree, depth first, returning the root
    /// component implementation with every subcomponent nested inside it.
    pub fn generate(&mut self) -> Result<TypeSpec, GenerationError> {
        self.generate_component(self.graph.root())
    }

    /// Number of request representations constructed so far. Each requested
    /// (binding, request-kind) pair accounts for at most one.
    pub fn representations_created(&self) -> usize {
        self.representations_created
    }

    fn generate_component(&mut self, cid: ComponentId) -> Result<TypeSpec, GenerationError> {
        debug!(component = %self.graph.node(cid).name(), "generating component implementation");
        self.setup_component(cid);
        self.generate_component_methods(cid)?;
        let children_ids = self.graph.node(cid).children().to_vec();
        let mut children = Vec::new();
        for child in children_ids {
            children.push(self.generate_component(child)?);
        }
        self.finalize_component(cid, children)
    }

    fn setup_component(&mut self, cid: ComponentId) {
        let node = self.graph.node(cid);
        let name = node.name().to_string();
        let impl_name = Ident::new(&format!("{name}Impl"), Span::call_site());
        let builder_name = Ident::new(&format!("{name}Builder"), Span::call_site());

        let mut state = ComponentState {
            impl_name,
            builder_name: builder_name.clone(),
            component_field: Ident::new("component", Span::call_site()),
            parent_field: None,
            shards: Vec::new(),
            shard_of: HashMap::new(),
            shard_fields: Vec::new(),
            representations: HashMap::new(),
            framework_fields: HashMap::new(),
            private_methods: HashMap::new(),
            switching: SwitchingState::new(),
            type_names: NameAllocator::new(),
            requirements: Vec::new(),
            methods_emitted: HashSet::new(),
        };
        state.type_names.preclaim(&builder_name.to_string());
        for &child in node.children() {
            let child_name = self.graph.node(child).name().to_string();
            state.type_names.preclaim(&format!("{child_name}Impl"));
        }
        self.components[cid.index()] = Some(state);

        self.assign_shards(cid);

        {
            let shard = &mut self.state_mut(cid).shards[ShardId::COMPONENT.index()];
            shard.method_names.preclaim("new");
            shard.method_names.preclaim("builder");
        }
        for method in node.methods() {
            let method_name = method.name.to_string();
            if method_name == "new" || method_name == "builder" {
                self.diagnostics.report(
                    Severity::Error,
                    &method_name,
                    "component method name collides with a generated member",
                );
            }
            let shard = &mut self.state_mut(cid).shards[ShardId::COMPONENT.index()];
            shard.method_names.preclaim(&method_name);
        }

        if let Some(parent) = node.parent() {
            let parent_impl = self.state(parent).impl_name.clone();
            let state = self.state_mut(cid);
            let shard = &mut state.shards[ShardId::COMPONENT.index()];
            let field = shard.field_names.claim("parent");
            shard.fields.push(FieldSpec {
                name: field.clone(),
                ty: quote! { #parent_impl },
            });
            state.parent_field = Some(field);
        }

        self.setup_requirements(cid);
    }

    fn generate_component_methods(&mut self, cid: ComponentId) -> Result<(), GenerationError> {
        let node = self.graph.node(cid);
        let loc = Location::shard(cid, ShardId::COMPONENT);
        for method in node.methods() {
            let signature = method_signature(method);
            if !self.state_mut(cid).methods_emitted.insert(signature) {
                continue;
            }
            match method.request.kind {
                RequestKind::MembersInjection => {
                    let target = method.request.key.target();
                    let call = self.request_expression(cid, &method.request, loc)?;
                    let mut spec = MethodSpec::new(method.name.clone(), Receiver::Ref);
                    spec.public = true;
                    spec.params.push((
                        Ident::new("instance", Span::call_site()),
                        quote! { &mut #target },
                    ));
                    spec.body.push(quote! { #call; });
                    self.state_mut(cid).shards[ShardId::COMPONENT.index()]
                        .methods
                        .push(spec);
                }
                _ => {
                    let expression = self.request_expression(cid, &method.request, loc)?;
                    if self.is_claimed_component_method(cid, method) {
                        continue;
                    }
                    let mut spec = MethodSpec::new(method.name.clone(), Receiver::Ref);
                    spec.public = true;
                    spec.ret = Some(self.request_type_tokens(&method.request));
                    spec.body.push(expression);
                    self.state_mut(cid).shards[ShardId::COMPONENT.index()]
                        .methods
                        .push(spec);
                }
            }
        }
        Ok(())
    }

    /// True if the direct representation already claimed this declared
    /// method as its public home, in which case emitting a wrapper would
    /// produce a self-call.
    fn is_claimed_component_method(&self, cid: ComponentId, method: &ComponentMethod) -> bool {
        self.state(cid)
            .private_methods
            .get(&method.request)
            .is_some_and(|select| {
                select.component == cid
                    && select.shard == ShardId::COMPONENT
                    && select.kind == MemberKind::Method
                    && select.name == method.name
            })
    }

    fn finalize_component(
        &mut self,
        cid: ComponentId,
        children: Vec<TypeSpec>,
    ) -> Result<TypeSpec, GenerationError> {
        let switching_types = self.finalize_switching(cid);
        let creator = self.finalize_creator(cid);
        let shard_types = self.finalize_shards(cid);

        let state = match self.components[cid.index()].take() {
            Some(state) => state,
            None => unreachable!("a component should be set up before it is finalized"),
        };
        let mut shards = state.shards;
        let component_shard = shards.remove(ShardId::COMPONENT.index());

        let mut spec = TypeSpec::new(state.impl_name);
        spec.fields = component_shard.fields;
        spec.methods = component_shard.methods;
        if self.graph.node(cid).parent().is_none() {
            let builder_name = &state.builder_name;
            let mut accessor =
                MethodSpec::new(Ident::new("builder", Span::call_site()), Receiver::Static);
            accessor.public = true;
            accessor.ret = Some(quote! { #builder_name });
            accessor.body.push(quote! { #builder_name::new() });
            spec.methods.insert(1.min(spec.methods.len()), accessor);
        }
        spec.nested.extend(shard_types);
        spec.nested.push(creator);
        spec.nested.extend(switching_types);
        spec.nested.extend(children);
        debug!(component = %spec.name, "finished component implementation");
        Ok(spec)
    }

    /// The expression referring to `select` from code located at `loc`: a
    /// bare member access when the requester sits in the owning shard, or a
    /// path through component, parent and shard fields otherwise.
    pub(crate) fn member_expression(
        &mut self,
        select: &MemberSelect,
        loc: Location,
    ) -> TokenStream {
        let name = &select.name;
        if !loc.is_nested() && loc.component == select.component && loc.shard == select.shard {
            return quote! { self.#name };
        }
        let mut path = self.component_ref(select.component, loc);
        if !select.shard.is_component_shard() {
            let shard_field = self.shard_field(select.component, select.shard);
            path = quote! { #path.#shard_field };
        }
        quote! { #path.#name }
    }

    /// The expression referring to `owner`'s component shard from `loc`.
    pub(crate) fn component_ref(&self, owner: ComponentId, loc: Location) -> TokenStream {
        let mut path = quote! { self };
        if loc.is_nested() || !loc.shard.is_component_shard() {
            let component_field = &self.state(loc.component).component_field;
            path = quote! { #path.#component_field };
        }
        let mut at = loc.component;
        while at != owner {
            let parent_field = match &self.state(at).parent_field {
                Some(field) => field.clone(),
                None => unreachable!("a requested member should live on an ancestor component"),
            };
            path = quote! { #path.#parent_field };
            at = match self.graph.node(at).parent() {
                Some(parent) => parent,
                None => unreachable!("the parent chain should reach the owning component"),
            };
        }
        path
    }

    /// Return type tokens for a component method implementing `request`.
    pub(crate) fn request_type_tokens(&self, request: &BindingRequest) -> TokenStream {
        let target = request.key.target();
        match request.kind {
            RequestKind::Provider => quote! { Arc<dyn Provider<#target>> },
            RequestKind::Lazy => quote! { Lazy<#target> },
            RequestKind::ProviderOfLazy => quote! { ProviderOfLazy<#target> },
            _ => quote! { #target },
        }
    }

    pub(crate) fn shard_of(&self, cid: ComponentId, key: &Key) -> ShardId {
        match self.state(cid).shard_of.get(key) {
            Some(&shard) => shard,
            None => unreachable!("every local binding should be assigned to a shard"),
        }
    }

    pub(crate) fn push_initialization(
        &mut self,
        cid: ComponentId,
        shard: ShardId,
        statement: TokenStream,
    ) {
        self.state_mut(cid).shards[shard.index()]
            .init_statements
            .push(statement);
    }

    pub(crate) fn state(&self, cid: ComponentId) -> &ComponentState {
        match &self.components[cid.index()] {
            Some(state) => state,
            None => unreachable!("a component should be set up before it is queried"),
        }
    }

    pub(crate) fn state_mut(&mut self, cid: ComponentId) -> &mut ComponentState {
        match &mut self.components[cid.index()] {
            Some(state) => state,
            None => unreachable!("a component should be set up before it is queried"),
        }
    }
}

fn method_signature(method: &ComponentMethod) -> String {
    match method.request.kind {
        RequestKind::MembersInjection => format!("{}({})", method.name, method.request.key),
        _ => format!("{}()", method.name),
    }
}
