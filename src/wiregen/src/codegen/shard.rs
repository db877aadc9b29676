use std::collections::HashMap;
use std::mem;

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::Ident;
use tracing::debug;

use crate::graph::{ComponentId, ComponentNode, Key};
use crate::output::{FieldSpec, MethodSpec, NameAllocator, Receiver, ShardId, TypeSpec};

use super::creator::RequirementStatus;
use super::Generator;

/// One partition of a component's bindings: its own fields, methods,
/// initialization statements and name scopes. Shard 0 is the component
/// shard, which additionally houses the constructor, creator, entry points
/// and every nested type.
pub(crate) struct ShardState {
    pub(crate) name: Ident,
    pub(crate) fields: Vec<FieldSpec>,
    pub(crate) methods: Vec<MethodSpec>,
    pub(crate) init_statements: Vec<TokenStream>,
    pub(crate) field_names: NameAllocator,
    pub(crate) method_names: NameAllocator,
}

impl ShardState {
    fn new(name: Ident) -> Self {
        Self {
            name,
            fields: Vec::new(),
            methods: Vec::new(),
            init_statements: Vec::new(),
            field_names: NameAllocator::new(),
            method_names: NameAllocator::new(),
        }
    }
}

/// Splits a component's local bindings into shard-sized partitions.
///
/// Strongly-connected components of the local dependency graph are walked
/// with dependencies ahead of their dependents, accumulating into the
/// current partition; a partition closes once it reaches the target size. A
/// strongly-connected set is never split, even when that overshoots the
/// target, so a cycle always initializes within one shard.
pub(crate) fn partition_bindings(node: &ComponentNode, target: usize) -> Vec<Vec<Key>> {
    let keys: Vec<Key> = node.bindings().map(|binding| binding.key().clone()).collect();
    if keys.len() <= target {
        return vec![keys];
    }

    let mut graph = DiGraph::<usize, ()>::new();
    let mut indices = HashMap::new();
    for (position, key) in keys.iter().enumerate() {
        indices.insert(key.clone(), graph.add_node(position));
    }
    for binding in node.bindings() {
        let from = indices[binding.key()];
        for dependency in binding.dependencies() {
            if let Some(&to) = indices.get(&dependency.key) {
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut partitions = Vec::new();
    let mut current = Vec::new();
    for scc in tarjan_scc(&graph) {
        current.extend(scc.into_iter().map(|index| keys[graph[index]].clone()));
        if current.len() >= target {
            partitions.push(mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        partitions.push(current);
    }
    partitions
}

impl Generator<'_> {
    /// Assigns every local binding to a shard and creates the shard states.
    pub(crate) fn assign_shards(&mut self, cid: ComponentId) {
        let node = self.graph.node(cid);
        let partitions = partition_bindings(node, self.config.keys_per_shard);
        debug!(
            component = %node.name(),
            shards = partitions.len(),
            "partitioned bindings into shards"
        );
        let state = self.state_mut(cid);
        for (index, partition) in partitions.into_iter().enumerate() {
            let name = if index == 0 {
                state.impl_name.clone()
            } else {
                state.type_names.claim(&format!("Shard{index}"))
            };
            for key in partition {
                state.shard_of.insert(key, ShardId::new(index));
            }
            state.shards.push(ShardState::new(name));
        }
    }

    /// The component-shard field addressing `shard`, created on first use.
    /// Its instantiation statement is deferred into the component shard's
    /// constructor at finalization.
    pub(crate) fn shard_field(&mut self, cid: ComponentId, shard: ShardId) -> Ident {
        let state = self.state_mut(cid);
        if let Some((_, name)) = state
            .shard_fields
            .iter()
            .find(|(existing, _)| *existing == shard)
        {
            return name.clone();
        }
        let shard_ty = state.shards[shard.index()].name.clone();
        let component_shard = &mut state.shards[ShardId::COMPONENT.index()];
        let name = component_shard
            .field_names
            .claim(&format!("shard{}", shard.index()));
        component_shard.fields.push(FieldSpec {
            name: name.clone(),
            ty: quote! { #shard_ty },
        });
        state.shard_fields.push((shard, name.clone()));
        name
    }

    /// Chunks each shard's initialization statements into size-bounded
    /// `initialize` methods, builds every shard constructor and detaches the
    /// non-component shards as nested types.
    pub(crate) fn finalize_shards(&mut self, cid: ComponentId) -> Vec<TypeSpec> {
        let statements_per_method = self.config.statements_per_init_method;
        let shard_count = self.state(cid).shards.len();
        let impl_name = self.state(cid).impl_name.clone();

        for index in 0..shard_count {
            let mut initializers = Vec::new();
            {
                let shard = &mut self.state_mut(cid).shards[index];
                let statements = mem::take(&mut shard.init_statements);
                for chunk in statements.chunks(statements_per_method) {
                    let name = shard.method_names.claim("initialize");
                    let mut spec = MethodSpec::new(name.clone(), Receiver::RefMut);
                    spec.body = chunk.to_vec();
                    shard.methods.push(spec);
                    initializers.push(name);
                }
            }

            let mut constructor =
                MethodSpec::new(Ident::new("new", Span::call_site()), Receiver::Static);
            constructor.public = true;
            constructor.ret = Some(quote! { Self });
            constructor
                .body
                .push(quote! { let mut this = Self::default(); });

            if index == ShardId::COMPONENT.index() {
                let state = self.state(cid);
                if let Some(parent_field) = state.parent_field.clone() {
                    constructor
                        .params
                        .push((parent_field.clone(), quote! { #impl_name }));
                    constructor
                        .body
                        .push(quote! { this.#parent_field = #parent_field; });
                }
                let supplied: Vec<(Ident, TokenStream)> = state
                    .requirements
                    .iter()
                    .filter(|requirement| requirement.status == RequirementStatus::Needed)
                    .map(|requirement| {
                        let field = match &requirement.field {
                            Some(field) => field.clone(),
                            None => unreachable!("a needed requirement should have a field"),
                        };
                        let target = requirement.requirement.key().target().clone();
                        (field, quote! { #target })
                    })
                    .collect();
                for (field, ty) in supplied {
                    constructor.body.push(quote! { this.#field = #field; });
                    constructor.params.push((field, ty));
                }
                for initializer in &initializers {
                    constructor.body.push(quote! { this.#initializer(); });
                }
                // Deferred shard instantiations run after the component
                // shard's own initialization: shard i depends only on shards
                // at or below i, so each shard finds everything it needs
                // already initialized.
                let mut shard_fields = state.shard_fields.clone();
                shard_fields.sort_by_key(|(shard, _)| shard.index());
                for (shard, field) in shard_fields {
                    let shard_ty = state.shards[shard.index()].name.clone();
                    constructor
                        .body
                        .push(quote! { this.#field = #shard_ty::new(this.clone()); });
                }
            } else {
                let component_field = self.state(cid).component_field.clone();
                constructor
                    .params
                    .push((component_field.clone(), quote! { #impl_name }));
                constructor
                    .body
                    .push(quote! { this.#component_field = #component_field; });
                for initializer in &initializers {
                    constructor.body.push(quote! { this.#initializer(); });
                }
            }
            constructor.body.push(quote! { this });
            self.state_mut(cid).shards[index].methods.insert(0, constructor);
        }

        let state = self.state_mut(cid);
        state
            .shards
            .drain(1..)
            .map(|shard| {
                let mut spec = TypeSpec::new(shard.name);
                spec.fields = shard.fields;
                spec.methods = shard.methods;
                spec
            })
            .collect()
    }
}
