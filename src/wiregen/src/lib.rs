#![allow(clippy::new_without_default)]

pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod graph;
pub mod output;

pub mod prelude {
    pub use crate::codegen::{generate, GenerationError, Generator};
    pub use crate::config::{CodegenConfig, CompilerMode};
    pub use crate::diagnostics::{CollectingDiagnostics, Diagnostics, Severity};
    pub use crate::graph::{
        Binding, BindingGraph, BindingKind, BindingRequest, ComponentRequirement, GraphBuilder,
        GraphError, Key, RequestKind, Scope,
    };
    pub use crate::output::TypeSpec;
}
