use std::fmt::{Display, Formatter, Result as FmtResult};

/// The generation mode selected by the surrounding compiler invocation.
///
/// The mode is an opaque pass-through from the build configuration; this
/// crate only consults it where representation selection and provider
/// materialization differ between modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompilerMode {
    #[default]
    Default,
    /// Minimizes the number of generated holder types by multiplexing
    /// provider creation logic into shared switching classes.
    FastInit,
    ExperimentalMerged,
}

impl CompilerMode {
    pub fn is_fast_init(self) -> bool {
        self == Self::FastInit
    }

    pub fn to_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::FastInit => "fast-init",
            Self::ExperimentalMerged => "experimental-merged",
        }
    }
}

impl Display for CompilerMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.to_str())
    }
}

/// Size ceilings and mode for one generation pass.
///
/// The numeric ceilings exist to keep any one generated type or method below
/// platform size limits. The defaults reproduce the historically effective
/// values, but nothing in the partitioning algorithms depends on the exact
/// numbers.
#[derive(Debug, Clone)]
pub struct CodegenConfig {
    pub mode: CompilerMode,
    /// Bindings assigned to one shard before a new one is started.
    pub keys_per_shard: usize,
    /// Switch cases multiplexed into one switching-provider class before a
    /// new class is started.
    pub keys_per_switching_class: usize,
    /// Switch cases grouped into one dispatch helper method.
    pub cases_per_method: usize,
    /// Statements grouped into one `initialize` method.
    pub statements_per_init_method: usize,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            mode: CompilerMode::Default,
            keys_per_shard: 3500,
            keys_per_switching_class: 10_000,
            cases_per_method: 100,
            statements_per_init_method: 100,
        }
    }
}

impl CodegenConfig {
    pub fn with_mode(mode: CompilerMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}
