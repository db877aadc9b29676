use std::fmt::{Display, Formatter, Result as FmtResult};

/// Severity of a reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Sink for user-facing generation diagnostics.
///
/// Diagnostics describe problems in user-authored declarations (for example
/// a component method whose name collides with one the generator must
/// synthesize). They are attached to the offending element and do not halt
/// generation of unrelated components, so one pass surfaces every such
/// problem at once.
#[cfg_attr(test, mockall::automock)]
pub trait Diagnostics {
    fn report(&mut self, severity: Severity, element: &str, message: &str);
}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub element: String,
    pub message: String,
}

/// A [`Diagnostics`] implementation that records everything it receives.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    entries: Vec<Diagnostic>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity == Severity::Error)
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn report(&mut self, severity: Severity, element: &str, message: &str) {
        self.entries.push(Diagnostic {
            severity,
            element: element.to_owned(),
            message: message.to_owned(),
        });
    }
}
