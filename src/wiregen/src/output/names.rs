use std::collections::HashSet;

use proc_macro2::Span;
use syn::Ident;

/// A collision-avoiding namer for one generation scope.
///
/// Each shard and component wrapper owns its own allocators, one per
/// namespace (fields, methods, types), so the same base name can be reused
/// freely across scopes while staying unique within one.
#[derive(Debug, Default)]
pub struct NameAllocator {
    claimed: HashSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `name` without handing out an identifier, e.g. for names
    /// inherited from a supertype. Returns false if it was already taken.
    pub fn preclaim(&mut self, name: &str) -> bool {
        self.claimed.insert(name.to_owned())
    }

    /// Claims `base` if free, otherwise the first `base2`, `base3`, …
    /// that is.
    pub fn claim(&mut self, base: &str) -> Ident {
        if self.claimed.insert(base.to_owned()) {
            return Ident::new(base, Span::call_site());
        }
        let mut suffix = 2usize;
        loop {
            let candidate = format!("{base}{suffix}");
            if self.claimed.insert(candidate.clone()) {
                return Ident::new(&candidate, Span::call_site());
            }
            suffix += 1;
        }
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.claimed.contains(name)
    }
}
