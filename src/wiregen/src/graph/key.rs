use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use quote::ToTokens;
use syn::Type;

/// The (type, qualifier) identity of a requested dependency.
///
/// Keys are structurally comparable value objects produced by the binding
/// graph and used as hash/equality keys throughout generation. They are
/// never mutated.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
    target: Type,
    qualifier: Option<Qualifier>,
}

/// Distinguishes two bindings of the same target type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Named(String),
}

impl Key {
    pub fn of(target: Type) -> Self {
        Self {
            target,
            qualifier: None,
        }
    }

    pub fn named(target: Type, name: impl Into<String>) -> Self {
        Self {
            target,
            qualifier: Some(Qualifier::Named(name.into())),
        }
    }

    /// Parses an unqualified key from source text.
    pub fn parse(source: &str) -> Result<Self, syn::Error> {
        Ok(Self::of(syn::parse_str(source)?))
    }

    /// Parses a named key from source text.
    pub fn parse_named(source: &str, name: impl Into<String>) -> Result<Self, syn::Error> {
        Ok(Self::named(syn::parse_str(source)?, name))
    }

    pub fn target(&self) -> &Type {
        &self.target
    }

    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    /// A `CamelCase` stem derived from the key, usable in generated type
    /// names such as factory and switching-provider classes.
    pub fn type_stem(&self) -> String {
        let mut stem = String::new();
        if let Some(Qualifier::Named(name)) = &self.qualifier {
            stem.push_str(&capitalize(name));
        }
        for word in type_words(&self.target) {
            stem.push_str(&capitalize(&word));
        }
        stem
    }

    /// A `snake_case` stem derived from the key, usable in generated field
    /// and method names.
    pub fn name_stem(&self) -> String {
        snake_case(&self.type_stem())
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Key({self})")
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.target.to_token_stream())?;
        if let Some(Qualifier::Named(name)) = &self.qualifier {
            write!(f, " @{name}")?;
        }
        Ok(())
    }
}

/// Splits the token rendering of a type into identifier-ish words, dropping
/// punctuation and generic brackets.
fn type_words(target: &Type) -> Vec<String> {
    let rendered = target.to_token_stream().to_string();
    rendered
        .split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn snake_case(input: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for ch in input.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else if ch == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = true;
        }
    }
    out.trim_matches('_').to_owned()
}
