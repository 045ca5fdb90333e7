use crate::error::{GuardError, GuardResult};
use std::collections::BTreeSet;

/// Which function names a transformation run applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Targets {
    /// Every declaration matched by the declaration pattern.
    #[default]
    All,
    /// Only the listed identifiers.
    Only(BTreeSet<String>),
}

impl Targets {
    /// Build an explicit identifier set, rejecting names PHP would not accept.
    pub fn only<I, S>(names: I) -> GuardResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            let name = name.as_ref().trim();
            if !is_identifier(name) {
                return Err(GuardError::InvalidIdentifier(name.to_string()));
            }
            set.insert(name.to_string());
        }
        Ok(Self::Only(set))
    }

    pub fn contains(&self, ident: &str) -> bool {
        match self {
            Targets::All => true,
            Targets::Only(set) => set.contains(ident),
        }
    }

    /// Explicit names, in sorted order. Empty for the wildcard.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Targets::All => Vec::new(),
            Targets::Only(set) => set.iter().map(String::as_str).collect(),
        }
    }
}

/// PHP label rule: `[a-zA-Z_\x80-\xff][a-zA-Z0-9_\x80-\xff]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let head_ok = first == '_' || first.is_ascii_alphabetic() || !first.is_ascii();
    head_ok && chars.all(|c| c == '_' || c.is_ascii_alphanumeric() || !c.is_ascii())
}
