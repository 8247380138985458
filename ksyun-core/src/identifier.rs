//! Composite identifiers for resources that live inside a parent collection
//!
//! A scaling-group member is stored as `child:parent`, e.g.
//! `a4ef95c5-...:541241314798505984`. Import strings name the parent first.

use std::fmt;
use std::str::FromStr;

pub const SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Invalid identifier '{id}': expected {expected}")]
    Malformed { id: String, expected: &'static str },
}

/// `child:parent` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    pub child: String,
    pub parent: String,
}

impl CompositeId {
    pub fn new(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }

    /// Parse a stored identifier (`child:parent`)
    pub fn parse(id: &str) -> Result<Self, IdentifierError> {
        let (child, parent) = split_pair(id, "'child:parent'")?;
        Ok(Self::new(child, parent))
    }

    /// Parse a stored identifier whose parent may contain the separator,
    /// such as an IPv6 address; the child ends at the first `:`
    pub fn parse_open_parent(id: &str) -> Result<Self, IdentifierError> {
        match id.split_once(SEPARATOR) {
            Some((child, parent)) if !child.is_empty() && !parent.is_empty() => {
                Ok(Self::new(child, parent))
            }
            _ => Err(IdentifierError::Malformed {
                id: id.to_string(),
                expected: "'child:parent'",
            }),
        }
    }

    /// Parse an import string (`parent:child`)
    pub fn parse_import(id: &str) -> Result<Self, IdentifierError> {
        let (parent, child) = split_pair(id, "'parent:child'")?;
        Ok(Self::new(child, parent))
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.child, SEPARATOR, self.parent)
    }
}

impl FromStr for CompositeId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_pair<'a>(
    id: &'a str,
    expected: &'static str,
) -> Result<(&'a str, &'a str), IdentifierError> {
    let malformed = || IdentifierError::Malformed {
        id: id.to_string(),
        expected,
    };
    let mut parts = id.split(SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) if !first.is_empty() && !second.is_empty() => {
            Ok((first, second))
        }
        _ => Err(malformed()),
    }
}
