//! Namespace partition key and the request context it is resolved from.
//!
//! Every store operation is scoped to a [`Namespace`]. Callers either pass one
//! explicitly or resolve it from a [`Context`] built at the request boundary
//! (e.g. from an authenticated tenant). A context without a namespace resolves
//! to [`Namespace::DEFAULT`].

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Logical partition isolating one tenant's aggregates from another's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// The baseline namespace used when a context carries none.
    pub const DEFAULT: &'static str = "default";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl core::fmt::Display for Namespace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Namespace {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strict parsing for untrusted input (headers, config): blank names are rejected.
impl FromStr for Namespace {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("namespace must not be blank"));
        }
        Ok(Self::new(trimmed))
    }
}

/// Request-scoped values threaded explicitly through store calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    namespace: Option<Namespace>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this context scoped to `namespace`.
    pub fn with_namespace(&self, namespace: impl Into<Namespace>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }

    /// Resolve the partition key, falling back to [`Namespace::DEFAULT`].
    pub fn namespace(&self) -> Namespace {
        self.namespace.clone().unwrap_or_default()
    }
}
