//! Correlation tokens for deferred dispatch.
//!
//! A token is returned immediately by a non-blocking dispatch and later used
//! as the lookup key for its result. Tokens carry no structure beyond
//! uniqueness within the process lifetime.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque identifier of one deferred dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Wraps an existing token string, e.g. one received back from a transport.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for CorrelationToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Source of fresh correlation tokens.
pub trait TokenIssuer: Send + Sync {
    /// Issues a token that has not been issued before by this issuer.
    fn issue(&self) -> CorrelationToken;
}

/// Issues ULID strings.
///
/// ULIDs are lexicographically sortable by creation time, which keeps tokens
/// readable in logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UlidTokenIssuer;

impl UlidTokenIssuer {
    /// Creates a new issuer.
    pub fn new() -> Self {
        Self
    }
}

impl TokenIssuer for UlidTokenIssuer {
    fn issue(&self) -> CorrelationToken {
        CorrelationToken(ulid::Ulid::new().to_string())
    }
}

/// Issues `"{prefix}-{n}"` tokens from a monotonically increasing counter.
///
/// Deterministic, which makes it convenient in tests and single-process
/// deployments where the prefix identifies the process.
#[derive(Debug)]
pub struct SequenceTokenIssuer {
    prefix: String,
    next: AtomicU64,
}

impl SequenceTokenIssuer {
    /// Creates an issuer starting at 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    /// Returns the prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl TokenIssuer for SequenceTokenIssuer {
    fn issue(&self) -> CorrelationToken {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationToken(format!("{}-{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ulid_tokens_are_unique() {
        let issuer = UlidTokenIssuer::new();
        let tokens: HashSet<_> = (0..1000).map(|_| issuer.issue()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_ulid_token_parses_back() {
        let token = UlidTokenIssuer::new().issue();
        assert!(ulid::Ulid::from_string(token.as_str()).is_ok());
    }

    #[test]
    fn test_sequence_tokens() {
        let issuer = SequenceTokenIssuer::new("node1");
        assert_eq!(issuer.issue().as_str(), "node1-1");
        assert_eq!(issuer.issue().as_str(), "node1-2");
    }

    #[test]
    fn test_sequence_tokens_unique_across_threads() {
        let issuer = Arc::new(SequenceTokenIssuer::new("t"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let issuer = Arc::clone(&issuer);
                std::thread::spawn(move || (0..250).map(|_| issuer.issue()).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(all.insert(token));
            }
        }
        assert_eq!(all.len(), 1000);
    }
}
