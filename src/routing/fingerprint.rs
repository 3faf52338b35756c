//! Order-independent fingerprints of route expression sets.

use std::fmt;

use sha2::{Digest, Sha256};

/// SHA-256 over the sorted, de-duplicated, trimmed expression strings.
///
/// Two routes whose expressions form the same set share a fingerprint no
/// matter how the expressions are ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of<S: AsRef<str>>(expressions: &[S]) -> Self {
        let mut set: Vec<&str> = expressions.iter().map(|e| e.as_ref().trim()).collect();
        set.sort_unstable();
        set.dedup();

        let mut hasher = Sha256::new();
        for (i, expression) in set.iter().enumerate() {
            if i > 0 {
                // Unit separator keeps ["ab", "c"] apart from ["a", "bc"].
                hasher.update([0x1f]);
            }
            hasher.update(expression.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
