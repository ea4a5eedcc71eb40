//! Container ID handling.
//!
//! Container IDs arrive from the container runtime through the CNI plugin
//! and are otherwise opaque to podwire. They are only required to be usable
//! as the seed of interface names and store keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PodwireError, PodwireResult};

/// A validated container ID.
///
/// Container IDs must:
/// - Be non-empty
/// - Contain no whitespace, control characters or `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Create a new container ID, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID format is invalid.
    pub fn new(id: impl Into<String>) -> PodwireResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the container ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first `max_chars` characters of the ID.
    ///
    /// Truncation is by prefix and always lands on a character boundary, so
    /// the same ID always yields the same prefix.
    #[must_use]
    pub fn prefix(&self, max_chars: usize) -> &str {
        match self.0.char_indices().nth(max_chars) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    fn validate(id: &str) -> PodwireResult<()> {
        if id.is_empty() {
            return Err(PodwireError::InvalidContainerId { id: id.to_string() });
        }

        if id
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '/')
        {
            return Err(PodwireError::InvalidContainerId { id: id.to_string() });
        }

        Ok(())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = PodwireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_container_ids() {
        assert!(ContainerId::new("c1").is_ok());
        assert!(ContainerId::new("sadfja813227wdhfjkh2319784dgh").is_ok());
        assert!(ContainerId::new("my_container-1.k8s").is_ok());
    }

    #[test]
    fn invalid_container_ids() {
        assert!(ContainerId::new("").is_err());
        assert!(ContainerId::new("with space").is_err());
        assert!(ContainerId::new("a/b").is_err());
        assert!(ContainerId::new("tab\there").is_err());
    }

    #[test]
    fn prefix_truncates() {
        let id = ContainerId::new("sadfja813227wdhfjkh2319784dgh").unwrap();
        assert_eq!(id.prefix(15), "sadfja813227wdh");
        assert_eq!(id.prefix(100), "sadfja813227wdhfjkh2319784dgh");
    }

    #[test]
    fn prefix_respects_char_boundaries() {
        let id = ContainerId::new("ééééé").unwrap();
        assert_eq!(id.prefix(2), "éé");
    }

    proptest! {
        #[test]
        fn prefix_is_deterministic_and_bounded(raw in "[a-z0-9]{1,80}", max in 1usize..20) {
            let id = ContainerId::new(raw.clone()).unwrap();
            prop_assert_eq!(id.prefix(max), id.prefix(max));
            prop_assert!(id.prefix(max).chars().count() <= max);
            prop_assert!(raw.starts_with(id.prefix(max)));
        }
    }
}
