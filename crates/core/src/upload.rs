//! Upload states and token cache namespaces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a pending upload.
///
/// `Requested`, `TokenIssued` and `Merging` are persisted on the temp file
/// row. `Completed` and `Failed` are terminal: the temp file row is gone by
/// the time an upload reaches either of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Temp file registered, no token yet.
    Requested,
    /// Write token stored in the token cache.
    TokenIssued,
    /// Merge request sent to the storage backend.
    Merging,
    /// Promoted to a permanent block.
    Completed,
    /// Merge failed; temp file discarded.
    Failed,
}

impl UploadState {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "requested" => Ok(Self::Requested),
            "token_issued" => Ok(Self::TokenIssued),
            "merging" => Ok(Self::Merging),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(crate::Error::InvalidUploadState(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::TokenIssued => "token_issued",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::TokenIssued)
                | (Self::Requested, Self::Failed)
                | (Self::TokenIssued, Self::Merging)
                | (Self::TokenIssued, Self::Failed)
                | (Self::Merging, Self::Completed)
                | (Self::Merging, Self::Failed)
        )
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Purpose namespace of a token stored in the token cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Read,
    Write,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    /// Cache key for a token, e.g. `write:<token>`.
    pub fn cache_key(&self, token: &str) -> String {
        format!("{}:{}", self.as_str(), token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        assert!(UploadState::Requested.can_transition_to(UploadState::TokenIssued));
        assert!(UploadState::TokenIssued.can_transition_to(UploadState::Merging));
        assert!(UploadState::Merging.can_transition_to(UploadState::Completed));
        assert!(UploadState::Merging.can_transition_to(UploadState::Failed));
    }

    #[test]
    fn terminal_states_do_not_move() {
        for next in [
            UploadState::Requested,
            UploadState::TokenIssued,
            UploadState::Merging,
            UploadState::Completed,
        ] {
            assert!(!UploadState::Completed.can_transition_to(next));
            assert!(!UploadState::Failed.can_transition_to(next));
        }
        assert!(!UploadState::Requested.can_transition_to(UploadState::Merging));
    }

    #[test]
    fn state_parse_roundtrip() {
        assert_eq!(
            UploadState::parse("token_issued").unwrap(),
            UploadState::TokenIssued
        );
        assert!(UploadState::parse("open").is_err());
    }

    #[test]
    fn token_cache_keys_are_namespaced() {
        assert_eq!(TokenPurpose::Write.cache_key("abc"), "write:abc");
        assert_eq!(TokenPurpose::Read.cache_key("abc"), "read:abc");
    }
}
