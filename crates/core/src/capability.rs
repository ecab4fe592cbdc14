//! Per-file access capabilities.
//!
//! Capabilities are granted per `(member, file)` pair and are not inherited:
//! a grant on a container says nothing about its children.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single access capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Create,
    Update,
    Delete,
}

impl Capability {
    pub const ALL: [Capability; 4] = [Self::Read, Self::Create, Self::Update, Self::Delete];

    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "read" => Ok(Self::Read),
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(crate::Error::InvalidCapability(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A set of capabilities held by one member on one file.
///
/// Serialized as a sorted JSON array of capability names, which is also the
/// representation persisted by the metadata store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every capability; granted to the creator of a file.
    pub fn full() -> Self {
        Self(Capability::ALL.into_iter().collect())
    }

    /// Read-only access, used when sharing.
    pub fn read_only() -> Self {
        Self::from_iter([Capability::Read])
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn remove(&mut self, capability: Capability) -> bool {
        self.0.remove(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Parse a list of capability names.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> crate::Result<Self> {
        names
            .iter()
            .map(|n| Capability::parse(n.as_ref()))
            .collect::<crate::Result<BTreeSet<_>>>()
            .map(Self)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.as_str()).collect();
        write!(f, "[{}]", names.join(","))
    }
}
