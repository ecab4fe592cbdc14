//! File identifiers, file types and special containers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Internal identifier of a file node. Never exposed to owners.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(i64);

impl FileId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an authenticated member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(i64);

impl MemberId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({})", self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Externally addressable key of a file.
///
/// A temp file's key is carried over to the permanent file it is promoted
/// into, so the storage backend addresses the same object before and after.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileKey(Uuid);

impl FileKey {
    /// Generate a new random file key.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidFileKey(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for FileKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for FileKey {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileKey({})", self.0)
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a file node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Directory-like node that can parent other files.
    Container,
    /// Uploaded byte content.
    Block,
    /// Reference to another file.
    Link,
}

impl FileType {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "container" => Ok(Self::Container),
            "block" => Ok(Self::Block),
            "link" => Ok(Self::Link),
            _ => Err(crate::Error::InvalidFileType(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Block => "block",
            Self::Link => "link",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::Container)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Containers every member owns exactly one of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialContainer {
    Root,
    Home,
    Trash,
}

impl SpecialContainer {
    /// File name the container is stored under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Home => "home",
            Self::Trash => "trash",
        }
    }

    /// Whether the container sits directly under root (`path = [root.id]`).
    pub fn is_under_root(&self) -> bool {
        !matches!(self, Self::Root)
    }
}

impl fmt::Display for SpecialContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Validate a file name.
///
/// Names must be non-empty, at most [`crate::MAX_FILE_NAME_LEN`] bytes, must
/// not be `.` or `..`, and must not contain `/`, `\` or control characters.
pub fn validate_file_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidFileName("name is empty".to_string()));
    }
    if name.len() > crate::MAX_FILE_NAME_LEN {
        return Err(crate::Error::InvalidFileName(format!(
            "name is {} bytes (max {})",
            name.len(),
            crate::MAX_FILE_NAME_LEN
        )));
    }
    if name == "." || name == ".." {
        return Err(crate::Error::InvalidFileName(format!("reserved name: {name}")));
    }
    if let Some(c) = name
        .chars()
        .find(|c| *c == '/' || *c == '\\' || c.is_control())
    {
        return Err(crate::Error::InvalidFileName(format!(
            "name contains forbidden character {c:?}"
        )));
    }
    Ok(())
}
