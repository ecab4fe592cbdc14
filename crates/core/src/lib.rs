//! Core domain types shared by every Loft crate.
//!
//! This crate defines the canonical data model:
//! - File identifiers, file types and the per-member special containers
//! - Access capabilities and capability sets
//! - Upload states and token cache namespaces
//! - Application configuration

pub mod capability;
pub mod config;
pub mod error;
pub mod file;
pub mod upload;

pub use capability::{Capability, CapabilitySet};
pub use error::{Error, Result};
pub use file::{FileId, FileKey, FileType, MemberId, SpecialContainer, validate_file_name};
pub use upload::{TokenPurpose, UploadState};

/// Maximum length of a file name in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Default ceiling for breadth-first name searches below a container.
pub const DEFAULT_MAX_SEARCH_DEPTH: u32 = 20;

/// Default lifetime of an issued upload token: 60 seconds.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60;
