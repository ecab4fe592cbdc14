//! Storage backend implementations.

pub mod filesystem;
pub mod http;
