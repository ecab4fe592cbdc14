//! Repository traits for metadata operations.

pub mod capabilities;
pub mod hierarchy;
pub mod members;
pub mod temp_files;

pub use capabilities::CapabilityRepo;
pub use hierarchy::HierarchyRepo;
pub use members::MemberRepo;
pub use temp_files::TempFileRepo;
