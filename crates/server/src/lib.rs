//! Service layer for Loft.
//!
//! This crate provides:
//! - File lifecycle operations over a member's forest
//! - Upload orchestration: write tokens, merge, promotion
//! - Signup bootstrapping with compensation
//! - Reclamation of abandoned uploads
//! - Prometheus counters

pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod signup;
pub mod state;
pub mod sweeper;
pub mod upload;

pub use error::{ServiceError, ServiceResult};
pub use lifecycle::FileService;
pub use signup::{SignupOutcome, signup};
pub use state::AppState;
pub use sweeper::{SweepStats, spawn_sweeper, sweep_temp_files};
pub use upload::{UploadService, WriteGrant};
