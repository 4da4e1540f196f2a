// Library exports for integration testing
//
// This file exposes internal modules for integration tests while keeping
// the binary entrypoint in main.rs

pub mod approvals;
pub mod config;
pub mod credentials;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod watcher;

// Re-export commonly used types for testing
pub use models::{Approval, ApprovalStatus, Event, Reference, Repository, TrackedImage, TriggerType};
pub use policy::{Options, Policy};
