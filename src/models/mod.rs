pub mod approval;
pub mod event;
pub mod image;
pub mod tracked;

pub use approval::{Approval, ApprovalQuery, ApprovalStatus};
pub use event::{Event, Repository, TriggerType};
pub use image::Reference;
pub use tracked::TrackedImage;
