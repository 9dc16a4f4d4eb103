pub mod message;
pub mod thread;

pub use message::{TabMessage, ThreadContentResponse};
pub use thread::{ExportResult, Post, ThreadImage};
