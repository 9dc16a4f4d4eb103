// Thread layout: flows posts onto fixed-size pages through a drawing backend.
// Layout is CPU-bound and synchronous; async callers run it inside
// tokio::task::spawn_blocking.

pub mod backend;
pub mod engine;
pub mod filename;
pub mod font_metrics;
pub mod pdf;
pub mod recording;
pub mod wrap;

pub use backend::BackendFactory;
pub use engine::{layout, render_thread, LayoutError};
pub use font_metrics::{default_page_config, PageConfig};
pub use pdf::PdfBackendFactory;
pub use recording::{DrawOp, RecordingBackend};
