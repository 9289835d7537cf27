//! Render scheduling: worker pool, in-flight registry, and cancellation.

pub mod cancel;
pub mod pool;
pub mod registry;
pub mod slot;

pub use cancel::CancellationToken;
pub use pool::WorkerPool;
pub use registry::{JobHandle, RenderTaskRegistry, ResultHandler, Submission, Subscriber};
pub use slot::DisplaySlot;

pub type Result<T> = crate::Result<T>;
