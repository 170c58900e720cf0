//! Runtime adapters bridging scheduler jobs into async code.

#[cfg(feature = "tokio-runtime")]
pub mod completion;

#[cfg(feature = "tokio-runtime")]
pub use completion::{run_job, run_message};
