//! Core building blocks for smithrun: the [`Runnable`] operation trait, the
//! batch dispatcher and the callback hooks that feed run tracing.
mod batch;
pub mod callbacks;
mod error;
mod runnable;

pub use batch::{dispatch, dispatch_in_contexts, dispatch_traced, BatchOptions};
pub use callbacks::{
    ensure_object, CallbackHandler, CallbackManager, RunConfig, RunContext, RunType,
    ToTraceInput, ToTraceOutput, TracedRunnable,
};
pub use error::SmithrunError;
pub use runnable::{from_fn, Outcome, Runnable, RunnableFn};
pub use serde_json::Value;
