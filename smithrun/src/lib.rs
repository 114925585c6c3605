//! Batch dispatch for async operations, with optional LangSmith tracing.
//!
//! Everything in `smithrun-core` is re-exported at the crate root. The
//! `langsmith` feature (on by default) adds [`langsmith`].
pub use smithrun_core::*;

#[cfg(feature = "langsmith")]
pub use smithrun_langsmith as langsmith;

pub mod prelude {
    pub use smithrun_core::{
        dispatch, dispatch_traced, from_fn, BatchOptions, CallbackManager, Outcome, RunConfig,
        Runnable, SmithrunError,
    };

    #[cfg(feature = "langsmith")]
    pub use smithrun_langsmith::{LangSmithConfig, LangSmithTracer};
}
