//! Fan-out/fan-in over independent inputs.
//!
//! Every input gets its own invocation. A failing or panicking invocation
//! becomes an [`Outcome::Failure`] in its own slot and never disturbs its
//! siblings. Results always come back in input order.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::{join_all, FutureExt};
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::callbacks::{
    ensure_object, CallbackManager, RunConfig, RunContext, ToTraceInput, ToTraceOutput,
};
use crate::{Outcome, Runnable, SmithrunError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// `None` launches every invocation immediately.
    pub max_concurrency: Option<usize>,
}

impl BatchOptions {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: Some(max_concurrency),
        }
    }

    fn limit(&self) -> Option<usize> {
        self.max_concurrency.map(|limit| limit.max(1))
    }
}

/// Invokes `runnable` once per input and waits for all of them.
pub async fn dispatch<Input, Output, R>(
    runnable: &R,
    inputs: Vec<Input>,
    options: &BatchOptions,
) -> Vec<Outcome<Output>>
where
    Input: Send + 'static,
    Output: Send + 'static,
    R: Runnable<Input, Output> + ?Sized,
{
    let invocations = inputs
        .into_iter()
        .map(|input| isolate(runnable.invoke(input)));
    run_all(invocations, options).await
}

/// Like [`dispatch`], but each item runs as its own root run reported to the
/// callbacks in `config`.
pub async fn dispatch_traced<Input, Output, R>(
    runnable: &R,
    inputs: Vec<Input>,
    options: &BatchOptions,
    config: &RunConfig,
) -> Vec<Outcome<Output>>
where
    Input: ToTraceInput + Send + 'static,
    Output: ToTraceOutput + Send + 'static,
    R: Runnable<Input, Output> + ?Sized,
{
    let items = inputs
        .into_iter()
        .map(|input| (config.root_context(), input))
        .collect();
    dispatch_in_contexts(runnable, items, options, &config.callbacks()).await
}

/// Dispatches inputs under caller-built run contexts, so callers can know run
/// ids up front and attach per-item metadata.
pub async fn dispatch_in_contexts<Input, Output, R>(
    runnable: &R,
    items: Vec<(RunContext, Input)>,
    options: &BatchOptions,
    manager: &CallbackManager,
) -> Vec<Outcome<Output>>
where
    Input: ToTraceInput + Send + 'static,
    Output: ToTraceOutput + Send + 'static,
    R: Runnable<Input, Output> + ?Sized,
{
    if manager.is_noop() {
        let inputs = items.into_iter().map(|(_, input)| input).collect();
        return dispatch(runnable, inputs, options).await;
    }

    let invocations = items.into_iter().map(|(mut ctx, input)| async move {
        ctx.restart_clock();
        let inputs = ensure_object(input.to_trace_input());
        manager.on_start(&ctx, &inputs).await;
        let outcome = isolate(runnable.invoke(input)).await;
        manager.on_finish(&ctx, outcome.as_result()).await;
        outcome
    });
    run_all(invocations, options).await
}

async fn run_all<I, F, Output>(invocations: I, options: &BatchOptions) -> Vec<Outcome<Output>>
where
    I: Iterator<Item = F>,
    F: Future<Output = Outcome<Output>>,
{
    let outcomes: Vec<Outcome<Output>> = match options.limit() {
        None => join_all(invocations).await,
        Some(limit) => stream::iter(invocations).buffered(limit).collect().await,
    };
    let failed = outcomes.iter().filter(|outcome| outcome.is_failure()).count();
    debug!(
        items = outcomes.len(),
        failed,
        max_concurrency = ?options.max_concurrency,
        "batch dispatched"
    );
    outcomes
}

async fn isolate<Output, F>(invocation: F) -> Outcome<Output>
where
    F: Future<Output = Result<Output, SmithrunError>>,
{
    match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(result) => result.into(),
        Err(payload) => Outcome::Failure(SmithrunError::Panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
