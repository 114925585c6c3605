use async_trait::async_trait;

use crate::callbacks::{
    ensure_object, CallbackManager, RunContext, RunType, ToTraceInput, ToTraceOutput,
};
use crate::{Runnable, SmithrunError};

/// Reports every invocation of `inner` as a child run of `parent`.
pub struct TracedRunnable<R> {
    inner: R,
    manager: CallbackManager,
    parent: RunContext,
    run_type: RunType,
    name: String,
}

impl<R> TracedRunnable<R> {
    pub fn new(
        inner: R,
        manager: CallbackManager,
        parent: RunContext,
        run_type: RunType,
        name: String,
    ) -> Self {
        Self {
            inner,
            manager,
            parent,
            run_type,
            name,
        }
    }
}

#[async_trait]
impl<Input, Output, R> Runnable<Input, Output> for TracedRunnable<R>
where
    Input: Send + Sync + ToTraceInput + 'static,
    Output: Send + Sync + ToTraceOutput + 'static,
    R: Runnable<Input, Output>,
{
    async fn invoke(&self, input: Input) -> Result<Output, SmithrunError> {
        if self.manager.is_noop() {
            return self.inner.invoke(input).await;
        }

        let ctx = self.parent.child(self.run_type.clone(), self.name.clone());
        let inputs = ensure_object(input.to_trace_input());
        self.manager.on_start(&ctx, &inputs).await;

        let result = self.inner.invoke(input).await;
        self.manager.on_finish(&ctx, result.as_ref()).await;
        result
    }
}
