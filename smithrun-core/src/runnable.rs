use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::{dispatch, BatchOptions, SmithrunError};

/// Terminal state of one invocation inside a batch.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Failure(SmithrunError),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SmithrunError> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(error) => Some(error),
        }
    }

    pub fn as_result(&self) -> Result<&T, &SmithrunError> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(error) => Err(error),
        }
    }

    pub fn into_result(self) -> Result<T, SmithrunError> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(error) => Err(error),
        }
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(error) => Outcome::Failure(error),
        }
    }
}

impl<T> From<Result<T, SmithrunError>> for Outcome<T> {
    fn from(result: Result<T, SmithrunError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Failure(error),
        }
    }
}

/// A unit of work that may fail. Agents, chains and plain functions all sit
/// behind this trait so the dispatcher can fan them out.
#[async_trait]
pub trait Runnable<Input: Send + 'static, Output: Send + 'static>: Send + Sync {
    async fn invoke(&self, input: Input) -> Result<Output, SmithrunError>;

    /// Invokes once per input with no concurrency bound.
    async fn batch(&self, inputs: Vec<Input>) -> Vec<Outcome<Output>> {
        dispatch(self, inputs, &BatchOptions::default()).await
    }
}

pub struct RunnableFn<F, Input> {
    f: F,
    _marker: PhantomData<fn(Input)>,
}

/// Wraps an async closure as a [`Runnable`].
///
/// ```rust
/// use smithrun_core::{from_fn, Runnable, SmithrunError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let shout = from_fn(|text: String| async move { Ok::<_, SmithrunError>(text.to_uppercase()) });
/// assert_eq!(shout.invoke("hi".to_string()).await.unwrap(), "HI");
/// # }
/// ```
pub fn from_fn<F, Fut, Input, Output>(f: F) -> RunnableFn<F, Input>
where
    F: Fn(Input) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Output, SmithrunError>> + Send,
{
    RunnableFn {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, Input, Output> Runnable<Input, Output> for RunnableFn<F, Input>
where
    Input: Send + 'static,
    Output: Send + 'static,
    F: Fn(Input) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Output, SmithrunError>> + Send,
{
    async fn invoke(&self, input: Input) -> Result<Output, SmithrunError> {
        (self.f)(input).await
    }
}
