//! Units of work executed by the task runner.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::domain::BodyError;

/// Business logic run under the task lock.
///
/// The name doubles as the `agent` of any [`crate::domain::TaskError`] the
/// runner reports. Returning `Err` is an expected business failure; a panic
/// is caught by the runner and reported as an unexpected exception.
///
/// ```ignore
/// struct Summarize;
///
/// #[async_trait]
/// impl UnitOfWork for Summarize {
///     type Payload = Article;
///     type Output = Summary;
///
///     fn name(&self) -> &str { "summarize" }
///
///     async fn execute(&self, article: &Article) -> Result<Summary, BodyError> {
///         ...
///     }
/// }
/// ```
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Payload: Send + Sync;
    type Output: Send;

    fn name(&self) -> &str;

    async fn execute(&self, payload: &Self::Payload) -> Result<Self::Output, BodyError>;
}

/// A closure wrapped as a [`UnitOfWork`]. The closure gets its own copy of
/// the payload.
pub struct FnUnit<P, O, F> {
    name: String,
    f: F,
    _marker: PhantomData<fn(P) -> O>,
}

pub fn unit_fn<P, O, F, Fut>(name: impl Into<String>, f: F) -> FnUnit<P, O, F>
where
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, BodyError>> + Send,
{
    FnUnit {
        name: name.into(),
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<P, O, F, Fut> UnitOfWork for FnUnit<P, O, F>
where
    P: Clone + Send + Sync,
    O: Send,
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, BodyError>> + Send,
{
    type Payload = P;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, payload: &P) -> Result<O, BodyError> {
        (self.f)(payload.clone()).await
    }
}
