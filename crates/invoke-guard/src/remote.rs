//! The seam between the invoker and the transport that actually talks to a
//! remote service.

use bytes::Bytes;
use futures::future::BoxFuture;
use invoke_guard_core::RemoteError;
use serde_json::Value;
use tower::{Service, ServiceExt};

/// One request handed to a [`RemoteCall`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// Target service id.
    pub service_id: String,
    /// Operation name, e.g. `"complete"` or `"generate_image"`.
    pub operation: String,
    /// Operation parameters.
    pub parameters: Value,
    /// 1-based attempt number within the current call.
    pub attempt: usize,
}

/// Performs a remote call and classifies its failures.
///
/// Any `tower::Service<RemoteRequest, Response = Bytes, Error = RemoteError>`
/// that is `Clone` implements this trait, so `tower::service_fn` closures
/// and full tower stacks can be registered directly.
pub trait RemoteCall: Send + Sync + 'static {
    /// Sends `request` and resolves to the response body.
    fn send(&self, request: RemoteRequest) -> BoxFuture<'static, Result<Bytes, RemoteError>>;
}

impl<S> RemoteCall for S
where
    S: Service<RemoteRequest, Response = Bytes, Error = RemoteError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    fn send(&self, request: RemoteRequest) -> BoxFuture<'static, Result<Bytes, RemoteError>> {
        let svc = self.clone();
        Box::pin(async move { svc.oneshot(request).await })
    }
}
