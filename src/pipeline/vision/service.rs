use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Future;
use tower::timeout::Timeout;
use tower::Service;

use crate::error::VisionError;
use crate::pipeline::vision::backend::{VisionBackend, VisionRequest};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Remote analysis as a service. Wrapping the backend in a [`Service`] lets
/// the timeout layer sit in front of it without the orchestrator knowing
/// which backend is live.
#[derive(Clone)]
pub struct VisionService {
    inner: Arc<dyn VisionBackend>,
}

impl VisionService {
    pub fn new(inner: Arc<dyn VisionBackend>) -> Self {
        Self { inner }
    }

    pub fn with_timeout(self, timeout: Duration) -> Timeout<VisionService> {
        Timeout::new(self, timeout)
    }

    pub fn describe(&self) -> String {
        self.inner.describe()
    }
}

impl Service<VisionRequest> for VisionService {
    type Response = serde_json::Value;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: VisionRequest) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move {
            let payload = inner.analyze(req).await?;
            Ok(payload)
        })
    }
}

/// Flattens the timeout layer's boxed error back into [`VisionError`].
pub fn flatten_error(err: BoxError, timeout: Duration) -> VisionError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return VisionError::Timeout(timeout);
    }
    match err.downcast::<VisionError>() {
        Ok(e) => *e,
        Err(other) => VisionError::Request(other.to_string()),
    }
}
