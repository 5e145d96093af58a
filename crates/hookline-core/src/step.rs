//! Execution controls for collaborator calls: cancellation and timeout.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ApiSettings;
use crate::error::{ApiError, ApiResult};

/// Run one collaborator call under the request's cancellation token and the
/// configured step timeout.
///
/// The token is checked before the call starts; a call racing a cancellation
/// always resolves to [`ApiError::Cancelled`].
pub(crate) async fn run_step<T, Fut>(
    step: &'static str,
    settings: &ApiSettings,
    cancel: &CancellationToken,
    call: Fut,
) -> ApiResult<T>
where
    Fut: Future<Output = ApiResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(ApiError::Cancelled);
    }

    let bounded = async {
        match settings.step_timeout_ms {
            Some(limit_ms) => {
                match tokio::time::timeout(Duration::from_millis(limit_ms), call).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        warn!(step = step, limit_ms = limit_ms, "collaborator step timed out");
                        Err(ApiError::StepTimeout { step, limit_ms })
                    }
                }
            }
            None => call.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = bounded => result,
    }
}

/// Fail fast if the request has been cancelled between steps.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> ApiResult<()> {
    if cancel.is_cancelled() {
        Err(ApiError::Cancelled)
    } else {
        Ok(())
    }
}
