//! Clients for the services the orchestrator calls.

pub mod catalog;
pub mod identity;

use std::future::Future;
use std::time::Instant;

use thiserror::Error;

/// Failure of an outbound service call.
///
/// A timeout is just a failure. `NotFound` is the one definite answer
/// callers may act on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service could not be reached or failed internally.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The call did not finish before its deadline.
    #[error("{service} call timed out")]
    Timeout { service: &'static str },

    /// The service answered that the target does not exist.
    #[error("{service} has no such item")]
    NotFound { service: &'static str },

    /// The service answered but refused the request.
    #[error("{service} rejected the call: {reason}")]
    Rejected {
        service: &'static str,
        reason: String,
    },
}

/// Runs `call` and fails with [`ServiceError::Timeout`] if it is still
/// pending at `deadline`. A deadline that already passed fails without
/// starting the call.
pub async fn call_with_deadline<T, F>(
    service: &'static str,
    deadline: Instant,
    call: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    if Instant::now() >= deadline {
        return Err(timed_out(service));
    }
    match tokio::time::timeout_at(deadline.into(), call).await {
        Ok(result) => result,
        Err(_) => Err(timed_out(service)),
    }
}

fn timed_out(service: &'static str) -> ServiceError {
    metrics::counter!("rpc_timeouts_total", "service" => service).increment(1);
    ServiceError::Timeout { service }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_call_finishing_in_time() {
        let deadline = Instant::now() + Duration::from_secs(1);
        let result = call_with_deadline("svc", deadline, async { Ok::<_, ServiceError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_call_past_deadline_times_out() {
        let deadline = Instant::now() + Duration::from_millis(10);
        let result = call_with_deadline("svc", deadline, async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ServiceError>(7)
        })
        .await;
        assert_eq!(result, Err(ServiceError::Timeout { service: "svc" }));
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_fast() {
        let deadline = Instant::now();
        let result = call_with_deadline("svc", deadline, async { Ok::<_, ServiceError>(()) }).await;
        assert!(matches!(result, Err(ServiceError::Timeout { .. })));
    }
}
