//! Dispatcher (component C6): outbound calls to a selected MCP, with
//! per-call deadlines and per-MCP concurrency limiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

/// Default per-call deadline when the caller doesn't specify a shorter one
/// (spec §4.6: `min(request.deadline, default_30s)`).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// How long an over-limit caller waits for a concurrency slot before
/// failing `overloaded` (spec §5).
pub const OVERLOAD_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone)]
pub enum DispatchError {
    #[error("dispatch timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    /// Distinct sub-kind of transport: the MCP's own concurrency limit was
    /// exceeded and a slot did not free up within [`OVERLOAD_WAIT`].
    #[error("mcp overloaded (max_concurrent exceeded)")]
    Overloaded,
    #[error("remote error: {0}")]
    RemoteError { message: String, deterministic: bool },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("dispatch canceled")]
    Canceled,
}

impl From<DispatchError> for coordinator_core::CoordError {
    fn from(e: DispatchError) -> Self {
        use coordinator_core::CoordError;
        match e {
            DispatchError::Timeout => CoordError::DeadlineExceeded("dispatch timed out".into()),
            DispatchError::Transport(m) => CoordError::Transport(m),
            DispatchError::Overloaded => CoordError::Transport("overloaded".into()),
            DispatchError::RemoteError { message, .. } => CoordError::RemoteError(message),
            DispatchError::MalformedResponse(m) => CoordError::RemoteError(m),
            DispatchError::Canceled => CoordError::Transport("canceled".into()),
        }
    }
}

/// A single dispatch attempt's outcome, carrying enough to update breaker
/// and perf-window state regardless of success/failure.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub result: Result<Value, DispatchError>,
    pub latency_ms: f64,
}

/// Calls out to MCP endpoints over HTTP, enforcing per-call deadlines and
/// per-MCP outbound concurrency caps.
pub struct Dispatcher {
    client: reqwest::Client,
    semaphores: DashMap<String, Arc<Semaphore>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            semaphores: DashMap::new(),
        }
    }

    fn semaphore_for(&self, mcp_id: &str, max_concurrent: u32) -> Arc<Semaphore> {
        self.semaphores
            .entry(mcp_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(max_concurrent.max(1) as usize)))
            .clone()
    }

    /// Dispatch `payload` to `endpoint`, bounded by `deadline` and the
    /// MCP's own `max_concurrent` (spec §4.6, §5).
    pub async fn dispatch(
        &self,
        mcp_id: &str,
        endpoint: &str,
        max_concurrent: u32,
        payload: &HashMap<String, Value>,
        deadline: Duration,
    ) -> DispatchOutcome {
        let started = std::time::Instant::now();
        let deadline = deadline.min(DEFAULT_DEADLINE);
        let semaphore = self.semaphore_for(mcp_id, max_concurrent);

        let permit = match tokio::time::timeout(OVERLOAD_WAIT, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return DispatchOutcome {
                    result: Err(DispatchError::Transport("semaphore closed".into())),
                    latency_ms: elapsed_ms(started),
                }
            }
            Err(_) => {
                warn!(mcp_id, "dispatch overloaded: no concurrency slot within wait window");
                return DispatchOutcome {
                    result: Err(DispatchError::Overloaded),
                    latency_ms: elapsed_ms(started),
                };
            }
        };

        let call = self
            .client
            .post(endpoint)
            .json(payload)
            .timeout(deadline)
            .send();

        let result = match tokio::time::timeout(deadline, call).await {
            Err(_) => Err(DispatchError::Timeout),
            Ok(Err(e)) => {
                if e.is_timeout() {
                    Err(DispatchError::Timeout)
                } else {
                    Err(DispatchError::Transport(e.to_string()))
                }
            }
            Ok(Ok(response)) => {
                if !response.status().is_success() {
                    let deterministic = response.status().is_client_error();
                    let message = format!("mcp returned status {}", response.status());
                    Err(DispatchError::RemoteError { message, deterministic })
                } else {
                    match response.json::<Value>().await {
                        Ok(body) => Ok(body),
                        Err(e) => Err(DispatchError::MalformedResponse(e.to_string())),
                    }
                }
            }
        };

        drop(permit);
        DispatchOutcome {
            result,
            latency_ms: elapsed_ms(started),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_ms(started: std::time::Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_dispatch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::new();
        let outcome = dispatcher
            .dispatch(
                "mcp_1",
                &format!("{}/run", server.uri()),
                10,
                &HashMap::new(),
                Duration::from_secs(5),
            )
            .await;

        assert!(outcome.result.is_ok());
    }

    #[tokio::test]
    async fn server_error_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::new();
        let outcome = dispatcher
            .dispatch(
                "mcp_1",
                &format!("{}/run", server.uri()),
                10,
                &HashMap::new(),
                Duration::from_secs(5),
            )
            .await;

        assert!(matches!(outcome.result, Err(DispatchError::RemoteError { .. })));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::new();
        let outcome = dispatcher
            .dispatch(
                "mcp_1",
                &format!("{}/run", server.uri()),
                10,
                &HashMap::new(),
                Duration::from_millis(20),
            )
            .await;

        assert!(matches!(outcome.result, Err(DispatchError::Timeout)));
    }

    #[tokio::test]
    async fn exceeding_max_concurrent_yields_overloaded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let dispatcher = Arc::new(Dispatcher::new());
        let endpoint = format!("{}/run", server.uri());

        let d1 = dispatcher.clone();
        let e1 = endpoint.clone();
        let first = tokio::spawn(async move {
            d1.dispatch("mcp_1", &e1, 1, &HashMap::new(), Duration::from_secs(5)).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let outcome = dispatcher
            .dispatch("mcp_1", &endpoint, 1, &HashMap::new(), Duration::from_secs(5))
            .await;

        assert!(matches!(outcome.result, Err(DispatchError::Overloaded)));
        first.await.unwrap();
    }
}
