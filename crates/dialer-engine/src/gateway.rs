use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway is not configured: {0}")]
    NotConfigured(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected call ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Where the provider reports progress for a placed call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackTargets {
    pub status_url: Option<Url>,
    pub answer_url: Option<Url>,
}

impl CallbackTargets {
    /// Derives `calls/status` and `calls/answer` under a base URL.
    pub fn from_base(base: &Url) -> Result<Self, url::ParseError> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            status_url: Some(base.join("calls/status")?),
            answer_url: Some(base.join("calls/answer")?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceCallRequest {
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_callback: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_callback: Option<Url>,
    pub ring_timeout_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlacedCall {
    #[serde(alias = "call_id", alias = "sid")]
    pub provider_call_id: String,
}

/// Outbound call placement. Progress arrives later through the status callback.
#[async_trait]
pub trait TelephonyGateway: Send + Sync {
    fn name(&self) -> &'static str;
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, GatewayError>;
}

/// JSON-over-HTTP provider adapter.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
}

impl HttpGateway {
    pub fn new(endpoint: Url, auth_token: Option<String>) -> Result<Self, GatewayError> {
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(GatewayError::NotConfigured(format!(
                "unsupported endpoint scheme {}",
                endpoint.scheme()
            )));
        }
        let client = Client::builder()
            .user_agent(concat!("dialer/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            auth_token: auth_token.filter(|token| !token.trim().is_empty()),
        })
    }
}

#[async_trait]
impl TelephonyGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, GatewayError> {
        let mut builder = self.client.post(self.endpoint.clone()).json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let placed: PlacedCall = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        if placed.provider_call_id.trim().is_empty() {
            return Err(GatewayError::InvalidResponse(
                "empty provider call id".to_string(),
            ));
        }
        Ok(placed)
    }
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(alias = "error")]
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{GatewayError, PlaceCallRequest, PlacedCall, TelephonyGateway};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// A placement the fake accepted or refused.
    #[derive(Debug, Clone)]
    pub struct PlacedCallLog {
        pub request: PlaceCallRequest,
        pub provider_call_id: Option<String>,
    }

    #[derive(Default)]
    struct FakeGatewayState {
        calls: Vec<PlacedCallLog>,
        failures: VecDeque<String>,
        next_id: u64,
    }

    /// Gateway that hands out sequential ids and fails on request.
    #[derive(Clone, Default)]
    pub struct FakeGateway {
        inner: Arc<Mutex<FakeGatewayState>>,
    }

    impl FakeGateway {
        pub fn new() -> Self {
            Self::default()
        }

        /// Refuse the next placement with `message`.
        pub fn fail_next(&self, message: &str) {
            self.inner.lock().failures.push_back(message.to_string());
        }

        pub fn calls(&self) -> Vec<PlacedCallLog> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl TelephonyGateway for FakeGateway {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn place_call(
            &self,
            request: &PlaceCallRequest,
        ) -> Result<PlacedCall, GatewayError> {
            let mut state = self.inner.lock();
            if let Some(message) = state.failures.pop_front() {
                state.calls.push(PlacedCallLog {
                    request: request.clone(),
                    provider_call_id: None,
                });
                return Err(GatewayError::Unavailable(message));
            }
            state.next_id += 1;
            let provider_call_id = format!("fake-call-{}", state.next_id);
            state.calls.push(PlacedCallLog {
                request: request.clone(),
                provider_call_id: Some(provider_call_id.clone()),
            });
            Ok(PlacedCall { provider_call_id })
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeGateway, PlacedCallLog};
