//! Shared HTTP plumbing for the JSON-speaking daemons

use super::DriverError;
use crate::config::NetworkConfig;

/// HTTP response reduced to what the drivers inspect
#[derive(Debug, Clone)]
pub(super) struct HttpResponse {
    pub status_code: u16,
    pub session_header: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true if the HTTP status code indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Fails with a transport error unless the status is 2xx.
    pub fn require_success(self, endpoint: &str) -> Result<Self, DriverError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DriverError::Transport {
                endpoint: endpoint.to_string(),
                reason: format!("HTTP status {}", self.status_code),
            })
        }
    }

    /// Parses the body as JSON; malformed bodies count as transport failures.
    pub fn json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T, DriverError> {
        serde_json::from_slice(&self.body).map_err(|e| DriverError::Transport {
            endpoint: endpoint.to_string(),
            reason: format!("Malformed JSON response: {e}"),
        })
    }
}

/// Username and password sent as HTTP basic auth.
#[derive(Debug, Clone)]
pub(super) struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn from_parts(username: Option<&String>, password: Option<&String>) -> Option<Self> {
        username.map(|username| Self {
            username: username.clone(),
            password: password.cloned(),
        })
    }
}

/// Builds a client honoring the network timeouts.
///
/// The cookie store carries session cookies between the token request and
/// the call that presents the token.
pub(super) fn build_client(
    config: &NetworkConfig,
    endpoint: &str,
) -> Result<reqwest::Client, DriverError> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .user_agent(config.user_agent)
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::limited(3))
        .build()
        .map_err(|e| DriverError::Transport {
            endpoint: endpoint.to_string(),
            reason: format!("HTTP client creation failed: {e}"),
        })
}

/// Attaches basic auth when credentials are configured.
pub(super) fn authorize(
    request: reqwest::RequestBuilder,
    credentials: Option<&Credentials>,
) -> reqwest::RequestBuilder {
    match credentials {
        Some(credentials) => {
            request.basic_auth(&credentials.username, credentials.password.as_ref())
        }
        None => request,
    }
}

/// Sends a request and buffers the response, capturing `session_header`
/// when the daemon sets it.
pub(super) async fn send(
    request: reqwest::RequestBuilder,
    endpoint: &str,
    session_header: Option<&str>,
) -> Result<HttpResponse, DriverError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(endpoint, &e))?;

    let status_code = response.status().as_u16();
    let session_header = session_header
        .and_then(|name| response.headers().get(name))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = response
        .bytes()
        .await
        .map_err(|e| DriverError::Transport {
            endpoint: endpoint.to_string(),
            reason: format!("Failed to read response body: {e}"),
        })?
        .to_vec();

    tracing::trace!(
        "{} answered HTTP {} with {} bytes",
        endpoint,
        status_code,
        body.len()
    );

    Ok(HttpResponse {
        status_code,
        session_header,
        body,
    })
}

fn transport_error(endpoint: &str, error: &reqwest::Error) -> DriverError {
    let reason = if error.is_timeout() {
        "Request timed out".to_string()
    } else if error.is_connect() {
        format!("Failed to connect: {error}")
    } else if error.is_request() {
        format!("Invalid request: {error}")
    } else {
        format!("HTTP request failed: {error}")
    };

    DriverError::Transport {
        endpoint: endpoint.to_string(),
        reason,
    }
}
