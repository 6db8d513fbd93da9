//! Transmission RPC driver.
//!
//! Every call first harvests the session id the daemon hands out on its
//! CSRF error page, then posts a `{method, arguments}` envelope carrying it.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::http::{self, Credentials};
use super::{DriverError, PeerDriver, Snapshot, TorrentRecord};
use crate::config::NetworkConfig;
use crate::peer::Peer;

const RPC_PATH: &str = "/transmission/rpc";

/// Header carrying the CSRF session id.
pub const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// Fields requested from `torrent-get`.
pub const LIST_FIELDS: [&str; 5] = ["hashString", "id", "name", "totalSize", "haveValid"];

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TorrentGetArguments {
    #[serde(default)]
    torrents: Vec<TorrentRecord>,
}

/// Driver for Transmission's `/transmission/rpc` endpoint.
pub struct TransmissionDriver {
    endpoint: String,
    rpc_url: String,
    credentials: Option<Credentials>,
    client: reqwest::Client,
}

impl TransmissionDriver {
    /// Creates a driver for `peer`. No connection is made until the first call.
    ///
    /// # Errors
    ///
    /// - `DriverError::Transport` - If the HTTP client cannot be built
    pub fn new(peer: &Peer, config: &NetworkConfig) -> Result<Self, DriverError> {
        let endpoint = peer.key().to_string();
        Ok(Self {
            rpc_url: format!("http://{endpoint}{RPC_PATH}"),
            client: http::build_client(config, &endpoint)?,
            credentials: Credentials::from_parts(peer.username.as_ref(), peer.password.as_ref()),
            endpoint,
        })
    }

    async fn harvest_session_id(&self) -> Result<Option<String>, DriverError> {
        let request = http::authorize(self.client.get(&self.rpc_url), self.credentials.as_ref());
        let response = http::send(request, &self.endpoint, Some(SESSION_HEADER)).await?;

        let session_id = extract_session_id(&response.text()).or(response.session_header);
        if session_id.is_none() {
            tracing::debug!("{} handed out no session id", self.endpoint);
        }
        Ok(session_id)
    }

    async fn call(
        &self,
        method: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, DriverError> {
        let session_id = self.harvest_session_id().await?;

        let mut request =
            http::authorize(self.client.post(&self.rpc_url), self.credentials.as_ref())
                .json(&RpcRequest { method, arguments });
        if let Some(session_id) = &session_id {
            request = request.header(SESSION_HEADER, session_id);
        }

        tracing::debug!("{} <- {}", self.endpoint, method);
        let envelope: RpcResponse = http::send(request, &self.endpoint, Some(SESSION_HEADER))
            .await?
            .require_success(&self.endpoint)?
            .json(&self.endpoint)?;

        if envelope.result != "success" {
            return Err(DriverError::Protocol {
                message: format!("{method} on {} answered '{}'", self.endpoint, envelope.result),
                response: None,
            });
        }
        Ok(envelope.arguments)
    }
}

/// Pulls the session id out of the 409 page's `<code>` element.
///
/// The element reads `X-Transmission-Session-Id: <id>`; the id is its last
/// whitespace-separated token.
fn extract_session_id(body: &str) -> Option<String> {
    let re = regex::Regex::new(r"(?s)<code>(.*?)</code>").ok()?;
    re.captures_iter(body)
        .filter_map(|captures| captures.get(1))
        .filter_map(|code| code.as_str().split_whitespace().last())
        .last()
        .map(str::to_string)
}

#[async_trait]
impl PeerDriver for TransmissionDriver {
    async fn list(&self) -> Result<Snapshot, DriverError> {
        let arguments = self
            .call("torrent-get", json!({ "fields": LIST_FIELDS }))
            .await?;

        let parsed: TorrentGetArguments =
            serde_json::from_value(arguments).map_err(|e| DriverError::Transport {
                endpoint: self.endpoint.clone(),
                reason: format!("Malformed torrent-get arguments: {e}"),
            })?;

        Ok(parsed
            .torrents
            .into_iter()
            .map(|mut record| {
                record.hash_string.make_ascii_lowercase();
                record
            })
            .collect())
    }

    async fn add(&self, torrent: &[u8]) -> Result<(), DriverError> {
        let arguments = self
            .call("torrent-add", json!({ "metainfo": STANDARD.encode(torrent) }))
            .await?;
        if arguments.get("torrent-duplicate").is_some() {
            tracing::info!("{} already had the torrent", self.endpoint);
        }
        Ok(())
    }

    async fn remove(&self, info_hash: &str, delete_data: bool) -> Result<(), DriverError> {
        self.call(
            "torrent-remove",
            json!({ "ids": [info_hash], "delete-local-data": delete_data }),
        )
        .await?;
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
