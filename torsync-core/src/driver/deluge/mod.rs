//! Deluge daemon RPC driver.
//!
//! Each call opens a TLS connection and sends one frame holding two RPC
//! tuples: `daemon.login` followed by the requested method. The daemon
//! answers with two frames, the login acknowledgement and the call result.

pub mod framing;
mod tls;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{DriverError, PeerDriver, Snapshot, TorrentRecord};
use crate::config::NetworkConfig;
use crate::metainfo;
use crate::peer::Peer;
use crate::rencode::Value;

/// Message type of a successful RPC response.
pub const RPC_RESPONSE: i128 = 1;
/// Message type of a failed RPC call.
pub const RPC_ERROR: i128 = 2;

const LOGIN_REQUEST_ID: i128 = 1;
const COMMAND_REQUEST_ID: i128 = 2;

/// Fields requested from `core.get_torrents_status`.
pub const STATUS_FIELDS: [&str; 3] = ["name", "progress", "total_size"];

/// One RPC call tuple `(request_id, method, args, kwargs)`.
fn rpc_call(
    request_id: i128,
    method: &str,
    args: Vec<Value>,
    kwargs: Vec<(Value, Value)>,
) -> Value {
    Value::List(vec![
        Value::Int(request_id),
        method.into(),
        Value::List(args),
        Value::Map(kwargs),
    ])
}

/// Runs login plus one call over an established stream.
///
/// Returns the call's return value.
///
/// # Errors
///
/// - `DriverError::Protocol` - If the acknowledgement is not a successful
///   login response or the call failed; carries the decoded response
/// - `DriverError::Codec` / `DriverError::Io` - If a frame is unreadable
pub async fn exchange<S>(
    stream: &mut S,
    username: &str,
    password: &str,
    method: &str,
    args: Vec<Value>,
    kwargs: Vec<(Value, Value)>,
) -> Result<Value, DriverError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = Value::List(vec![
        rpc_call(
            LOGIN_REQUEST_ID,
            "daemon.login",
            vec![username.into(), password.into()],
            Vec::new(),
        ),
        rpc_call(COMMAND_REQUEST_ID, method, args, kwargs),
    ]);
    framing::write_frame(stream, &request).await?;

    let ack = framing::read_frame(stream).await?;
    let acknowledged = matches!(
        ack.as_list(),
        Some([kind, id, _])
            if kind.as_int() == Some(RPC_RESPONSE) && id.as_int() == Some(LOGIN_REQUEST_ID)
    );
    if !acknowledged {
        return Err(DriverError::Protocol {
            message: "daemon.login was not acknowledged".to_string(),
            response: Some(ack),
        });
    }

    let response = framing::read_frame(stream).await?;
    match response.as_list() {
        Some([kind, _, result, ..]) if kind.as_int() == Some(RPC_RESPONSE) => Ok(result.clone()),
        _ => Err(DriverError::Protocol {
            message: format!("{method} failed"),
            response: Some(response),
        }),
    }
}

/// Converts a `core.get_torrents_status` result into a snapshot.
///
/// `progress` is a percentage; verified bytes are derived from it.
fn snapshot_from_status(status: &Value) -> Result<Snapshot, DriverError> {
    let entries = status.as_map().ok_or_else(|| DriverError::Protocol {
        message: "Torrent status is not a map".to_string(),
        response: Some(status.clone()),
    })?;

    let mut snapshot = Vec::with_capacity(entries.len());
    for (hash, fields) in entries {
        let Some(hash) = hash.as_str() else {
            tracing::warn!("Skipping torrent status keyed by a non-string");
            continue;
        };
        let total_size = fields
            .get("total_size")
            .and_then(Value::as_int)
            .and_then(|size| u64::try_from(size).ok())
            .unwrap_or(0);
        let progress = fields
            .get("progress")
            .and_then(Value::as_float)
            .unwrap_or(0.0)
            .clamp(0.0, 100.0);

        snapshot.push(TorrentRecord {
            hash_string: hash.to_ascii_lowercase(),
            id: None,
            name: fields
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            total_size,
            have_valid: Some((total_size as f64 * progress / 100.0).round() as u64),
        });
    }
    Ok(snapshot)
}

pub struct DelugeDriver {
    endpoint: String,
    host: String,
    port: u16,
    username: String,
    password: String,
    connect_timeout: Duration,
    connector: TlsConnector,
}

impl DelugeDriver {
    /// Creates a driver for `peer`. Missing credentials are sent as empty
    /// strings.
    ///
    /// # Errors
    ///
    /// - `DriverError::Tls` - If the TLS client configuration cannot be built
    pub fn new(peer: &Peer, config: &NetworkConfig) -> Result<Self, DriverError> {
        Ok(Self {
            endpoint: peer.key().to_string(),
            host: peer.host.clone(),
            port: peer.port,
            username: peer.username.clone().unwrap_or_default(),
            password: peer.password.clone().unwrap_or_default(),
            connect_timeout: config.deluge_connect_timeout,
            connector: tls::daemon_connector()?,
        })
    }

    async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Vec<(Value, Value)>,
    ) -> Result<Value, DriverError> {
        let connect = async {
            let tcp = TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(|e| DriverError::Transport {
                    endpoint: self.endpoint.clone(),
                    reason: format!("Failed to connect: {e}"),
                })?;
            self.connector
                .connect(tls::server_name(&self.host)?, tcp)
                .await
                .map_err(|e| DriverError::Tls {
                    reason: format!("Handshake with {} failed: {e}", self.endpoint),
                })
        };

        let mut stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| DriverError::Timeout {
                endpoint: self.endpoint.clone(),
                millis: self.connect_timeout.as_millis(),
            })??;

        tracing::debug!("{} <- {}", self.endpoint, method);
        exchange(
            &mut stream,
            &self.username,
            &self.password,
            method,
            args,
            kwargs,
        )
        .await
    }
}

#[async_trait]
impl PeerDriver for DelugeDriver {
    async fn list(&self) -> Result<Snapshot, DriverError> {
        let fields = STATUS_FIELDS.iter().map(|field| Value::from(*field)).collect();
        let status = self
            .call(
                "core.get_torrents_status",
                vec![Value::Map(Vec::new()), Value::List(fields)],
                Vec::new(),
            )
            .await?;
        snapshot_from_status(&status)
    }

    async fn add(&self, torrent: &[u8]) -> Result<(), DriverError> {
        let summary = metainfo::inspect(torrent)?;
        let filename = format!("{}.torrent", summary.name);

        let added = self
            .call(
                "core.add_torrent_file",
                vec![
                    filename.into(),
                    STANDARD.encode(torrent).into(),
                    Value::Map(Vec::new()),
                ],
                Vec::new(),
            )
            .await?;
        if added == Value::Null {
            tracing::info!("{} already had {}", self.endpoint, summary.name);
        }
        Ok(())
    }

    async fn remove(&self, info_hash: &str, delete_data: bool) -> Result<(), DriverError> {
        self.call(
            "core.remove_torrent",
            vec![info_hash.into(), delete_data.into()],
            Vec::new(),
        )
        .await?;
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
