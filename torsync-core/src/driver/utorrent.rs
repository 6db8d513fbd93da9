//! uTorrent WebUI driver

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{self, Credentials};
use super::{DriverError, PeerDriver, Snapshot, TorrentRecord};
use crate::config::NetworkConfig;
use crate::peer::Peer;

/// Boundary marker of the `add-file` multipart body.
pub const MULTIPART_BOUNDARY: &str = "myboundary";

/// Size reported for every torrent; the list API carries progress in
/// per-mille, so `haveValid / SYNTHETIC_TOTAL_SIZE` is the completion ratio.
pub const SYNTHETIC_TOTAL_SIZE: u64 = 1000;

// Positions inside one `torrents` row.
const ROW_HASH: usize = 0;
const ROW_NAME: usize = 2;
const ROW_PROGRESS: usize = 4;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    torrents: Vec<Vec<serde_json::Value>>,
}

pub struct UTorrentDriver {
    endpoint: String,
    gui_url: String,
    credentials: Option<Credentials>,
    client: reqwest::Client,
}

impl UTorrentDriver {
    /// # Errors
    ///
    /// - `DriverError::Transport` - If the HTTP client cannot be built
    pub fn new(peer: &Peer, config: &NetworkConfig) -> Result<Self, DriverError> {
        let endpoint = peer.key().to_string();
        Ok(Self {
            gui_url: format!("http://{endpoint}/gui/"),
            client: http::build_client(config, &endpoint)?,
            credentials: Credentials::from_parts(peer.username.as_ref(), peer.password.as_ref()),
            endpoint,
        })
    }

    /// Fetches a fresh token. The GUID cookie set alongside it stays in the
    /// client's cookie store.
    async fn token(&self) -> Result<String, DriverError> {
        let request = http::authorize(
            self.client.get(format!("{}token.html", self.gui_url)),
            self.credentials.as_ref(),
        );
        let response = http::send(request, &self.endpoint, None)
            .await?
            .require_success(&self.endpoint)?;

        extract_token(&response.text()).ok_or_else(|| DriverError::Transport {
            endpoint: self.endpoint.clone(),
            reason: "Token page carried no token".to_string(),
        })
    }

    async fn gui_get(&self, params: &[(&str, &str)]) -> Result<serde_json::Value, DriverError> {
        let token = self.token().await?;
        let request = self
            .client
            .get(&self.gui_url)
            .query(params)
            .query(&[("token", token.as_str())]);
        let response = http::send(
            http::authorize(request, self.credentials.as_ref()),
            &self.endpoint,
            None,
        )
        .await?
        .require_success(&self.endpoint)?;

        let body: serde_json::Value = response.json(&self.endpoint)?;
        check_error(body)
    }
}

fn extract_token(page: &str) -> Option<String> {
    let re = regex::Regex::new(r#"<div[^>]*id=['"]token['"][^>]*>([^<]*)</div>"#).ok()?;
    let token = re.captures(page)?.get(1)?.as_str().trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Rejects bodies carrying the WebUI's `error` field.
fn check_error(body: serde_json::Value) -> Result<serde_json::Value, DriverError> {
    match body.get("error") {
        Some(error) => Err(DriverError::Protocol {
            message: format!("WebUI error: {error}"),
            response: None,
        }),
        None => Ok(body),
    }
}

/// Maps one positional row onto the common record shape.
fn record_from_row(row: &[serde_json::Value]) -> Option<TorrentRecord> {
    let hash = row.get(ROW_HASH)?.as_str()?;
    let name = row.get(ROW_NAME)?.as_str()?;
    let progress = row.get(ROW_PROGRESS)?.as_u64()?;
    Some(TorrentRecord {
        hash_string: hash.to_ascii_lowercase(),
        id: None,
        name: name.to_string(),
        total_size: SYNTHETIC_TOTAL_SIZE,
        have_valid: Some(progress.min(SYNTHETIC_TOTAL_SIZE)),
    })
}

fn multipart_body(torrent: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{MULTIPART_BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"torrent_file\"; filename=\"upload.torrent\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(torrent);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

#[async_trait]
impl PeerDriver for UTorrentDriver {
    async fn list(&self) -> Result<Snapshot, DriverError> {
        let body = self.gui_get(&[("list", "1")]).await?;
        let parsed: ListResponse =
            serde_json::from_value(body).map_err(|e| DriverError::Transport {
                endpoint: self.endpoint.clone(),
                reason: format!("Malformed torrent list: {e}"),
            })?;

        let mut snapshot = Vec::with_capacity(parsed.torrents.len());
        for row in &parsed.torrents {
            match record_from_row(row) {
                Some(record) => snapshot.push(record),
                None => tracing::warn!("{} listed an unreadable torrent row", self.endpoint),
            }
        }
        Ok(snapshot)
    }

    async fn add(&self, torrent: &[u8]) -> Result<(), DriverError> {
        let token = self.token().await?;
        let request = self
            .client
            .post(&self.gui_url)
            .query(&[("action", "add-file"), ("token", token.as_str())])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(multipart_body(torrent));

        let response = http::send(
            http::authorize(request, self.credentials.as_ref()),
            &self.endpoint,
            None,
        )
        .await?
        .require_success(&self.endpoint)?;

        check_error(response.json(&self.endpoint)?)?;
        Ok(())
    }

    async fn remove(&self, info_hash: &str, delete_data: bool) -> Result<(), DriverError> {
        let action = if delete_data { "removedata" } else { "remove" };
        let hash = info_hash.to_ascii_uppercase();
        self.gui_get(&[("action", action), ("hash", hash.as_str())])
            .await?;
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake_http::{CannedResponse, serve};
    use crate::peer::ClientKind;

    const TOKEN_PAGE: &str =
        "<html><div id='token' style='display:none;'>tOkEn-42</div></html>";

    fn token_page() -> CannedResponse {
        CannedResponse::new(200, TOKEN_PAGE).with_header("Set-Cookie", "GUID=g123; path=/")
    }

    fn driver_for(address: std::net::SocketAddr) -> UTorrentDriver {
        let peer = Peer::new(ClientKind::UTorrent, "127.0.0.1", address.port())
            .with_credentials("admin", "");
        UTorrentDriver::new(&peer, &NetworkConfig::default()).unwrap()
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token(TOKEN_PAGE).as_deref(), Some("tOkEn-42"));
        assert_eq!(
            extract_token(r#"<div id="token">abc</div>"#).as_deref(),
            Some("abc")
        );
        assert_eq!(extract_token("<div id='token'></div>"), None);
        assert_eq!(extract_token("<html></html>"), None);
    }

    #[test]
    fn test_row_mapping_uses_per_mille_progress() {
        let row: Vec<serde_json::Value> =
            serde_json::from_str(r#"["ABCD", 201, "ubuntu.iso", 123456, 500, 0]"#).unwrap();
        let record = record_from_row(&row).unwrap();

        assert_eq!(record.hash_string, "abcd");
        assert_eq!(record.name, "ubuntu.iso");
        assert_eq!(record.total_size, SYNTHETIC_TOTAL_SIZE);
        assert_eq!(record.completion_ratio(), 0.5);

        assert!(record_from_row(&row[..3]).is_none());
    }

    #[test]
    fn test_multipart_body_wraps_raw_bytes() {
        let body = multipart_body(b"\x00torrent\xff");
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with("--myboundary\r\n"));
        assert!(text.contains("name=\"torrent_file\""));
        assert!(text.ends_with("\r\n--myboundary--\r\n"));
        assert!(body.windows(9).any(|w| w == b"\x00torrent\xff"));
    }

    #[tokio::test]
    async fn test_list_presents_token() {
        let list = r#"{"build":30000,"torrents":[["AAAA",201,"one",10,1000,0],["BBBB",201,"two",10,250,0]]}"#;
        let (address, server) = serve(vec![token_page(), CannedResponse::new(200, list)]).await;

        let snapshot = driver_for(address).list().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].completion_ratio(), 1.0);
        assert_eq!(snapshot[1].completion_ratio(), 0.25);

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /gui/token.html"));
        assert!(requests[1].starts_with("GET /gui/?list=1&token=tOkEn-42"));
    }

    #[tokio::test]
    async fn test_remove_action_follows_delete_flag() {
        let (address, server) = serve(vec![
            token_page(),
            CannedResponse::new(200, r#"{"build":1}"#),
            token_page(),
            CannedResponse::new(200, r#"{"build":1}"#),
        ])
        .await;

        let driver = driver_for(address);
        driver.remove("abcd", false).await.unwrap();
        driver.remove("abcd", true).await.unwrap();

        let requests = server.await.unwrap();
        assert!(requests[1].starts_with("GET /gui/?action=remove&hash=ABCD&token="));
        assert!(requests[3].starts_with("GET /gui/?action=removedata&hash=ABCD&token="));
    }

    #[tokio::test]
    async fn test_add_posts_multipart_and_surfaces_webui_error() {
        let (address, server) = serve(vec![
            token_page(),
            CannedResponse::new(200, r#"{"build":1,"error":"Can't add torrent"}"#),
        ])
        .await;

        let error = driver_for(address).add(b"d4:infodee").await.unwrap_err();
        assert!(matches!(error, DriverError::Protocol { .. }));

        let requests = server.await.unwrap();
        assert!(requests[1].starts_with("POST /gui/?action=add-file&token=tOkEn-42"));
        assert!(requests[1].contains("multipart/form-data; boundary=myboundary"));
        assert!(requests[1].contains("d4:infodee"));
    }

    #[tokio::test]
    async fn test_missing_token_is_transport_error() {
        let (address, _server) = serve(vec![CannedResponse::new(200, "<html></html>")]).await;
        assert!(driver_for(address).list().await.unwrap_err().is_transport());
    }
}
