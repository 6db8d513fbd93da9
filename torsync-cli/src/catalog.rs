//! Torrent file catalogs listed in the settings `torrents` file.
//!
//! A catalog is either a local directory (`file:<dir>`) or an HTML index
//! page (`http://` / `https://`) whose anchors name `.torrent` files. The
//! first catalog holding a file whose name contains the torrent's name
//! supplies the bytes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use torsync_core::config::NetworkConfig;
use torsync_core::sync::{SourceError, TorrentSource};
use torsync_core::{Result, TorsyncError};
use url::Url;

const TORRENT_EXTENSION: &str = ".torrent";

#[derive(Debug, Clone, PartialEq, Eq)]
enum CatalogUri {
    Directory(PathBuf),
    Index(Url),
}

/// Where a matching torrent file was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogHit {
    File(PathBuf),
    Remote(Url),
}

/// Ordered list of catalogs.
#[derive(Debug, Clone)]
pub struct TorrentCatalog {
    uris: Vec<CatalogUri>,
    client: reqwest::Client,
}

impl TorrentCatalog {
    /// # Errors
    ///
    /// - `TorsyncError::Io` - If the file cannot be read
    /// - `TorsyncError::Configuration` - If a line is not a supported catalog URI
    pub fn load(path: &Path, network: &NetworkConfig) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?, network)
    }

    /// Parses one catalog URI per line; blank lines and `#` comments are
    /// skipped.
    ///
    /// # Errors
    ///
    /// - `TorsyncError::Configuration` - If a line is not a `file:`, `http:`
    ///   or `https:` URI
    pub fn parse(text: &str, network: &NetworkConfig) -> Result<Self> {
        let mut uris = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let uri = parse_uri(line).map_err(|reason| TorsyncError::Configuration {
                reason: format!("torrents line {}: {reason}", index + 1),
            })?;
            uris.push(uri);
        }

        let client = reqwest::Client::builder()
            .timeout(network.http_timeout)
            .user_agent(network.user_agent)
            .build()
            .map_err(|e| TorsyncError::Configuration {
                reason: format!("HTTP client: {e}"),
            })?;

        Ok(Self { uris, client })
    }

    /// Finds the first catalog file whose name contains `name`.
    ///
    /// # Errors
    ///
    /// - `SourceError::Io` - If a directory catalog cannot be listed
    /// - `SourceError::Unavailable` - If an index page cannot be fetched
    pub async fn locate(
        &self,
        name: &str,
    ) -> std::result::Result<Option<CatalogHit>, SourceError> {
        for uri in &self.uris {
            let hit = match uri {
                CatalogUri::Directory(dir) => list_directory(dir)
                    .await?
                    .into_iter()
                    .find(|file| file.contains(name))
                    .map(|file| CatalogHit::File(dir.join(file))),
                CatalogUri::Index(base) => self
                    .list_index(base)
                    .await?
                    .into_iter()
                    .find(|file| file.contains(name))
                    .map(|file| entry_url(base, &file))
                    .transpose()?
                    .map(CatalogHit::Remote),
            };
            if let Some(hit) = hit {
                tracing::debug!("Catalog hit for {}: {:?}", name, hit);
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// # Errors
    ///
    /// - `SourceError::Io` - If a local file cannot be read
    /// - `SourceError::Unavailable` - If a remote file cannot be fetched
    pub async fn read(&self, hit: &CatalogHit) -> std::result::Result<Vec<u8>, SourceError> {
        match hit {
            CatalogHit::File(path) => Ok(tokio::fs::read(path).await?),
            CatalogHit::Remote(url) => self.fetch(url).await,
        }
    }

    async fn list_index(&self, base: &Url) -> std::result::Result<Vec<String>, SourceError> {
        let body = self.fetch(base).await?;
        let page = String::from_utf8_lossy(&body);
        Ok(anchor_names(&page))
    }

    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<u8>, SourceError> {
        let unavailable = |reason: String| SourceError::Unavailable {
            reason: format!("{url}: {reason}"),
        };
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {status}")));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl TorrentSource for TorrentCatalog {
    async fn find_torrent_bytes(
        &self,
        name: &str,
        _info_hash: &str,
    ) -> std::result::Result<Option<Vec<u8>>, SourceError> {
        match self.locate(name).await? {
            Some(hit) => Ok(Some(self.read(&hit).await?)),
            None => Ok(None),
        }
    }
}

fn parse_uri(line: &str) -> std::result::Result<CatalogUri, String> {
    let url = Url::parse(line).map_err(|e| format!("invalid URI '{line}': {e}"))?;
    match url.scheme() {
        "file" => url
            .to_file_path()
            .map(CatalogUri::Directory)
            .map_err(|()| format!("invalid directory '{line}'")),
        "http" | "https" => Ok(CatalogUri::Index(url)),
        scheme => Err(format!("unsupported catalog scheme '{scheme}'")),
    }
}

/// `.torrent` file names in `dir`, sorted. A missing directory is empty.
async fn list_directory(dir: &Path) -> std::result::Result<Vec<String>, SourceError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Catalog directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(TORRENT_EXTENSION) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Anchor texts ending in `.torrent`, in page order.
fn anchor_names(page: &str) -> Vec<String> {
    let Ok(anchor) = regex::Regex::new(r"(?is)<a\b[^>]*>\s*([^<]*?)\s*</a>") else {
        return Vec::new();
    };
    anchor
        .captures_iter(page)
        .filter_map(|captures| captures.get(1))
        .map(|text| text.as_str().to_string())
        .filter(|text| text.ends_with(TORRENT_EXTENSION))
        .collect()
}

fn entry_url(base: &Url, file: &str) -> std::result::Result<Url, SourceError> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        urlencoding::encode(file)
    );
    Url::parse(&joined).map_err(|e| SourceError::Unavailable {
        reason: format!("{joined}: {e}"),
    })
}
