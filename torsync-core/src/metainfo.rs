//! Torrent metainfo inspection: info hash, display name and payload size

use sha1::{Digest, Sha1};

// Type aliases for complex bencode types
type BencodeDict<'a> = std::collections::HashMap<&'a [u8], bencode_rs::Value<'a>>;
type ParseResult<T> = Result<T, MetainfoError>;

/// Bencode nesting accepted while locating the info dictionary.
const MAX_NESTING: usize = 64;

/// Errors raised while inspecting a torrent file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetainfoError {
    #[error("Failed to parse torrent file: {reason}")]
    InvalidTorrentFile { reason: String },
}

fn invalid(reason: impl Into<String>) -> MetainfoError {
    MetainfoError::InvalidTorrentFile {
        reason: reason.into(),
    }
}

/// What the replication engine needs to know about a torrent file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentSummary {
    /// SHA-1 of the bencoded info dictionary, 40 lowercase hex characters
    pub info_hash: String,
    pub name: String,
    pub total_length: u64,
}

/// Inspects raw `.torrent` bytes.
///
/// # Errors
///
/// - `MetainfoError::InvalidTorrentFile` - If the bencode is malformed or
///   the info dictionary lacks a name or length
pub fn inspect(torrent_bytes: &[u8]) -> Result<TorrentSummary, MetainfoError> {
    let (info_start, info_end) = locate_info_dictionary(torrent_bytes)?;
    let info_bytes = &torrent_bytes[info_start..info_end];
    let info_hash = hex::encode(Sha1::digest(info_bytes));

    let parsed = bencode_rs::Value::parse(info_bytes)
        .map_err(|e| invalid(format!("Bencode parsing failed: {e:?}")))?;
    let Some(bencode_rs::Value::Dictionary(info_dict)) = parsed.first() else {
        return Err(invalid("Info field must be dictionary"));
    };

    let name = extract_name(info_dict)?;
    let total_length = extract_total_length(info_dict)?;

    Ok(TorrentSummary {
        info_hash,
        name,
        total_length,
    })
}

/// Finds the byte span of the top-level `info` value.
fn locate_info_dictionary(data: &[u8]) -> ParseResult<(usize, usize)> {
    if data.first() != Some(&b'd') {
        return Err(invalid("Root element must be dictionary"));
    }

    let mut cursor = 1;
    loop {
        match data.get(cursor) {
            Some(b'e') | None => return Err(invalid("Missing 'info' field")),
            Some(b'0'..=b'9') => {
                let (key_start, key_end) = string_span(data, cursor)?;
                let value_end = skip_value(data, key_end, 0)?;
                if &data[key_start..key_end] == b"info" {
                    if data.get(key_end) != Some(&b'd') {
                        return Err(invalid("Info field must be dictionary"));
                    }
                    return Ok((key_end, value_end));
                }
                cursor = value_end;
            }
            Some(_) => return Err(invalid("Dictionary keys must be strings")),
        }
    }
}

/// Returns the content span of the string starting at `pos`.
fn string_span(data: &[u8], pos: usize) -> ParseResult<(usize, usize)> {
    let colon = data[pos..]
        .iter()
        .position(|byte| *byte == b':')
        .map(|relative| pos + relative)
        .ok_or_else(|| invalid("Invalid string format"))?;

    let length: usize = std::str::from_utf8(&data[pos..colon])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| invalid("Invalid string length"))?;

    let end = (colon + 1)
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| invalid("String runs past end of data"))?;
    Ok((colon + 1, end))
}

/// Returns the offset just past the bencode value starting at `pos`.
fn skip_value(data: &[u8], pos: usize, depth: usize) -> ParseResult<usize> {
    if depth > MAX_NESTING {
        return Err(invalid("Bencode nested too deeply"));
    }

    match data.get(pos) {
        Some(b'i') => data[pos..]
            .iter()
            .position(|byte| *byte == b'e')
            .map(|relative| pos + relative + 1)
            .ok_or_else(|| invalid("Unterminated integer")),
        Some(b'l' | b'd') => {
            let mut cursor = pos + 1;
            loop {
                match data.get(cursor) {
                    Some(b'e') => return Ok(cursor + 1),
                    Some(_) => cursor = skip_value(data, cursor, depth + 1)?,
                    None => return Err(invalid("Unterminated container")),
                }
            }
        }
        Some(b'0'..=b'9') => string_span(data, pos).map(|(_, end)| end),
        _ => Err(invalid("Invalid bencode character")),
    }
}

fn extract_bytes(dict: &BencodeDict<'_>, key: &[u8]) -> Option<Vec<u8>> {
    match dict.get(key) {
        Some(bencode_rs::Value::Bytes(bytes)) => Some(bytes.to_vec()),
        _ => None,
    }
}

fn extract_integer(dict: &BencodeDict<'_>, key: &[u8]) -> Option<i64> {
    match dict.get(key) {
        Some(bencode_rs::Value::Integer(value)) => Some(*value),
        _ => None,
    }
}

/// Prefers the explicit UTF-8 name some creators add next to `name`.
fn extract_name(info_dict: &BencodeDict<'_>) -> ParseResult<String> {
    extract_bytes(info_dict, b"name.utf-8")
        .or_else(|| extract_bytes(info_dict, b"name"))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .ok_or_else(|| invalid("Missing or invalid field: \"name\""))
}

fn extract_total_length(info_dict: &BencodeDict<'_>) -> ParseResult<u64> {
    if let Some(length) = extract_integer(info_dict, b"length") {
        return u64::try_from(length).map_err(|_| invalid("Negative length"));
    }

    let Some(bencode_rs::Value::List(files)) = info_dict.get(b"files".as_slice()) else {
        return Err(invalid("Missing 'files' or 'length' field"));
    };

    let mut total_length = 0u64;
    for file in files {
        let bencode_rs::Value::Dictionary(file_dict) = file else {
            return Err(invalid("Invalid file entry type"));
        };
        let length = extract_integer(file_dict, b"length")
            .and_then(|length| u64::try_from(length).ok())
            .ok_or_else(|| invalid("Missing or invalid file length"))?;
        total_length = total_length.saturating_add(length);
    }
    Ok(total_length)
}
