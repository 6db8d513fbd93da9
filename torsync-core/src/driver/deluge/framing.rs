//! zlib-framed rencode messages.
//!
//! A frame is one complete zlib stream whose payload is a single rencode
//! value. Frames carry no length prefix: the reader inflates one byte at a
//! time until the stream reports its end, so a following frame is never
//! consumed early.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::driver::DriverError;
use crate::rencode::{self, Value};

/// Largest inflated payload accepted from a daemon.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Spare output room kept before each inflate step. One deflate input byte
/// expands to at most a few kilobytes.
const OUTPUT_HEADROOM: usize = 8 * 1024;

/// Compresses `message` and writes it as one frame.
///
/// # Errors
///
/// - `DriverError::Encode` - If the value cannot be rencoded
/// - `DriverError::Io` - If the write fails
pub async fn write_frame<W>(writer: &mut W, message: &Value) -> Result<(), DriverError>
where
    W: AsyncWrite + Unpin,
{
    let payload = rencode::encode(message)?;

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len()), Compression::default());
    encoder.write_all(&payload)?;
    let compressed = encoder.finish()?;

    tracing::trace!(
        "Writing frame: {} bytes rencoded, {} compressed",
        payload.len(),
        compressed.len()
    );

    writer.write_all(&compressed).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads exactly one frame and decodes its payload.
///
/// # Errors
///
/// - `DriverError::Io` - If the stream ends before the frame does
/// - `DriverError::Protocol` - If the bytes are not valid zlib or the
///   payload exceeds [`MAX_FRAME_BYTES`]
/// - `DriverError::Codec` - If the payload is not a single rencode value
pub async fn read_frame<R>(reader: &mut R) -> Result<Value, DriverError>
where
    R: AsyncRead + Unpin,
{
    let mut inflater = Decompress::new(true);
    let mut payload = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        reader.read_exact(&mut byte).await?;
        let mut input = &byte[..];

        // Drain until the byte is consumed and the inflater stops filling
        // the whole headroom.
        loop {
            payload.reserve(OUTPUT_HEADROOM);
            let in_before = inflater.total_in();
            let out_before = inflater.total_out();

            let status = inflater
                .decompress_vec(input, &mut payload, FlushDecompress::None)
                .map_err(|e| DriverError::Protocol {
                    message: format!("Corrupt zlib stream: {e}"),
                    response: None,
                })?;
            input = &input[(inflater.total_in() - in_before) as usize..];

            if payload.len() > MAX_FRAME_BYTES {
                return Err(DriverError::Protocol {
                    message: format!("Frame exceeds {MAX_FRAME_BYTES} bytes"),
                    response: None,
                });
            }

            if status == Status::StreamEnd {
                tracing::trace!(
                    "Read frame: {} bytes compressed, {} inflated",
                    inflater.total_in(),
                    payload.len()
                );
                return Ok(rencode::decode(&payload)?);
            }

            let progressed = inflater.total_in() != in_before || inflater.total_out() != out_before;
            if !progressed && !input.is_empty() {
                return Err(DriverError::Protocol {
                    message: "zlib stream stalled".to_string(),
                    response: None,
                });
            }
            if input.is_empty() && payload.len() < payload.capacity() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::List(vec![
            Value::Int(1),
            "daemon.info".into(),
            Value::List(vec![]),
            Value::Map(vec![("key".into(), Value::Bool(true))]),
        ])
    }

    #[tokio::test]
    async fn test_frame_round_trip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            write_frame(&mut client, &sample()).await.unwrap();
            client
        });

        assert_eq!(read_frame(&mut server).await.unwrap(), sample());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_back_to_back_frames_are_split_exactly() {
        let first = Value::List(vec![Value::Int(1), Value::Int(1), Value::Bool(true)]);
        let second = Value::Str("x".repeat(5000));

        let mut bytes = Vec::new();
        write_frame(&mut bytes, &first).await.unwrap();
        write_frame(&mut bytes, &second).await.unwrap();
        bytes.extend_from_slice(b"tail");

        let mut reader = bytes.as_slice();
        assert_eq!(read_frame(&mut reader).await.unwrap(), first);
        assert_eq!(read_frame(&mut reader).await.unwrap(), second);
        assert_eq!(reader, b"tail");
    }

    #[tokio::test]
    async fn test_highly_compressible_payload() {
        let value = Value::Str("a".repeat(1 << 20));
        let mut bytes = Vec::new();
        write_frame(&mut bytes, &value).await.unwrap();
        assert!(bytes.len() < 10_000);

        assert_eq!(read_frame(&mut bytes.as_slice()).await.unwrap(), value);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let mut bytes = Vec::new();
        write_frame(&mut bytes, &sample()).await.unwrap();
        bytes.truncate(bytes.len() - 3);

        let error = read_frame(&mut bytes.as_slice()).await.unwrap_err();
        assert!(matches!(error, DriverError::Io(_)));
    }

    #[tokio::test]
    async fn test_garbage_is_protocol_error() {
        let error = read_frame(&mut &b"not zlib at all"[..]).await.unwrap_err();
        assert!(matches!(error, DriverError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_inflated_garbage_is_codec_error() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[127]).unwrap();
        let bytes = encoder.finish().unwrap();

        let error = read_frame(&mut bytes.as_slice()).await.unwrap_err();
        assert!(matches!(error, DriverError::Codec(_)));
    }
}
