//! Length-prefixed text framing for TTTP streams.
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! +-------------------+--------------------+
//! | length (2 bytes)  |   payload          |
//! | u16 big-endian    |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The payload is UTF-8 text and the length does **not** include the 2 prefix
//! bytes. The TTTP vocabulary itself is plain ASCII.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Configuration for the framing layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed payload size in bytes. Default: `u16::MAX`.
    pub max_payload_size: u16,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: u16::MAX,
        }
    }
}

/// Errors that can occur during framing operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload size exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// The actual payload size.
        size: usize,
        /// The configured maximum.
        max: u16,
    },

    /// The connection was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,

    /// The payload was not valid UTF-8.
    #[error("frame payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn closed_or_io(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read a single text frame from the stream.
///
/// Blocks until the full frame is available. Returns
/// [`FrameError::ConnectionClosed`] if the peer closes the connection before
/// or inside a frame.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<String, FrameError> {
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf).await.map_err(closed_or_io)?;

    let payload_len = u16::from_be_bytes(len_buf);
    if payload_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: usize::from(payload_len),
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; usize::from(payload_len)];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await.map_err(closed_or_io)?;
    }

    Ok(String::from_utf8(payload)?)
}

/// Write a single text frame and flush it.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    text: &str,
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let payload = text.as_bytes();
    let len = u16::try_from(payload.len())
        .ok()
        .filter(|len| *len <= config.max_payload_size)
        .ok_or(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: config.max_payload_size,
        })?;

    writer.write_all(&len.to_be_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn default_config() -> FrameConfig {
        FrameConfig::default()
    }

    #[tokio::test]
    async fn test_single_message_roundtrip() {
        let (mut client, mut server) = duplex(8192);
        let config = default_config();

        write_frame(&mut client, "MOVE 4", &config).await.unwrap();
        let received = read_frame(&mut server, &config).await.unwrap();
        assert_eq!(received, "MOVE 4");
    }

    #[tokio::test]
    async fn test_multiple_messages_in_sequence() {
        let (mut client, mut server) = duplex(8192);
        let config = default_config();

        let messages = ["WELCOME X", "WAITING Waiting for opponent to connect", "VALID_MOVE"];
        for msg in &messages {
            write_frame(&mut client, msg, &config).await.unwrap();
        }

        for expected in &messages {
            let received = read_frame(&mut server, &config).await.unwrap();
            assert_eq!(received, *expected);
        }
    }

    #[tokio::test]
    async fn test_partial_read_resumes_correctly() {
        // A tiny duplex buffer forces the frame across several reads.
        let (mut client, mut server) = duplex(4);
        let config = default_config();

        let write_config = config.clone();
        let write_task = tokio::spawn(async move {
            write_frame(&mut client, "OPPONENT_MOVED_END 8", &write_config)
                .await
                .unwrap();
        });

        let received = read_frame(&mut server, &config).await.unwrap();
        write_task.await.unwrap();
        assert_eq!(received, "OPPONENT_MOVED_END 8");
    }

    #[tokio::test]
    async fn test_length_prefix_is_big_endian_u16() {
        let (mut client, mut server) = duplex(8192);
        let config = default_config();

        write_frame(&mut client, "TIE", &config).await.unwrap();
        let mut raw = [0u8; 5];
        server.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw, [0x00, 0x03, b'T', b'I', b'E']);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_on_read() {
        let (mut client, mut server) = duplex(8192);
        let config = FrameConfig {
            max_payload_size: 16,
        };

        client.write_all(&1024u16.to_be_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let result = read_frame(&mut server, &config).await;
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_on_write() {
        let (mut client, _server) = duplex(8192);
        let config = default_config();

        let big = "x".repeat(usize::from(u16::MAX) + 1);
        let result = write_frame(&mut client, &big, &config).await;
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_invalid_utf8_rejected() {
        let (mut client, mut server) = duplex(8192);
        let config = default_config();

        client.write_all(&[0x00, 0x02, 0xC3, 0x28]).await.unwrap();
        client.flush().await.unwrap();

        let result = read_frame(&mut server, &config).await;
        assert!(matches!(result, Err(FrameError::InvalidUtf8(_))));
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_empty_text() {
        let (mut client, mut server) = duplex(8192);
        let config = default_config();

        write_frame(&mut client, "", &config).await.unwrap();
        let received = read_frame(&mut server, &config).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_connection_closed_during_length_read() {
        let (client, mut server) = duplex(8192);
        drop(client);

        let result = read_frame(&mut server, &default_config()).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_connection_closed_mid_payload() {
        let (mut client, mut server) = duplex(8192);
        client.write_all(&[0x00, 0x0A, b'M', b'O']).await.unwrap();
        drop(client);

        let result = read_frame(&mut server, &default_config()).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }
}
