//! Newline framing for one-message-per-connection exchanges

use crate::error::FrameError;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 4096;

/// Reads bytes until the first `\n` or until the peer closes
///
/// Returns `Ok(None)` when the peer closed without sending anything. Bytes
/// after the newline are discarded since a connection carries one message.
pub async fn read_frame<R>(reader: &mut R, max_bytes: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut frame = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let len = reader.read(&mut chunk).await?;
        if len == 0 {
            break;
        }

        let received = &chunk[..len];
        match received.iter().position(|b| *b == b'\n') {
            Some(newline) => {
                frame.extend_from_slice(&received[..newline]);
                if frame.len() > max_bytes {
                    return Err(FrameError::TooLarge { limit: max_bytes });
                }
                return Ok(Some(frame));
            }
            None => {
                frame.extend_from_slice(received);
                if frame.len() > max_bytes {
                    return Err(FrameError::TooLarge { limit: max_bytes });
                }
            }
        }
    }

    if frame.is_empty() {
        Ok(None)
    } else {
        Ok(Some(frame))
    }
}

/// [`read_frame`] bounded by a deadline
pub async fn read_frame_within<R>(
    reader: &mut R,
    max_bytes: usize,
    deadline: Duration,
) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(deadline, read_frame(reader, max_bytes))
        .await
        .map_err(|_| FrameError::TimedOut)?
}

/// Serializes `message` as a single JSON line and flushes it
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
