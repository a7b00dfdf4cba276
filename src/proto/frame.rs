//! Length-prefixed message framing.
//!
//! Every message on a herdfs connection is a 4-byte big-endian length
//! followed by a JSON body. The length guards against runaway allocations;
//! write requests carry file contents, so the cap is generous.

use byteorder::{BigEndian, ByteOrder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Maximum accepted frame body length in bytes.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Writes one frame: header then body.
pub async fn write_frame<W>(dst: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::bad_argument(format!("frame of {} bytes is too large", payload.len())));
    }
    let mut header = [0u8; 4];
    BigEndian::write_u32(&mut header, payload.len() as u32);
    dst.write_all(&header).await.map_err(Error::transport)?;
    dst.write_all(payload).await.map_err(Error::transport)?;
    dst.flush().await.map_err(Error::transport)
}

/// Reads one frame body.
pub async fn read_frame<R>(src: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    src.read_exact(&mut header).await.map_err(Error::transport)?;
    let len = BigEndian::read_u32(&header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::bad_argument(format!("frame of {len} bytes is too large")));
    }
    let mut payload = vec![0u8; len];
    src.read_exact(&mut payload).await.map_err(Error::transport)?;
    Ok(payload)
}

/// Serializes `message` and writes it as one frame.
pub async fn send<W, T>(dst: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message).map_err(Error::io)?;
    write_frame(dst, &payload).await
}

/// Reads one frame and deserializes it.
///
/// A frame that does not decode as `T` is a protocol violation by the peer
/// and surfaces as [`Error::IllegalArgument`].
pub async fn recv<R, T>(src: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(src).await?;
    serde_json::from_slice(&payload)
        .map_err(|err| Error::bad_argument(format!("malformed message: {err}")))
}
