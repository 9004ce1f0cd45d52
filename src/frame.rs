//! Delimited frame codec for the multistream wire format.
//!
//! A frame on the wire is `varint(N) ++ payload ++ '\n'` where `N` counts
//! the payload plus the trailing newline (unsigned LEB128 varint). The
//! newline is part of the counted bytes but is stripped from decoded
//! payloads. A missing newline is a recoverable [`FrameError::MalformedFrame`],
//! never a hard fault.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum encoded length of a u64 varint.
const MAX_VARINT_LEN: usize = 10;

/// Sanity cap on the declared frame length. The length field is
/// peer-controlled and must not be able to force an arbitrary allocation.
const MAX_FRAME_LEN: u64 = 1024 * 1024;

/// Frame codec errors.
#[derive(Debug)]
pub enum FrameError {
    /// End of stream before a complete varint or full payload was read.
    TruncatedStream,
    /// Zero-length frame, overlong or oversize length, or the final byte
    /// was not the expected newline.
    MalformedFrame,
    /// Underlying connection read/write failure.
    Transport(std::io::Error),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::TruncatedStream => write!(f, "stream ended inside a frame"),
            FrameError::MalformedFrame => write!(f, "malformed frame"),
            FrameError::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::TruncatedStream,
            _ => FrameError::Transport(e),
        }
    }
}

/// Encode a payload as one delimited frame. Always succeeds, including for
/// an empty payload (which encodes as a lone counted newline).
pub fn encode(payload: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(MAX_VARINT_LEN + payload.len() + 1);
    put_uvarint(&mut frame, payload.len() as u64 + 1);
    frame.put_slice(payload);
    frame.put_u8(b'\n');
    frame
}

/// Write `payload` to `writer` as one delimited frame.
pub async fn write<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one delimited frame from `reader`, returning the payload with the
/// trailing newline stripped. Consumes exactly the varint plus the counted
/// bytes and never reads past the frame.
pub async fn read<R>(reader: &mut R) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin,
{
    let length = read_uvarint(reader).await?;
    if length == 0 || length > MAX_FRAME_LEN {
        return Err(FrameError::MalformedFrame);
    }

    let mut buf = vec![0u8; length as usize];
    reader.read_exact(&mut buf).await?;

    if buf.last() != Some(&b'\n') {
        return Err(FrameError::MalformedFrame);
    }
    buf.pop();
    Ok(Bytes::from(buf))
}

/// Append the LEB128 encoding of `value` to `buf`.
pub(crate) fn put_uvarint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8(value as u8 | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Read a LEB128 varint one byte at a time. An encoding longer than ten
/// bytes cannot be a u64 and is rejected as malformed.
pub(crate) async fn read_uvarint<R>(reader: &mut R) -> Result<u64, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut value = 0u64;
    let mut shift = 0u32;
    for _ in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().await?;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(FrameError::MalformedFrame)
}
