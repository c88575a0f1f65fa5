//! Zserv wire protocol framing
//!
//! Every message starts with a fixed 6-byte header:
//! ```text
//! +-------------------+--------+---------+---------+
//! | length (u16, BE)  | marker | version | command |
//! +-------------------+--------+---------+---------+
//! ```
//! where `length` counts header plus payload. Marker and version are
//! constants of the daemon build and are validated on every read.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::{Error, ProtocolTables, Result};

/// Size of the fixed frame header in bytes
pub const HEADER_LEN: usize = 6;

/// A raw frame: command code plus opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: u16, payload: Vec<u8>) -> Self {
        Self { command, payload }
    }
}

/// Read exactly one frame from the stream
///
/// A stream that closes mid-frame is a fatal connection error, never a
/// retryable short read.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    tables: &ProtocolTables,
) -> Result<Frame> {
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| map_read_error(e, "frame header"))?;

    let length = u16::from_be_bytes([header[0], header[1]]) as usize;
    let marker = header[2];
    let version = header[3];
    let command = u16::from_be_bytes([header[4], header[5]]);

    if marker != tables.marker {
        return Err(Error::protocol(format!(
            "Received message with wrong marker {} (expected {})",
            marker, tables.marker
        )));
    }

    if version != tables.version {
        return Err(Error::protocol(format!(
            "Received message with unsupported version {} (expected {})",
            version, tables.version
        )));
    }

    if length < HEADER_LEN {
        return Err(Error::protocol(format!(
            "Declared frame length {} shorter than the header",
            length
        )));
    }

    let mut payload = vec![0u8; length - HEADER_LEN];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| map_read_error(e, "frame payload"))?;

    tracing::debug!(command, len = length, "received frame");
    Ok(Frame { command, payload })
}

/// Write one frame to the stream
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
    tables: &ProtocolTables,
) -> Result<()> {
    let length = HEADER_LEN + frame.payload.len();
    if length > u16::MAX as usize {
        return Err(Error::Encoding(format!(
            "Payload of {} bytes does not fit the length field",
            frame.payload.len()
        )));
    }

    let mut header = [0u8; HEADER_LEN];
    header[..2].copy_from_slice(&(length as u16).to_be_bytes());
    header[2] = tables.marker;
    header[3] = tables.version;
    header[4..].copy_from_slice(&frame.command.to_be_bytes());

    writer.write_all(&header).await?;
    writer.write_all(&frame.payload).await?;
    writer.flush().await?;

    tracing::debug!(command = frame.command, len = length, "sent frame");
    Ok(())
}

fn map_read_error(e: std::io::Error, what: &str) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::connection(format!("Stream closed while reading {}", what))
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tables() -> ProtocolTables {
        ProtocolTables::default()
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let frame = Frame::new(7, vec![1, 2, 3, 4]);
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame, &tables()).await.unwrap();
        assert_eq!(buf.len(), HEADER_LEN + 4);
        assert_eq!(&buf[..2], &[0, 10]);

        let mut reader = Cursor::new(buf);
        let read = read_frame(&mut reader, &tables()).await.unwrap();
        assert_eq!(read, frame);
    }

    #[tokio::test]
    async fn test_wrong_marker_rejected() {
        let data = [0u8, 6, 254, 2, 0, 23];
        let mut reader = Cursor::new(data.to_vec());
        let err = read_frame(&mut reader, &tables()).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_wrong_version_rejected() {
        let data = [0u8, 6, 255, 9, 0, 23];
        let mut reader = Cursor::new(data.to_vec());
        let err = read_frame(&mut reader, &tables()).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_undersized_length_rejected() {
        let data = [0u8, 5, 255, 2, 0, 23];
        let mut reader = Cursor::new(data.to_vec());
        let err = read_frame(&mut reader, &tables()).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_closed_mid_frame_is_connection_error() {
        // Header declares 4 payload bytes but only 2 arrive
        let data = [0u8, 10, 255, 2, 0, 7, 1, 2];
        let mut reader = Cursor::new(data.to_vec());
        let err = read_frame(&mut reader, &tables()).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_closed_before_header_is_connection_error() {
        let mut reader = Cursor::new(vec![0u8, 10, 255]);
        let err = read_frame(&mut reader, &tables()).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)), "got {:?}", err);
    }
}
