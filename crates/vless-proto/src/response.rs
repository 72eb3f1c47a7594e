//! Response header: `VERSION(1) | ADDONS_LEN(1) | ADDONS(ADDONS_LEN)`.
//!
//! The addons bytes are reserved and always skipped, so that proxied data
//! following the header stays aligned.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{ParseResult, ProtoError, VERSION};

/// Parses a response header, returning the number of bytes it occupies.
#[inline]
pub fn parse_response(buf: &[u8]) -> ParseResult<usize> {
    let Some(&version) = buf.first() else {
        return ParseResult::Incomplete(1);
    };
    if version != VERSION {
        return ParseResult::Invalid(ProtoError::UnsupportedVersion(version));
    }
    let Some(&addons) = buf.get(1) else {
        return ParseResult::Incomplete(2);
    };
    let total = 2 + addons as usize;
    if buf.len() < total {
        return ParseResult::Incomplete(total);
    }
    ParseResult::Complete(total)
}

/// Errors from reading a response directly off a stream.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),
}

/// Reads and validates a response header, consuming exactly its bytes.
pub async fn read_response<R>(reader: &mut R) -> Result<(), ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await.map_err(truncated)?;
    if header[0] != VERSION {
        return Err(ProtoError::UnsupportedVersion(header[0]).into());
    }
    let addons = header[1] as u64;
    if addons > 0 {
        let skipped = tokio::io::copy(&mut reader.take(addons), &mut tokio::io::sink()).await?;
        if skipped != addons {
            return Err(ProtoError::Truncated.into());
        }
    }
    Ok(())
}

fn truncated(err: std::io::Error) -> ReadError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ReadError::Protocol(ProtoError::Truncated)
    } else {
        ReadError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, duplex};

    #[test]
    fn parse_incremental() {
        assert_eq!(parse_response(&[]), ParseResult::Incomplete(1));
        assert_eq!(parse_response(&[0]), ParseResult::Incomplete(2));
        assert_eq!(parse_response(&[0, 3, 1]), ParseResult::Incomplete(5));
        assert_eq!(parse_response(&[0, 3, 1, 2, 3, b'x']), ParseResult::Complete(5));
        assert_eq!(parse_response(&[0, 0, b'x']), ParseResult::Complete(2));
        assert_eq!(
            parse_response(&[9, 0]),
            ParseResult::Invalid(ProtoError::UnsupportedVersion(9))
        );
    }

    #[tokio::test]
    async fn read_skips_addons_exactly() {
        let (mut server, mut client) = duplex(64);
        server.write_all(&[0, 3, 0xaa, 0xbb, 0xcc, b'n', b'e', b'x', b't']).await.unwrap();
        drop(server);

        read_response(&mut client).await.unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"next");
    }

    #[tokio::test]
    async fn read_reports_truncation() {
        let (mut server, mut client) = duplex(64);
        server.write_all(&[0, 4, 1]).await.unwrap();
        drop(server);

        let err = read_response(&mut client).await.unwrap_err();
        assert!(matches!(err, ReadError::Protocol(ProtoError::Truncated)));

        let (mut server, mut client) = duplex(64);
        server.write_all(&[0]).await.unwrap();
        drop(server);
        let err = read_response(&mut client).await.unwrap_err();
        assert!(matches!(err, ReadError::Protocol(ProtoError::Truncated)));
    }

    #[tokio::test]
    async fn read_rejects_version() {
        let (mut server, mut client) = duplex(64);
        server.write_all(&[1, 0]).await.unwrap();
        let err = read_response(&mut client).await.unwrap_err();
        assert!(matches!(
            err,
            ReadError::Protocol(ProtoError::UnsupportedVersion(1))
        ));
    }
}
