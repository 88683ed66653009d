// low-level stdio framing: Content-Length headers and raw read/write
use crate::error::{ClientError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Write a single framed message (Content-Length header + JSON body) to an
/// async writer.
pub async fn write_message_to<W>(writer: &mut W, json_body: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let header = format!("Content-Length: {}\r\n\r\n", json_body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(json_body.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a single framed message from an async reader, returning the JSON body
/// with the header stripped.
pub async fn read_message_from<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin + Send,
{
    let mut header_buffer = Vec::new();

    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).await?;
        header_buffer.push(byte[0]);
        if header_buffer.ends_with(b"\r\n\r\n") {
            break;
        }
    }

    let header_str = String::from_utf8(header_buffer)
        .map_err(|e| ClientError::Protocol(format!("non-utf8 header: {e}")))?;
    let content_length = get_content_length_from(&header_str)?;
    let mut payload_buffer = vec![0u8; content_length];
    reader.read_exact(&mut payload_buffer).await?;

    String::from_utf8(payload_buffer)
        .map_err(|e| ClientError::Protocol(format!("non-utf8 payload: {e}")))
}

/// Extract Content-Length from header string. Case-insensitive search.
pub(crate) fn get_content_length_from(header: &str) -> Result<usize> {
    for line in header.lines() {
        if line.to_lowercase().starts_with("content-length:") {
            if let Some(v) = line.split(':').nth(1) {
                let parsed = v
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| ClientError::Protocol(format!("bad Content-Length: {e}")))?;
                return Ok(parsed);
            }
        }
    }
    Err(ClientError::Protocol(
        "Content-Length header not found".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::{get_content_length_from, read_message_from, write_message_to};
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn test_round_trip_preserves_body() {
        let (mut host, mut server) = duplex(1024);
        let body = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;

        write_message_to(&mut host, body).await.unwrap();

        assert_eq!(read_message_from(&mut server).await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_reads_back_to_back_messages() {
        let (mut host, mut server) = duplex(1024);

        write_message_to(&mut host, r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .await
            .unwrap();
        write_message_to(&mut host, r#"{"jsonrpc":"2.0","method":"exit","params":null}"#)
            .await
            .unwrap();

        let first = read_message_from(&mut server).await.unwrap();
        assert!(first.contains("\"id\":1"));
        let second = read_message_from(&mut server).await.unwrap();
        assert!(second.contains("\"exit\""));
    }

    #[tokio::test]
    async fn test_extra_headers_are_tolerated() {
        let (mut host, mut server) = duplex(256);

        host.write_all(
            b"Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: 2\r\n\r\n{}",
        )
        .await
        .unwrap();
        host.flush().await.unwrap();

        assert_eq!(read_message_from(&mut server).await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_rejects_unparseable_content_length() {
        let (mut host, mut server) = duplex(64);

        host.write_all(b"Content-Length: many\r\n\r\n").await.unwrap();
        host.flush().await.unwrap();

        assert!(read_message_from(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn test_eof_before_header_is_error() {
        let (host, mut server) = duplex(64);
        drop(host);

        assert!(read_message_from(&mut server).await.is_err());
    }

    #[test]
    fn test_content_length_case_insensitive() {
        assert_eq!(get_content_length_from("content-length: 42\r\n\r\n").unwrap(), 42);
    }

    #[test]
    fn test_content_length_missing() {
        assert!(get_content_length_from("Content-Type: text/plain\r\n\r\n").is_err());
    }
}
