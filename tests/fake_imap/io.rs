//! Reply writer for the fake IMAP server.
//!
//! Every write is flushed immediately. In chunked mode each reply line
//! is split into pieces with a short pause between them, so the client
//! sees lines arrive across several reads.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

const CHUNK_PAUSE: Duration = Duration::from_millis(2);

/// Write one reply line with `terminator`, optionally in chunks of
/// `chunk_size` bytes.
pub async fn write_reply<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
    terminator: &str,
    chunk_size: Option<usize>,
) -> std::io::Result<()> {
    let data = format!("{line}{terminator}");
    match chunk_size {
        None => write_bytes(stream, data.as_bytes()).await,
        Some(size) => {
            for chunk in data.as_bytes().chunks(size.max(1)) {
                write_bytes(stream, chunk).await?;
                tokio::time::sleep(CHUNK_PAUSE).await;
            }
            Ok(())
        }
    }
}

async fn write_bytes<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    data: &[u8],
) -> std::io::Result<()> {
    stream.get_mut().write_all(data).await?;
    stream.get_mut().flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn run(line: &str, terminator: &str, chunk_size: Option<usize>) -> Vec<u8> {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        write_reply(&mut stream, line, terminator, chunk_size)
            .await
            .unwrap();
        drop(stream);

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn appends_terminator() {
        assert_eq!(run("* OK", "\r\n", None).await, b"* OK\r\n");
        assert_eq!(run("* OK", "\n", None).await, b"* OK\n");
    }

    #[tokio::test]
    async fn chunked_reply_is_complete() {
        assert_eq!(run("a1 OK NOOP completed", "\r\n", Some(3)).await, b"a1 OK NOOP completed\r\n");
    }
}
