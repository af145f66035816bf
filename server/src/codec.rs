//! JSON-RPC framing over byte streams.
//!
//! The protocol frames each message as `Content-Length: N\r\n\r\n{json}`.
//! [`MessageReader`] and [`MessageWriter`] handle the framing; bodies are
//! decoded to `serde_json::Value` and classified elsewhere. Both sides are
//! generic over the stream so tests can drive an in-memory duplex instead
//! of stdin/stdout.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Cap on a single frame body (16 MiB). Formatter output for any realistic
/// document fits comfortably; anything larger is a framing error.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Reads framed JSON-RPC messages from an async byte stream.
pub struct MessageReader<R> {
    input: BufReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: BufReader::new(input),
        }
    }

    /// Read the next frame.
    ///
    /// `Ok(None)` means the peer closed the stream between frames. EOF in
    /// the middle of a frame, a missing or unparseable `Content-Length`,
    /// an oversized body, or invalid JSON are all errors.
    pub async fn recv(&mut self) -> Result<Option<serde_json::Value>> {
        let Some(length) = self.read_content_length().await? else {
            return Ok(None);
        };
        if length > MAX_BODY_BYTES {
            bail!("frame body of {length} bytes exceeds the {MAX_BODY_BYTES} byte limit");
        }

        let mut body = vec![0u8; length];
        self.input
            .read_exact(&mut body)
            .await
            .context("frame body truncated")?;

        let value = serde_json::from_slice(&body).context("frame body is not valid JSON")?;
        Ok(Some(value))
    }

    /// Consume header lines up to the blank separator and return the
    /// `Content-Length` value, or `None` on EOF before any header byte.
    async fn read_content_length(&mut self) -> Result<Option<usize>> {
        let mut length: Option<usize> = None;
        let mut line = String::new();
        let mut at_frame_start = true;

        loop {
            line.clear();
            let n = self
                .input
                .read_line(&mut line)
                .await
                .context("reading frame header")?;

            if n == 0 {
                // Clean shutdown only if nothing of this frame was read yet.
                if at_frame_start {
                    return Ok(None);
                }
                bail!("stream ended inside frame headers");
            }
            at_frame_start = false;

            let header = line.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                break;
            }
            if let Some(value) = header_field(header, "Content-Length") {
                length = Some(value.parse().context("unparseable Content-Length value")?);
            }
            // Content-Type and any other headers are irrelevant here.
        }

        match length {
            Some(length) => Ok(Some(length)),
            None => bail!("frame headers carried no Content-Length"),
        }
    }
}

/// Case-insensitive `Name: value` header match.
fn header_field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = line.split_once(':')?;
    key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
}

/// Writes framed JSON-RPC messages to an async byte stream.
pub struct MessageWriter<W> {
    output: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    /// Serialize `frame`, prepend the `Content-Length` header, and flush.
    pub async fn send(&mut self, frame: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(frame).context("serializing frame body")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.output
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.output
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.output.flush().await.context("flushing frame")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_one(bytes: &[u8]) -> Result<Option<serde_json::Value>> {
        MessageReader::new(bytes).recv().await
    }

    #[tokio::test]
    async fn roundtrip() {
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": { "uri": "file:///demo.qll", "diagnostics": [] }
        });

        let mut buf = Vec::new();
        MessageWriter::new(&mut buf).send(&frame).await.unwrap();

        let decoded = read_one(&buf).await.unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn sequential_frames() {
        let first = serde_json::json!({"jsonrpc": "2.0", "id": 1});
        let second = serde_json::json!({"jsonrpc": "2.0", "id": 2});

        let mut buf = Vec::new();
        let mut writer = MessageWriter::new(&mut buf);
        writer.send(&first).await.unwrap();
        writer.send(&second).await.unwrap();

        let mut reader = MessageReader::new(buf.as_slice());
        assert_eq!(reader.recv().await.unwrap().unwrap(), first);
        assert_eq!(reader.recv().await.unwrap().unwrap(), second);
        assert!(reader.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_between_frames_is_clean() {
        assert!(read_one(b"").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_headers_is_error() {
        assert!(read_one(b"Content-Length: 10\r\n").await.is_err());
    }

    #[tokio::test]
    async fn eof_inside_body_is_error() {
        assert!(read_one(b"Content-Length: 50\r\n\r\n{\"id\"").await.is_err());
    }

    #[tokio::test]
    async fn missing_content_length_is_error() {
        let bytes = b"Content-Type: application/vscode-jsonrpc\r\n\r\n{}";
        assert!(read_one(bytes).await.is_err());
    }

    #[tokio::test]
    async fn unparseable_content_length_is_error() {
        assert!(read_one(b"Content-Length: many\r\n\r\n{}").await.is_err());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let bytes = format!("Content-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1);
        assert!(read_one(bytes.as_bytes()).await.is_err());
    }

    #[tokio::test]
    async fn header_name_is_case_insensitive() {
        let body = r#"{"jsonrpc":"2.0","id":7}"#;
        let bytes = format!("content-length: {}\r\n\r\n{body}", body.len());
        let decoded = read_one(bytes.as_bytes()).await.unwrap().unwrap();
        assert_eq!(decoded["id"], 7);
    }

    #[tokio::test]
    async fn unknown_headers_are_skipped() {
        let body = r#"{"jsonrpc":"2.0","id":7}"#;
        let bytes = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let decoded = read_one(bytes.as_bytes()).await.unwrap().unwrap();
        assert_eq!(decoded["id"], 7);
    }

    #[tokio::test]
    async fn invalid_json_body_is_error() {
        let body = b"}{ not json";
        let bytes = format!("Content-Length: {}\r\n\r\n", body.len());
        let mut buf = bytes.into_bytes();
        buf.extend_from_slice(body);
        assert!(read_one(&buf).await.is_err());
    }

    #[tokio::test]
    async fn content_length_counts_bytes_not_chars() {
        // "é" is two bytes in UTF-8; the header must reflect byte length.
        let frame = serde_json::json!({"k": "é"});
        let mut buf = Vec::new();
        MessageWriter::new(&mut buf).send(&frame).await.unwrap();

        let body = serde_json::to_string(&frame).unwrap();
        let rendered = String::from_utf8(buf.clone()).unwrap();
        assert!(rendered.starts_with(&format!("Content-Length: {}\r\n\r\n", body.len())));

        let decoded = read_one(&buf).await.unwrap().unwrap();
        assert_eq!(decoded["k"], "é");
    }
}
