//! Message framing over stdio.
//!
//! MCP stdio servers exchange newline-delimited JSON. `Content-Length` framed
//! messages are accepted too, and replies use whichever framing the last
//! request arrived in.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::io::{Stdin, Stdout};

use crate::error::Result;

/// Upper bound for one message, in either framing.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// How messages are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON document per line.
    Lines,
    /// `Content-Length: <n>\r\n\r\n<body>`.
    ContentLength,
}

/// One frame read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A complete message body.
    Message(String),
    /// A frame that could not be decoded. The stream stays usable.
    Malformed(String),
}

enum Line {
    Bytes(Vec<u8>),
    TooLong,
}

/// Reads and writes framed JSON-RPC messages.
pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
    framing: Framing,
}

impl StdioTransport<BufReader<Stdin>, Stdout> {
    /// Transport over the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a transport over arbitrary streams.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            framing: Framing::Lines,
        }
    }

    /// The framing used for the next reply.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Read the next frame. Returns `None` on EOF.
    ///
    /// Undecodable input comes back as [`Incoming::Malformed`]; only I/O
    /// failures are errors.
    pub async fn read_message(&mut self) -> Result<Option<Incoming>> {
        loop {
            let bytes = match self.read_line().await? {
                None => return Ok(None),
                Some(Line::TooLong) => {
                    self.framing = Framing::Lines;
                    return Ok(Some(too_long(None)));
                }
                Some(Line::Bytes(bytes)) => bytes,
            };

            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    self.framing = Framing::Lines;
                    return Ok(Some(Incoming::Malformed(format!(
                        "message is not UTF-8: {}",
                        e.utf8_error()
                    ))));
                }
            };

            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
                self.framing = Framing::ContentLength;
                let length = len_str.trim().parse::<usize>();
                if !self.skip_headers().await? {
                    return Ok(None);
                }
                return self.read_body(length, trimmed).await;
            }

            self.framing = Framing::Lines;
            return Ok(Some(Incoming::Message(trimmed.to_string())));
        }
    }

    /// Write one message body using the current framing.
    pub async fn write_message(&mut self, body: &str) -> Result<()> {
        match self.framing {
            Framing::Lines => {
                self.writer.write_all(body.as_bytes()).await?;
                self.writer.write_all(b"\n").await?;
            }
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", body.len());
                self.writer.write_all(header.as_bytes()).await?;
                self.writer.write_all(body.as_bytes()).await?;
            }
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_body(
        &mut self,
        length: std::result::Result<usize, std::num::ParseIntError>,
        header: &str,
    ) -> Result<Option<Incoming>> {
        let Ok(length) = length else {
            return Ok(Some(Incoming::Malformed(format!(
                "invalid Content-Length header: {}",
                header
            ))));
        };

        if length > MAX_MESSAGE_BYTES {
            let mut body = (&mut self.reader).take(length as u64);
            tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
            return Ok(Some(too_long(Some(length))));
        }

        let mut body = vec![0u8; length];
        match self.reader.read_exact(&mut body).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        Ok(Some(match String::from_utf8(body) {
            Ok(body) => Incoming::Message(body),
            Err(e) => Incoming::Malformed(format!("message is not UTF-8: {}", e.utf8_error())),
        }))
    }

    /// Read one line of at most [`MAX_MESSAGE_BYTES`]. A longer line is
    /// consumed and reported as [`Line::TooLong`].
    async fn read_line(&mut self) -> Result<Option<Line>> {
        let limit = MAX_MESSAGE_BYTES as u64 + 1;
        let mut buf = Vec::new();
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }
        if buf.len() as u64 == limit && buf.last() != Some(&b'\n') {
            self.discard_line().await?;
            return Ok(Some(Line::TooLong));
        }
        Ok(Some(Line::Bytes(buf)))
    }

    async fn discard_line(&mut self) -> Result<()> {
        loop {
            let (consumed, done) = {
                let buf = self.reader.fill_buf().await?;
                if buf.is_empty() {
                    return Ok(());
                }
                match buf.iter().position(|b| *b == b'\n') {
                    Some(i) => (i + 1, true),
                    None => (buf.len(), false),
                }
            };
            self.reader.consume(consumed);
            if done {
                return Ok(());
            }
        }
    }

    /// Skip the remaining headers. Returns `false` if the stream ended first.
    async fn skip_headers(&mut self) -> Result<bool> {
        loop {
            match self.read_line().await? {
                None => return Ok(false),
                Some(Line::Bytes(line)) if line.iter().all(u8::is_ascii_whitespace) => {
                    return Ok(true);
                }
                Some(_) => {}
            }
        }
    }
}

fn too_long(length: Option<usize>) -> Incoming {
    let detail = match length {
        Some(length) => format!("message of {} bytes", length),
        None => "message".to_string(),
    };
    Incoming::Malformed(format!(
        "{} exceeds limit of {} bytes",
        detail, MAX_MESSAGE_BYTES
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(input: &[u8]) -> StdioTransport<&[u8], Vec<u8>> {
        StdioTransport::new(input, Vec::new())
    }

    fn message(body: &str) -> Option<Incoming> {
        Some(Incoming::Message(body.to_string()))
    }

    fn is_malformed(frame: Option<Incoming>) -> bool {
        matches!(frame, Some(Incoming::Malformed(_)))
    }

    #[tokio::test]
    async fn test_reads_newline_delimited() {
        let mut t = transport(b"{\"a\":1}\n\n{\"b\":2}\n");
        assert_eq!(t.read_message().await.unwrap(), message("{\"a\":1}"));
        assert_eq!(t.read_message().await.unwrap(), message("{\"b\":2}"));
        assert_eq!(t.read_message().await.unwrap(), None);
        assert_eq!(t.framing(), Framing::Lines);
    }

    #[tokio::test]
    async fn test_reads_content_length_framed() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let input = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let mut t = transport(input.as_bytes());
        assert_eq!(t.read_message().await.unwrap(), message(body));
        assert_eq!(t.framing(), Framing::ContentLength);
        assert_eq!(t.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reply_uses_request_framing() {
        let body = "{}";
        let input = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        let mut t = transport(input.as_bytes());
        t.read_message().await.unwrap();
        t.write_message("{\"ok\":true}").await.unwrap();
        assert_eq!(
            String::from_utf8(t.writer.clone()).unwrap(),
            "Content-Length: 11\r\n\r\n{\"ok\":true}"
        );

        let mut t = transport(b"{}\n");
        t.read_message().await.unwrap();
        t.write_message("{}").await.unwrap();
        assert_eq!(String::from_utf8(t.writer.clone()).unwrap(), "{}\n");
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_recoverable() {
        let mut t = transport(b"\xff\xfe garbage\n{\"ok\":1}\n");
        assert!(is_malformed(t.read_message().await.unwrap()));
        assert_eq!(t.read_message().await.unwrap(), message("{\"ok\":1}"));
    }

    #[tokio::test]
    async fn test_bad_headers_are_recoverable() {
        let mut t = transport(b"Content-Length: lots\r\n\r\n{}\n");
        assert!(is_malformed(t.read_message().await.unwrap()));
        assert_eq!(t.read_message().await.unwrap(), message("{}"));

        let mut t = transport(b"Content-Length: 2\r\n\r\n\xff\xfe{\"next\":1}\n");
        assert!(is_malformed(t.read_message().await.unwrap()));
        assert_eq!(t.read_message().await.unwrap(), message("{\"next\":1}"));
    }

    #[tokio::test]
    async fn test_oversized_frames_are_skipped() {
        let mut input = format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_BYTES + 1).into_bytes();
        input.extend(std::iter::repeat_n(b'x', MAX_MESSAGE_BYTES + 1));
        input.extend(std::iter::repeat_n(b'y', MAX_MESSAGE_BYTES + 10));
        input.extend(b"\n{\"after\":1}\n");

        let mut t = transport(&input);
        assert!(is_malformed(t.read_message().await.unwrap()));
        assert!(is_malformed(t.read_message().await.unwrap()));
        assert_eq!(t.read_message().await.unwrap(), message("{\"after\":1}"));
        assert_eq!(t.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_eof_inside_frame_ends_stream() {
        let mut t = transport(b"Content-Length: 2\r\n");
        assert_eq!(t.read_message().await.unwrap(), None);

        let mut t = transport(b"Content-Length: 10\r\n\r\n{}");
        assert_eq!(t.read_message().await.unwrap(), None);
    }
}
