//! A single NNTP connection (spec §4.2).
//!
//! One connection is exclusive-use: the pool hands it to exactly one
//! caller at a time. Internally it is a line-oriented request/response
//! state machine with two framing modes (single-line and multiline) layered
//! over a TLS-or-plain socket.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsConnector;
use tracing::debug;

use crate::nntp::config::NntpServerConfig;
use crate::nntp::error::NntpError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const SINGLE_LINE_TIMEOUT: Duration = Duration::from_secs(30);
const MULTILINE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Ready,
    Error,
}

pub struct NntpConnection {
    reader: BufReader<Box<dyn AsyncRead + Unpin + Send>>,
    writer: Box<dyn AsyncWrite + Unpin + Send>,
    state: ConnectionState,
    provider: String,
}

impl NntpConnection {
    /// Opens the socket, negotiates TLS if configured, reads the greeting,
    /// and authenticates. Returns a connection in the `Ready` state or an
    /// error; on error the connection must be discarded, never reused.
    pub async fn connect(config: &NntpServerConfig) -> Result<Self, NntpError> {
        let addr = format!("{}:{}", config.host, config.port);

        let tcp = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| NntpError::ConnectionTimeout)??;
        tcp.set_nodelay(true).ok();

        let (reader, writer): (
            Box<dyn AsyncRead + Unpin + Send>,
            Box<dyn AsyncWrite + Unpin + Send>,
        ) = if config.use_ssl {
            let native =
                native_tls::TlsConnector::new().map_err(|e| NntpError::TlsError(e.to_string()))?;
            let connector = TlsConnector::from(native);
            let tls = timeout(CONNECT_TIMEOUT, connector.connect(&config.host, tcp))
                .await
                .map_err(|_| NntpError::ConnectionTimeout)?
                .map_err(|e| NntpError::TlsError(e.to_string()))?;
            let (r, w) = tokio::io::split(tls);
            (Box::new(r), Box::new(w))
        } else {
            let (r, w) = tokio::io::split(tcp);
            (Box::new(r), Box::new(w))
        };

        let mut conn = Self {
            reader: BufReader::new(reader),
            writer,
            state: ConnectionState::Connecting,
            provider: config.name.clone(),
        };

        conn.handshake(config).await?;
        Ok(conn)
    }

    async fn handshake(&mut self, config: &NntpServerConfig) -> Result<(), NntpError> {
        let greeting = self.read_status_line(SINGLE_LINE_TIMEOUT).await?;
        if greeting.code != 200 && greeting.code != 201 {
            self.state = ConnectionState::Error;
            return Err(NntpError::AuthRejected(format!(
                "unexpected greeting {}: {}",
                greeting.code, greeting.message
            )));
        }
        self.state = ConnectionState::Connected;

        if let Some(username) = &config.username {
            self.state = ConnectionState::Authenticating;
            debug!(provider = %self.provider, "sending AUTHINFO USER");
            self.send_command(&format!("AUTHINFO USER {username}")).await?;
            let resp = self.read_status_line(SINGLE_LINE_TIMEOUT).await?;

            if resp.code == 381 {
                let password = config.password.as_deref().unwrap_or("");
                debug!(provider = %self.provider, "sending AUTHINFO PASS (masked)");
                self.send_command(&format!("AUTHINFO PASS {password}")).await?;
                let resp = self.read_status_line(SINGLE_LINE_TIMEOUT).await?;
                if resp.code != 281 {
                    self.state = ConnectionState::Error;
                    return Err(NntpError::AuthRejected(format!(
                        "{}: {}",
                        resp.code, resp.message
                    )));
                }
            } else if resp.code != 281 {
                self.state = ConnectionState::Error;
                return Err(NntpError::AuthRejected(format!(
                    "{}: {}",
                    resp.code, resp.message
                )));
            }
        }

        self.state = ConnectionState::Ready;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// `BODY <message-id>` (spec §6.2). Returns the decoded (dot-unstuffed)
    /// article body with the terminator stripped.
    pub async fn body(&mut self, message_id: &str) -> Result<Vec<u8>, NntpError> {
        self.fetch_multiline("BODY", message_id).await
    }

    /// `ARTICLE <message-id>` — headers + body, same framing as `BODY`.
    pub async fn article(&mut self, message_id: &str) -> Result<Vec<u8>, NntpError> {
        self.fetch_multiline("ARTICLE", message_id).await
    }

    /// `STAT <message-id>`: true if the article exists (223), false if not
    /// (430/420).
    pub async fn stat(&mut self, message_id: &str) -> Result<bool, NntpError> {
        let id = wrap_message_id(message_id);
        self.send_command(&format!("STAT {id}")).await?;
        let resp = self.read_status_line(SINGLE_LINE_TIMEOUT).await?;
        match resp.code {
            223 => Ok(true),
            430 | 420 => Ok(false),
            400 => Err(NntpError::ServiceUnavailable),
            code => Err(NntpError::ProtocolError {
                code,
                message: resp.message,
            }),
        }
    }

    pub async fn quit(&mut self) -> Result<(), NntpError> {
        self.send_command("QUIT").await?;
        let _ = self.read_status_line(SINGLE_LINE_TIMEOUT).await;
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    async fn fetch_multiline(&mut self, verb: &str, message_id: &str) -> Result<Vec<u8>, NntpError> {
        let id = wrap_message_id(message_id);
        self.send_command(&format!("{verb} {id}")).await?;
        let resp = self.read_status_line(SINGLE_LINE_TIMEOUT).await?;

        let expected = if verb == "BODY" { 222 } else { 220 };
        match resp.code {
            code if code == expected => {}
            430 => return Err(NntpError::ArticleNotFound(430)),
            420 => return Err(NntpError::ArticleNotFound(420)),
            400 => return Err(NntpError::ServiceUnavailable),
            code => {
                return Err(NntpError::ProtocolError {
                    code,
                    message: resp.message,
                });
            }
        }

        timeout(MULTILINE_TIMEOUT, self.read_multiline_body())
            .await
            .map_err(|_| NntpError::ConnectionTimeout)?
    }

    /// Reads lines until the lone-dot terminator (`.\r\n`), undoing
    /// dot-stuffing (`..` at line start -> `.`) per RFC 3977.
    async fn read_multiline_body(&mut self) -> Result<Vec<u8>, NntpError> {
        let mut body = Vec::with_capacity(64 * 1024);
        let mut line = Vec::new();

        loop {
            line.clear();
            let n = self.reader.read_until(b'\n', &mut line).await?;
            if n == 0 {
                self.state = ConnectionState::Error;
                return Err(NntpError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-article",
                )));
            }

            if line == b".\r\n" || line == b".\n" {
                break;
            }

            if line.starts_with(b"..") {
                line.remove(0);
            }

            body.extend_from_slice(&line);
        }

        Ok(body)
    }

    async fn send_command(&mut self, command: &str) -> Result<(), NntpError> {
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_status_line(&mut self, budget: Duration) -> Result<StatusLine, NntpError> {
        let mut buf = Vec::new();
        let n = timeout(budget, self.reader.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| NntpError::ConnectionTimeout)??;
        if n == 0 {
            self.state = ConnectionState::Error;
            return Err(NntpError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }

        parse_status_line(&buf)
    }
}

struct StatusLine {
    code: u16,
    message: String,
}

fn parse_status_line(raw: &[u8]) -> Result<StatusLine, NntpError> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_end();
    if trimmed.len() < 3 {
        return Err(NntpError::ProtocolError {
            code: 0,
            message: trimmed.to_string(),
        });
    }
    let (code_str, rest) = trimmed.split_at(3);
    let code: u16 = code_str.parse().map_err(|_| NntpError::ProtocolError {
        code: 0,
        message: trimmed.to_string(),
    })?;
    Ok(StatusLine {
        code,
        message: rest.trim_start().to_string(),
    })
}

fn wrap_message_id(message_id: &str) -> String {
    if message_id.starts_with('<') && message_id.ends_with('>') {
        message_id.to_string()
    } else {
        format!("<{message_id}>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_parses_code_and_message() {
        let line = parse_status_line(b"222 0 article retrieved\r\n").unwrap();
        assert_eq!(line.code, 222);
        assert_eq!(line.message, "0 article retrieved");
    }

    #[test]
    fn wraps_bare_message_ids() {
        assert_eq!(wrap_message_id("abc@example"), "<abc@example>");
        assert_eq!(wrap_message_id("<abc@example>"), "<abc@example>");
    }
}
