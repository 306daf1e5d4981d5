//! Minimal RESP client for redis-compatible servers.
//!
//! Opens one connection per command; the doctor issues a handful of
//! commands per run so pooling is not worth the state.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::{CacheStore, RedisProbe};
use crate::error::{DoctorError, Result};

/// Largest bulk reply accepted from the server.
const MAX_BULK_LEN: usize = 16 * 1024 * 1024;

/// A decoded server reply. Arrays are not needed by any command we send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<String>),
}

#[derive(Debug, Clone)]
pub struct RespClient {
    host: String,
    port: u16,
    password: Option<String>,
}

impl RespClient {
    pub fn new(host: impl Into<String>, port: u16, password: Option<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password,
        }
    }

    /// Send one command and read its reply, authenticating first if needed.
    pub async fn command(&self, args: &[&str]) -> Result<Reply> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                DoctorError::Probe(format!(
                    "cannot connect to redis at {}:{}: {}",
                    self.host, self.port, e
                ))
            })?;
        let mut stream = BufReader::new(stream);

        if let Some(password) = &self.password {
            stream.get_mut().write_all(&encode(&["AUTH", password])).await?;
            if let Reply::Error(e) = read_reply(&mut stream).await? {
                return Err(DoctorError::Probe(format!("redis AUTH failed: {}", e)));
            }
        }

        stream.get_mut().write_all(&encode(args)).await?;
        match read_reply(&mut stream).await? {
            Reply::Error(e) => Err(DoctorError::Probe(format!("redis error: {}", e))),
            reply => Ok(reply),
        }
    }
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(DoctorError::Probe("redis closed the connection".to_string()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub async fn read_reply<R>(reader: &mut R) -> Result<Reply>
where
    R: AsyncBufReadExt + AsyncReadExt + Unpin,
{
    let line = read_line(reader).await?;
    let mut chars = line.chars();
    let kind = chars.next();
    let rest = chars.as_str();
    match kind {
        Some('+') => Ok(Reply::Simple(rest.to_string())),
        Some('-') => Ok(Reply::Error(rest.to_string())),
        Some(':') => rest
            .parse()
            .map(Reply::Integer)
            .map_err(|_| DoctorError::Probe(format!("bad integer reply: {}", rest))),
        Some('$') => {
            let len: i64 = rest
                .parse()
                .map_err(|_| DoctorError::Probe(format!("bad bulk length: {}", rest)))?;
            let Ok(len) = usize::try_from(len) else {
                return Ok(Reply::Bulk(None));
            };
            if len > MAX_BULK_LEN {
                return Err(DoctorError::Probe(format!(
                    "redis bulk reply too large: {} bytes",
                    len
                )));
            }
            let mut buf = vec![0u8; len + 2];
            reader.read_exact(&mut buf).await?;
            buf.truncate(len);
            Ok(Reply::Bulk(Some(String::from_utf8_lossy(&buf).to_string())))
        }
        other => Err(DoctorError::Probe(format!(
            "unexpected redis reply type: {:?}",
            other
        ))),
    }
}

/// Pull `redis_version` out of an `INFO server` reply.
pub fn parse_version(info: &str) -> Option<String> {
    info.lines()
        .find_map(|l| l.strip_prefix("redis_version:"))
        .map(|v| v.trim().to_string())
}

#[async_trait]
impl RedisProbe for RespClient {
    async fn ping(&self) -> Result<String> {
        match self.command(&["PING"]).await? {
            Reply::Simple(s) | Reply::Bulk(Some(s)) => Ok(s),
            other => Err(DoctorError::Probe(format!("unexpected PING reply: {:?}", other))),
        }
    }

    async fn server_version(&self) -> Result<Option<String>> {
        match self.command(&["INFO", "server"]).await? {
            Reply::Bulk(Some(info)) => Ok(parse_version(&info)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl CacheStore for RespClient {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let secs = ttl.as_secs().max(1).to_string();
        self.command(&["SET", key, value, "EX", &secs]).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.command(&["GET", key]).await? {
            Reply::Bulk(value) => Ok(value),
            other => Err(DoctorError::Probe(format!("unexpected GET reply: {:?}", other))),
        }
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.command(&["DEL", key]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_encode_command() {
        assert_eq!(encode(&["GET", "k"]), b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_read_reply_kinds() {
        let raw: &[u8] = b"+PONG\r\n:7\r\n$5\r\nhello\r\n$-1\r\n-ERR nope\r\n";
        let mut reader = BufReader::new(raw);
        assert_eq!(read_reply(&mut reader).await.unwrap(), Reply::Simple("PONG".into()));
        assert_eq!(read_reply(&mut reader).await.unwrap(), Reply::Integer(7));
        assert_eq!(
            read_reply(&mut reader).await.unwrap(),
            Reply::Bulk(Some("hello".into()))
        );
        assert_eq!(read_reply(&mut reader).await.unwrap(), Reply::Bulk(None));
        assert_eq!(
            read_reply(&mut reader).await.unwrap(),
            Reply::Error("ERR nope".into())
        );
    }

    #[tokio::test]
    async fn test_oversized_bulk_length_rejected() {
        let raw: &[u8] = b"$9223372036854775807\r\n";
        let err = read_reply(&mut BufReader::new(raw)).await.unwrap_err();
        assert!(err.to_string().contains("too large"));

        let raw = format!("${}\r\n", MAX_BULK_LEN + 1);
        let err = read_reply(&mut BufReader::new(raw.as_bytes()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_parse_version() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n";
        assert_eq!(parse_version(info).as_deref(), Some("7.2.4"));
        assert_eq!(parse_version("nothing here"), None);
    }

    #[tokio::test]
    async fn test_ping_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"+PONG\r\n").await.unwrap();
        });

        let client = RespClient::new("127.0.0.1", port, None);
        assert_eq!(client.ping().await.unwrap(), "PONG");
    }

    #[tokio::test]
    async fn test_connection_refused_is_probe_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = RespClient::new("127.0.0.1", port, None);
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, DoctorError::Probe(_)));
    }
}
