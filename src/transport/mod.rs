//! Request/response transport
//!
//! One JSON object per request/response pair over a UNIX-domain socket
//! or TCP. There is no length prefix: the message boundary is the
//! client half-closing its write side, and the server reads until EOF
//! or the configured size ceiling. Connections are accepted and served
//! strictly one at a time on the calling thread; a stalled client
//! blocks the loop until it half-closes or trips the size limit.

pub mod client;

use serde_json::Value;
use std::fs;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

use crate::{EngineError, Result};

const TCP_PREFIX: &str = "tcp://";
const READ_CHUNK: usize = 4096;

/// A bindable or dialable endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Filesystem path of a UNIX-domain socket
    Unix(PathBuf),
    /// `host:port` for TCP
    Tcp(String),
}

impl Endpoint {
    /// `tcp://host:port` selects TCP; anything else is a socket path
    pub fn parse(address: &str) -> Self {
        match address.strip_prefix(TCP_PREFIX) {
            Some(addr) => Endpoint::Tcp(addr.to_string()),
            None => Endpoint::Unix(PathBuf::from(address)),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "{}{}", TCP_PREFIX, addr),
        }
    }
}

/// Serve-loop knobs
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Serve exactly one request and return
    pub once: bool,
    /// Shared secret every request must carry when set
    pub secret: Option<String>,
    /// Read ceiling in bytes; larger requests get an error response
    pub max_request_bytes: usize,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            once: false,
            secret: None,
            max_request_bytes: 1024 * 1024,
        }
    }
}

/// Bind the endpoint and serve requests sequentially.
///
/// Every connection that carries data gets a well-formed response,
/// malformed JSON included; only empty connections are dropped
/// silently. With `once` set the loop returns after the first request
/// that produced a response.
pub fn serve<F>(endpoint: &Endpoint, options: &ServeOptions, mut handler: F) -> Result<()>
where
    F: FnMut(Value) -> Value,
{
    match endpoint {
        Endpoint::Unix(path) => {
            if path.exists() {
                fs::remove_file(path).map_err(|e| {
                    EngineError::Transport(format!("remove stale socket: {}", e))
                })?;
            }
            let listener = UnixListener::bind(path)
                .map_err(|e| EngineError::Transport(format!("bind {}: {}", path.display(), e)))?;
            restrict_socket(path)?;
            log::info!("listening on {}", path.display());

            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if serve_connection(stream, options, &mut handler) && options.once {
                            return Ok(());
                        }
                    }
                    Err(e) => log::warn!("accept failed: {}", e),
                }
            }
        }
        Endpoint::Tcp(addr) => {
            let listener = TcpListener::bind(addr)
                .map_err(|e| EngineError::Transport(format!("bind {}: {}", addr, e)))?;
            log::info!("listening on {}{}", TCP_PREFIX, addr);

            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if serve_connection(stream, options, &mut handler) && options.once {
                            return Ok(());
                        }
                    }
                    Err(e) => log::warn!("accept failed: {}", e),
                }
            }
        }
    }
    Ok(())
}

/// Serve one connection; true when a response was written
fn serve_connection<S, F>(mut stream: S, options: &ServeOptions, handler: &mut F) -> bool
where
    S: Read + Write,
    F: FnMut(Value) -> Value,
{
    let mut data = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                data.extend_from_slice(&chunk[..n]);
                if data.len() > options.max_request_bytes {
                    log::warn!("request exceeded {} bytes, rejecting", options.max_request_bytes);
                    write_response(&mut stream, &EngineError::RequestTooLarge.to_response());
                    return true;
                }
            }
            Err(e) => {
                log::warn!("read failed: {}", e);
                return false;
            }
        }
    }

    // Connected but sent nothing; drop without invoking the handler.
    if data.is_empty() {
        return false;
    }

    let request: Value = match serde_json::from_slice(&data) {
        Ok(request) => request,
        Err(e) => {
            write_response(
                &mut stream,
                &EngineError::Malformed(e.to_string()).to_response(),
            );
            return true;
        }
    };

    if let Some(secret) = &options.secret {
        let supplied = request.get("secret").and_then(Value::as_str);
        if supplied != Some(secret.as_str()) {
            write_response(&mut stream, &EngineError::Unauthorized.to_response());
            return true;
        }
    }

    let response = handler(request);
    write_response(&mut stream, &response);
    true
}

/// Write the response, tolerating a peer that already went away
fn write_response<S: Write>(stream: &mut S, response: &Value) {
    let bytes = match serde_json::to_vec(response) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("response serialization failed: {}", e);
            return;
        }
    };
    if let Err(e) = stream.write_all(&bytes).and_then(|_| stream.flush()) {
        log::debug!("response write failed (peer gone?): {}", e);
    }
}

fn restrict_socket(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| EngineError::Transport(format!("chmod socket: {}", e)))
}

/// Half-close-aware dial helpers shared by the client module
pub(crate) enum ClientStream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl ClientStream {
    pub(crate) fn connect(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Unix(path) => UnixStream::connect(path)
                .map(ClientStream::Unix)
                .map_err(|e| EngineError::Transport(format!("connect {}: {}", path.display(), e))),
            Endpoint::Tcp(addr) => TcpStream::connect(addr)
                .map(ClientStream::Tcp)
                .map_err(|e| EngineError::Transport(format!("connect {}: {}", addr, e))),
        }
    }

    pub(crate) fn finish_write(&mut self) -> std::io::Result<()> {
        match self {
            ClientStream::Unix(s) => s.shutdown(Shutdown::Write),
            ClientStream::Tcp(s) => s.shutdown(Shutdown::Write),
        }
    }
}

impl Read for ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ClientStream::Unix(s) => s.read(buf),
            ClientStream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for ClientStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            ClientStream::Unix(s) => s.write(buf),
            ClientStream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            ClientStream::Unix(s) => s.flush(),
            ClientStream::Tcp(s) => s.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            Endpoint::parse("tcp://127.0.0.1:9000"),
            Endpoint::Tcp("127.0.0.1:9000".to_string())
        );
        assert_eq!(
            Endpoint::parse("/tmp/deimos.sock"),
            Endpoint::Unix(PathBuf::from("/tmp/deimos.sock"))
        );
    }

    #[test]
    fn test_endpoint_display_round_trip() {
        for addr in ["tcp://127.0.0.1:9000", "/tmp/d.sock"] {
            assert_eq!(Endpoint::parse(addr).to_string(), addr);
        }
    }
}
