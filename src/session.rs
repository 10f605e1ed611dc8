//! Line-oriented session over a non-blocking transport
//!
//! The session turns the raw byte stream into protocol lines:
//!
//! ```text
//!   bytes in:   "* OK ready\r\na1 NOO" | "P\r\n"
//!   lines out:  "* OK ready", "a1 NOOP"
//! ```
//!
//! A bare LF ends a line and CR is dropped wherever it appears, so both
//! CRLF and LF-only peers are accepted. Outbound lines always end with
//! CRLF.
//!
//! Reads and writes poll the transport and sleep for [`POLL_INTERVAL`]
//! whenever it has nothing to offer. To the caller they behave like
//! blocking calls.

use crate::error::{Error, Result};
use crate::monitor::Monitor;
use crate::transport::{TcpTransport, Transport};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Delay between polls of a transport that has nothing to offer.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

const READ_BUFFER_SIZE: usize = 2048;
const CRLF: &[u8] = b"\r\n";

/// One connection to the server under test.
///
/// Every line sent or received is reported to the monitor as it appears
/// on the wire, before the banner override is applied.
pub struct LineSession<T: Transport = TcpTransport> {
    transport: T,
    monitor: Arc<dyn Monitor>,
    banner: Option<String>,
    first: bool,
    // Survives a dropped read_line future, so no received bytes are lost.
    partial: String,
    buffer: Box<[u8]>,
    pos: usize,
    len: usize,
    open: bool,
}

impl<T: Transport + std::fmt::Debug> std::fmt::Debug for LineSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSession")
            .field("transport", &self.transport)
            .field("banner", &self.banner)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> LineSession<T> {
    /// Wrap a transport.
    ///
    /// When `banner` is set, the first line read is replaced by it.
    #[must_use]
    pub fn new(transport: T, monitor: Arc<dyn Monitor>, banner: Option<String>) -> Self {
        Self {
            transport,
            monitor,
            banner,
            first: true,
            partial: String::new(),
            buffer: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            len: 0,
            open: true,
        }
    }

    /// Wait for the connection handshake to complete.
    ///
    /// There is no timeout; a hung handshake blocks until the caller
    /// gives up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the handshake fails.
    pub async fn start(&mut self) -> Result<()> {
        loop {
            match self.transport.finish_connect() {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    self.monitor.note("connecting...");
                    sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(Error::Connection(format!("Handshake failed: {e}"))),
            }
        }
    }

    /// Read the next line, without its terminator.
    ///
    /// Cancel-safe: if the future is dropped part way through a line, the
    /// bytes already received are kept for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the connection fails or closes
    /// before the line is complete.
    pub async fn read_line(&mut self) -> Result<String> {
        let line = self.read_raw_line().await?;
        self.monitor.note(&format!("<- {line}"));

        if self.first {
            self.first = false;
            if let Some(banner) = &self.banner {
                return Ok(banner.clone());
            }
        }
        Ok(line)
    }

    /// Send `line` followed by CRLF.
    ///
    /// Characters outside US-ASCII are sent as `?`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the connection fails before every
    /// byte is written.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.monitor.note(&format!("-> {line}"));

        let mut bytes = encode_ascii(line);
        bytes.extend_from_slice(CRLF);

        let mut written = 0;
        while written < bytes.len() {
            match self.transport.try_write(&bytes[written..]) {
                Ok(0) => {
                    return Err(Error::Transport(
                        "Connection closed while writing".to_string(),
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => sleep(POLL_INTERVAL).await,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Transport(format!("Write failed: {e}"))),
            }
        }
        Ok(())
    }

    /// Close the connection. The session cannot be used afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport fails to close.
    pub fn stop(mut self) -> Result<()> {
        self.monitor.note("closing");
        self.open = false;
        self.transport
            .close()
            .map_err(|e| Error::Transport(format!("Close failed: {e}")))
    }

    async fn read_raw_line(&mut self) -> Result<String> {
        loop {
            while self.pos < self.len {
                let byte = self.buffer[self.pos];
                self.pos += 1;
                match byte {
                    b'\n' => return Ok(std::mem::take(&mut self.partial)),
                    b'\r' => {}
                    other => self.partial.push(char::from(other)),
                }
            }
            self.fill_buffer().await?;
        }
    }

    /// Refill the exhausted receive buffer with at least one byte.
    async fn fill_buffer(&mut self) -> Result<()> {
        self.pos = 0;
        self.len = 0;
        loop {
            match self.transport.try_read(&mut self.buffer) {
                Ok(0) => {
                    return Err(Error::Transport(
                        "Connection closed before end of line".to_string(),
                    ));
                }
                Ok(n) => {
                    self.len = n;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => sleep(POLL_INTERVAL).await,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Transport(format!("Read failed: {e}"))),
            }
        }
    }
}

impl<T: Transport> Drop for LineSession<T> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.transport.close();
        }
    }
}

fn encode_ascii(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| u8::try_from(c).ok().filter(u8::is_ascii).unwrap_or(b'?'))
        .collect()
}
