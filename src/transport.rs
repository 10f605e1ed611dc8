//! Byte channel underneath a [`LineSession`](crate::LineSession)
//!
//! All operations are non-blocking: "nothing to do yet" is reported as
//! [`io::ErrorKind::WouldBlock`] and the session decides how to wait.

use crate::address::Address;
use crate::error::{Error, Result};
use std::io;
use tokio::net::TcpStream;
use tracing::debug;

/// A non-blocking, connection-oriented byte channel.
pub trait Transport: Send {
    /// Whether the connection handshake has completed.
    ///
    /// # Errors
    ///
    /// Returns the error that made the handshake fail.
    fn finish_connect(&mut self) -> io::Result<bool>;

    /// Read whatever is available into `buf`.
    ///
    /// `Ok(0)` means the peer closed the connection; `WouldBlock`
    /// means no data has arrived yet.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when nothing is available, or the I/O error
    /// that broke the connection.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much of `buf` as the channel accepts right now.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when the channel is full, or the I/O error
    /// that broke the connection.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Release the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying channel fails to close.
    fn close(&mut self) -> io::Result<()>;
}

/// TCP connection to the server under test.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Open a TCP connection to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the server cannot be reached.
    pub async fn connect(address: &Address) -> Result<Self> {
        debug!("Connecting to IMAP server at {}", address);

        let stream = TcpStream::connect((address.host.as_str(), address.port))
            .await
            .map_err(|e| Error::Connection(format!("Failed to connect to {address}: {e}")))?;
        Ok(Self::from_stream(stream))
    }

    #[must_use]
    pub const fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    fn stream(&self) -> io::Result<&TcpStream> {
        self.stream
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport closed"))
    }
}

impl Transport for TcpTransport {
    fn finish_connect(&mut self) -> io::Result<bool> {
        let stream = self.stream()?;
        if let Some(err) = stream.take_error()? {
            return Err(err);
        }
        match stream.peer_addr() {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.try_read(buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.try_write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the stream closes the socket.
        self.stream.take();
        Ok(())
    }
}
