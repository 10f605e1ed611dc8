//! In-process fake IMAP server for integration testing
//!
//! ## What a scripted exchange looks like
//!
//! ```text
//!   S: * OK fake.test IMAP4rev1 server ready     <- greeting (banner)
//!   C: a1 CAPABILITY
//!   S: * CAPABILITY IMAP4rev1 LITERAL+ ID
//!   S: a1 OK CAPABILITY completed
//!   C: a2 LOGOUT
//!   S: * BYE IMAP4rev1 Server logging out
//!   S: a2 OK LOGOUT completed
//! ```
//!
//! The greeting is server specific (hostnames, version strings), which
//! is exactly what the harness's banner override hides from scripts.
//!
//! Every line a client sends is recorded byte for byte, so tests can
//! check what actually went over the wire.

use super::handlers::{
    Reply, handle_capability, handle_login, handle_logout, handle_noop, handle_parse_error,
    handle_unknown,
};
use super::io::write_reply;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// How the fake server talks.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub greeting: String,
    /// `"\r\n"` or `"\n"`.
    pub terminator: &'static str,
    /// Split every reply into pieces of this many bytes.
    pub chunk_size: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            greeting: "* OK fake.test IMAP4rev1 server ready".to_string(),
            terminator: "\r\n",
            chunk_size: None,
        }
    }
}

impl ServerOptions {
    pub fn with_greeting(mut self, greeting: &str) -> Self {
        self.greeting = greeting.to_string();
        self
    }

    pub const fn lf_only(mut self) -> Self {
        self.terminator = "\n";
        self
    }

    pub const fn chunked(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }
}

type Users = Arc<Mutex<HashMap<String, String>>>;
type Received = Arc<Mutex<Vec<Vec<u8>>>>;

/// A fake IMAP server on localhost with an OS-assigned port.
///
/// The accept loop is aborted when the server is dropped, so a dropped
/// server refuses new connections.
pub struct FakeImapServer {
    port: u16,
    users: Users,
    received: Received,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Bind to `127.0.0.1:0` and start accepting connections.
    pub async fn start(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let options = Arc::new(options);
        let users = Users::default();
        let received = Received::default();

        let handle = {
            let users = users.clone();
            let received = received.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _addr)) = listener.accept().await else {
                        break;
                    };
                    let options = options.clone();
                    let users = users.clone();
                    let received = received.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, &options, &users, &received).await;
                    });
                }
            })
        };

        Self {
            port,
            users,
            received,
            handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Allow `user` to log in with `password`.
    pub fn add_user(&self, user: &str, password: &str) {
        self.users
            .lock()
            .unwrap()
            .insert(user.to_string(), password.to_string());
    }

    /// Raw bytes of every line received so far, terminators included.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for FakeImapServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Greet the client, then answer commands until LOGOUT or EOF.
async fn handle_connection(
    stream: TcpStream,
    options: &ServerOptions,
    users: &Mutex<HashMap<String, String>>,
    received: &Mutex<Vec<Vec<u8>>>,
) {
    // Chunked replies only reach the client in pieces without Nagle.
    let _ = stream.set_nodelay(true);
    let mut reader = BufReader::new(stream);

    if write_reply(&mut reader, &options.greeting, options.terminator, options.chunk_size)
        .await
        .is_err()
    {
        return;
    }

    let codec = CommandCodec::default();
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        received.lock().unwrap().push(line.clone());

        let raw = String::from_utf8_lossy(&line).trim().to_string();
        if raw.is_empty() {
            continue;
        }

        let reply = match codec.decode(&line) {
            Ok((_, command)) => {
                let tag = command.tag.inner();
                match command.body {
                    CommandBody::Capability => handle_capability(tag),
                    CommandBody::Noop => handle_noop(tag),
                    CommandBody::Login { .. } => {
                        let users = users.lock().unwrap().clone();
                        handle_login(tag, &raw, &users)
                    }
                    CommandBody::Logout => handle_logout(tag),
                    _ => handle_unknown(tag),
                }
            }
            Err(_) => handle_parse_error(&raw),
        };

        if send(&mut reader, options, &reply).await.is_err() || reply.close {
            break;
        }
    }
}

async fn send(
    reader: &mut BufReader<TcpStream>,
    options: &ServerOptions,
    reply: &Reply,
) -> std::io::Result<()> {
    for line in &reply.lines {
        write_reply(reader, line, options.terminator, options.chunk_size).await?;
    }
    Ok(())
}
