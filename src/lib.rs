//! Scripted IMAP conformance harness
//!
//! Drives a real IMAP server through a socket so that scripted
//! client/server exchanges can be replayed against it. The harness
//! provides the pieces a script runner needs:
//!
//! - [`LineSession`] frames the byte stream into protocol lines and
//!   replaces the server's greeting with a fixed banner.
//! - [`HostSystem`] is what a test suite binds to: it opens sessions,
//!   provisions users and resets the server between tests.
//! - [`ExternalHostSystem`] targets a server already listening on a
//!   known port; [`ContainerHostSystem`] starts a fresh container for
//!   every test and discovers its address afterwards.
//! - [`Monitor`] implementations record the conversation.
//!
//! ```no_run
//! use imap_script_harness::{ExternalHostSystem, HostConfig, HostSystem, Transcript};
//! use std::sync::Arc;
//!
//! # async fn run() -> imap_script_harness::Result<()> {
//! let transcript = Transcript::new();
//! let host = ExternalHostSystem::from_config(&HostConfig::from_env()?, Arc::new(transcript.clone()));
//!
//! let mut session = host.new_session().await?;
//! session.start().await?;
//! assert_eq!(session.read_line().await?, "* OK IMAP4rev1 Server ready");
//! session.write_line("a1 NOOP").await?;
//! assert_eq!(session.read_line().await?, "a1 OK NOOP completed");
//! session.stop()?;
//! # Ok(())
//! # }
//! ```

mod address;
mod config;
mod container;
mod docker;
mod error;
mod host;
mod monitor;
mod session;
mod transport;

pub use address::Address;
pub use config::{DockerConfig, HostConfig, IMAP_BANNER};
pub use container::{ContainerBackend, ContainerHostSystem, DEFAULT_TEST_TIMEOUT, LifecycleState};
pub use docker::{ContainerId, DockerCli};
pub use error::{Error, Result};
pub use host::{ExternalHostSystem, HostSystem, UserAdder};
pub use monitor::{Monitor, NullMonitor, TracingMonitor, Transcript, TranscriptEntry};
pub use session::{LineSession, POLL_INTERVAL};
pub use transport::{TcpTransport, Transport};
