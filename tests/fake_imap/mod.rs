//! Fake IMAP server for integration testing
//!
//! An in-process server that plays the part of the system under test.
//! It speaks just enough IMAP for scripted exchanges:
//!
//! TCP -> greeting -> CAPABILITY / NOOP / LOGIN -> LOGOUT
//!
//! How it talks can be varied per test: the greeting text, the line
//! terminator (CRLF or bare LF) and whether replies are dribbled out in
//! small chunks.
//!
//! ## Module layout
//!
//! - `server` -- TCP listener, per-connection loop, recorded traffic
//! - `handlers` -- one responder per IMAP command
//! - `io` -- reply writer (whole or chunked)
#![allow(dead_code)]

mod io;
mod server;

pub use server::{FakeImapServer, ServerOptions};

/// Route `tracing` output through the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
