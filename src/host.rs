//! Host systems: how a test suite reaches the server under test
//!
//! A scripted test only ever asks its [`HostSystem`] for three things:
//! make sure a user exists, open a new session, and reset the server
//! between tests. [`ExternalHostSystem`] does this for a server that is
//! already listening on a known address.

use crate::address::Address;
use crate::config::HostConfig;
use crate::error::Result;
use crate::monitor::Monitor;
use crate::session::LineSession;
use crate::transport::TcpTransport;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// The seam a scripted test suite binds to.
pub trait HostSystem {
    /// Make sure `user` can log in with `password`.
    ///
    /// Returns whether the user is believed to exist afterwards.
    fn add_user(&self, user: &str, password: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Open a fresh connection to the server under test.
    ///
    /// The caller should fail the test on error rather than skip it.
    fn new_session(&self) -> impl Future<Output = Result<LineSession>> + Send;

    /// Ask the server to return to a clean state.
    fn reset(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Creates users on a server that cannot be provisioned over IMAP.
pub trait UserAdder: Send + Sync {
    fn add_user<'a>(&'a self, user: &'a str, password: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Opens sessions with a fixed monitor and banner, and emits the
/// advisory notes shared by every host system.
#[derive(Clone)]
pub(crate) struct SessionOpener {
    monitor: Arc<dyn Monitor>,
    banner: Option<String>,
}

impl SessionOpener {
    pub(crate) fn new(monitor: Arc<dyn Monitor>, banner: Option<String>) -> Self {
        Self { monitor, banner }
    }

    pub(crate) async fn open(&self, address: &Address) -> Result<LineSession> {
        let transport = TcpTransport::connect(address).await?;
        info!("Opened session to {}", address);
        Ok(LineSession::new(
            transport,
            self.monitor.clone(),
            self.banner.clone(),
        ))
    }

    pub(crate) fn advise_user(&self, user: &str, password: &str) {
        self.monitor.note(&format!(
            "Please ensure user '{user}' with password '{password}' exists."
        ));
    }

    pub(crate) fn advise_reset(&self) {
        self.monitor.note("Please reset system.");
    }
}

/// Connects to a server already serving on an open port.
pub struct ExternalHostSystem {
    address: Address,
    opener: SessionOpener,
    user_adder: Option<Arc<dyn UserAdder>>,
}

impl ExternalHostSystem {
    /// Host system for the server at `address`.
    ///
    /// When `banner` is set, it is handed to scripts in place of the
    /// first line each session receives, so they need not match the
    /// server's version string or hostname.
    #[must_use]
    pub fn new(address: Address, monitor: Arc<dyn Monitor>, banner: Option<String>) -> Self {
        Self {
            address,
            opener: SessionOpener::new(monitor, banner),
            user_adder: None,
        }
    }

    #[must_use]
    pub fn from_config(config: &HostConfig, monitor: Arc<dyn Monitor>) -> Self {
        Self::new(
            Address::new(config.host.clone(), config.port),
            monitor,
            config.banner.clone(),
        )
    }

    /// Provision users through `adder` instead of asking the operator.
    #[must_use]
    pub fn with_user_adder(mut self, adder: Arc<dyn UserAdder>) -> Self {
        self.user_adder = Some(adder);
        self
    }

    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }
}

impl HostSystem for ExternalHostSystem {
    async fn add_user(&self, user: &str, password: &str) -> Result<bool> {
        match &self.user_adder {
            Some(adder) => {
                adder.add_user(user, password).await?;
                info!("Provisioned user {}", user);
            }
            None => self.opener.advise_user(user, password),
        }
        Ok(true)
    }

    async fn new_session(&self) -> Result<LineSession> {
        self.opener.open(&self.address).await
    }

    async fn reset(&self) -> Result<()> {
        self.opener.advise_reset();
        Ok(())
    }
}
