//! Host system for a server started fresh for every test
//!
//! The server under test runs in an external container whose address is
//! only known once it has started:
//!
//! ```text
//!   Idle --before_test--> Starting --started--> Running
//!     ^                      |                     |
//!     +------ start failed --+                after_test
//!     |                                            v
//!     +----------------- stopped/failed ------- Stopping
//! ```
//!
//! The harness owns the container handle for the whole time it runs.
//! Collaborators that need it (for instance to provision users) borrow
//! it through [`ContainerHostSystem::container`].

use crate::address::Address;
use crate::error::{Error, Result};
use crate::host::{HostSystem, SessionOpener};
use crate::monitor::Monitor;
use crate::session::LineSession;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Starts and stops server containers.
pub trait ContainerBackend: Send + Sync {
    type Handle: fmt::Debug + Send + Sync;

    /// Launch a new server instance.
    fn start(&self) -> impl Future<Output = Result<Self::Handle>> + Send;

    /// Stop and remove an instance.
    fn stop(&self, handle: &Self::Handle) -> impl Future<Output = Result<()>> + Send;

    /// Host on which the instance can be reached.
    fn host_of(&self, handle: &Self::Handle) -> impl Future<Output = Result<String>> + Send;

    /// Host port the instance's IMAP listener is published on.
    fn port_of(&self, handle: &Self::Handle) -> impl Future<Output = Result<u16>> + Send;

    /// Create a user inside the instance.
    ///
    /// Returns `Ok(false)` when the backend cannot provision users.
    fn add_user(
        &self,
        _handle: &Self::Handle,
        _user: &str,
        _password: &str,
    ) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(false) }
    }
}

/// Where a [`ContainerHostSystem`] is in its start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Longest a test run by [`ContainerHostSystem::run_test`] may take
/// unless overridden with [`ContainerHostSystem::with_test_timeout`].
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs each test against its own container.
pub struct ContainerHostSystem<B: ContainerBackend> {
    backend: B,
    state: LifecycleState,
    // Set while Running, and kept while Stopping so an interrupted stop
    // can be finished by the next before_test.
    handle: Option<B::Handle>,
    opener: SessionOpener,
    test_timeout: Duration,
}

impl<B: ContainerBackend> ContainerHostSystem<B> {
    #[must_use]
    pub fn new(backend: B, monitor: Arc<dyn Monitor>, banner: Option<String>) -> Self {
        Self {
            backend,
            state: LifecycleState::Idle,
            handle: None,
            opener: SessionOpener::new(monitor, banner),
            test_timeout: DEFAULT_TEST_TIMEOUT,
        }
    }

    /// Limit how long a test body may run inside
    /// [`run_test`](Self::run_test).
    #[must_use]
    pub const fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// The running container, if any.
    #[must_use]
    pub const fn container(&self) -> Option<&B::Handle> {
        match self.state {
            LifecycleState::Running => self.handle.as_ref(),
            _ => None,
        }
    }

    /// Start the container for the next test.
    ///
    /// A container left behind by a test that was never torn down (for
    /// instance because an outer timeout dropped it) is stopped first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] if the container fails to start. The
    /// harness is back to idle in that case.
    pub async fn before_test(&mut self) -> Result<()> {
        self.reclaim().await;

        self.state = LifecycleState::Starting;
        match self.backend.start().await {
            Ok(handle) => {
                info!("Started container {:?}", handle);
                self.handle = Some(handle);
                self.state = LifecycleState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Idle;
                Err(lifecycle_error("Failed to start container", e))
            }
        }
    }

    /// Stop the container started by [`before_test`](Self::before_test).
    ///
    /// The harness is idle afterwards even if stopping fails, so the
    /// next test can start a fresh container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] if the container fails to stop, or
    /// [`Error::Programming`] if no container is running.
    pub async fn after_test(&mut self) -> Result<()> {
        let handle = match (self.state, self.handle.as_ref()) {
            (LifecycleState::Running, Some(handle)) => handle,
            _ => {
                return Err(Error::Programming(format!(
                    "after_test called while {:?}",
                    self.state
                )));
            }
        };

        self.state = LifecycleState::Stopping;
        let result = match self.backend.stop(handle).await {
            Ok(()) => {
                info!("Stopped container {:?}", handle);
                Ok(())
            }
            Err(e) => Err(lifecycle_error(
                &format!("Failed to stop container {handle:?}"),
                e,
            )),
        };
        self.handle = None;
        self.state = LifecycleState::Idle;
        result
    }

    /// Current address of the running container.
    ///
    /// Looked up from the backend on every call; published ports are
    /// only stable while the container runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Programming`] outside `before_test`/`after_test`,
    /// or the backend's error if the lookup fails.
    pub async fn address(&self) -> Result<Address> {
        let handle = self.running("address requested")?;
        let host = self.backend.host_of(handle).await?;
        let port = self.backend.port_of(handle).await?;
        Ok(Address::new(host, port))
    }

    /// Run one test against a fresh container.
    ///
    /// The container is stopped whatever the test does, including
    /// panicking or running past the test timeout; a panic is resumed
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns the test's error, [`Error::Timeout`] if the test did not
    /// finish in time, otherwise any lifecycle error.
    pub async fn run_test<T, F>(&mut self, test: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a Self) -> BoxFuture<'a, Result<T>> + Send,
    {
        self.before_test().await?;
        let limit = self.test_timeout;
        let outcome = AssertUnwindSafe(timeout(limit, test(&*self)))
            .catch_unwind()
            .await
            .map(|finished| {
                finished.unwrap_or_else(|_| {
                    Err(Error::Timeout(format!("Test did not finish within {limit:?}")))
                })
            });
        let teardown = self.after_test().await;

        match outcome {
            Err(payload) => {
                if let Err(e) = teardown {
                    warn!("Teardown after panicked test failed: {}", e);
                }
                panic::resume_unwind(payload)
            }
            Ok(Err(e)) => {
                if let Err(teardown_err) = teardown {
                    warn!("Teardown after failed test failed: {}", teardown_err);
                }
                Err(e)
            }
            Ok(Ok(value)) => teardown.map(|()| value),
        }
    }

    /// Stop whatever an interrupted test left behind and return to idle.
    async fn reclaim(&mut self) {
        if let Some(handle) = &self.handle {
            warn!(
                "Container {:?} was left {:?} by an earlier test; stopping it",
                handle, self.state
            );
            if let Err(e) = self.backend.stop(handle).await {
                warn!("Failed to stop leftover container {:?}: {}", handle, e);
            }
        } else if self.state != LifecycleState::Idle {
            warn!("An earlier container start was interrupted while {:?}", self.state);
        }
        self.handle = None;
        self.state = LifecycleState::Idle;
    }

    fn running(&self, what: &str) -> Result<&B::Handle> {
        self.container().ok_or_else(|| {
            Error::Programming(format!(
                "{what} while {:?}; only valid between before_test and after_test",
                self.state
            ))
        })
    }
}

/// Add context to a backend failure without nesting lifecycle errors.
fn lifecycle_error(context: &str, error: Error) -> Error {
    match error {
        Error::Lifecycle(msg) => Error::Lifecycle(format!("{context}: {msg}")),
        other => Error::Lifecycle(format!("{context}: {other}")),
    }
}

impl<B: ContainerBackend> HostSystem for ContainerHostSystem<B> {
    async fn add_user(&self, user: &str, password: &str) -> Result<bool> {
        let handle = self.running("add_user called")?;
        if self.backend.add_user(handle, user, password).await? {
            info!("Provisioned user {} in {:?}", user, handle);
        } else {
            self.opener.advise_user(user, password);
        }
        Ok(true)
    }

    async fn new_session(&self) -> Result<LineSession> {
        let address = self.address().await?;
        self.opener.open(&address).await
    }

    async fn reset(&self) -> Result<()> {
        self.opener.advise_reset();
        Ok(())
    }
}
