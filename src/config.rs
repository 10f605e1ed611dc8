//! Harness configuration
//!
//! Both configurations can be loaded from the environment (and a `.env`
//! file, if present) or built directly with the `with_*` methods.

use crate::error::{Error, Result};
use std::env;

/// Greeting substituted for the first server line by default.
pub const IMAP_BANNER: &str = "* OK IMAP4rev1 Server ready";

/// Target of a server that is already running on a known port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
    /// Replacement for the first line the server sends. `None` passes
    /// the real greeting through.
    pub banner: Option<String>,
}

impl HostConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            banner: Some(IMAP_BANNER.to_string()),
        }
    }

    /// Replace the banner override.
    #[must_use]
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    /// Pass the server's own greeting through unmodified.
    #[must_use]
    pub fn without_banner(mut self) -> Self {
        self.banner = None;
        self
    }

    /// Load the target from environment variables
    ///
    /// Reads from `.env` file if present. All variables are optional:
    /// - `IMAP_HOST` (default: `127.0.0.1`)
    /// - `IMAP_PORT` (default: `143`)
    /// - `IMAP_BANNER` (default: `* OK IMAP4rev1 Server ready`, empty
    ///   disables the substitution)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `IMAP_PORT` is not a valid port.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup("IMAP_PORT")
            .unwrap_or_else(|| "143".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?;

        Ok(Self {
            host: lookup("IMAP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            banner: banner_from(lookup("IMAP_BANNER")),
        })
    }
}

/// Settings for launching the server under test as a docker container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerConfig {
    /// Program and leading arguments used to invoke docker, e.g.
    /// `["sudo", "docker"]`.
    pub docker_command: Vec<String>,
    pub image: String,
    /// Port the IMAP listener uses inside the container.
    pub imap_port: u16,
    /// Host on which published container ports are reachable.
    pub host: String,
    /// Shell command run inside the container to create a user, with
    /// `{user}` and `{password}` placeholders. Values are substituted
    /// already quoted, so the placeholders must not be quoted again.
    pub add_user_command: Option<String>,
    pub banner: Option<String>,
}

impl DockerConfig {
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            docker_command: vec!["docker".to_string()],
            image: image.into(),
            imap_port: 143,
            host: "127.0.0.1".to_string(),
            add_user_command: None,
            banner: Some(IMAP_BANNER.to_string()),
        }
    }

    #[must_use]
    pub fn with_docker_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.docker_command = command.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_imap_port(mut self, port: u16) -> Self {
        self.imap_port = port;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_add_user_command(mut self, command: impl Into<String>) -> Self {
        self.add_user_command = Some(command.into());
        self
    }

    #[must_use]
    pub fn with_banner(mut self, banner: Option<String>) -> Self {
        self.banner = banner;
        self
    }

    /// Load the container settings from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_CONTAINER_IMAGE`
    ///
    /// Optional (with defaults):
    /// - `DOCKER_BIN` (default: `docker`, split on whitespace)
    /// - `IMAP_CONTAINER_PORT` (default: `143`)
    /// - `DOCKER_HOST` (a `tcp://` address selects the host published
    ///   ports are reached on, default: `127.0.0.1`)
    /// - `IMAP_CONTAINER_ADD_USER` (no default)
    /// - `IMAP_BANNER` (same meaning as for [`HostConfig`])
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the image is missing or the port is
    /// invalid.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let image = lookup("IMAP_CONTAINER_IMAGE")
            .ok_or_else(|| Error::Config("IMAP_CONTAINER_IMAGE not set".into()))?;
        let imap_port = lookup("IMAP_CONTAINER_PORT")
            .unwrap_or_else(|| "143".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("Invalid IMAP_CONTAINER_PORT: {e}")))?;

        Ok(Self {
            docker_command: lookup("DOCKER_BIN")
                .map(|bin| bin.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                .filter(|command| !command.is_empty())
                .unwrap_or_else(|| vec!["docker".to_string()]),
            image,
            imap_port,
            host: lookup("DOCKER_HOST")
                .and_then(|h| docker_host_name(&h))
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            add_user_command: lookup("IMAP_CONTAINER_ADD_USER").filter(|c| !c.is_empty()),
            banner: banner_from(lookup("IMAP_BANNER")),
        })
    }
}

fn banner_from(value: Option<String>) -> Option<String> {
    match value {
        Some(b) if b.is_empty() => None,
        Some(b) => Some(b),
        None => Some(IMAP_BANNER.to_string()),
    }
}

/// Host part of a `tcp://host:port` docker daemon address.
fn docker_host_name(docker_host: &str) -> Option<String> {
    let rest = docker_host.strip_prefix("tcp://")?;
    let authority = rest.split('/').next().unwrap_or(rest);
    let host = authority.strip_prefix('[').map_or_else(
        || authority.rsplit_once(':').map_or(authority, |(host, _port)| host),
        |bracketed| bracketed.split_once(']').map_or(bracketed, |(host, _port)| host),
    );
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
