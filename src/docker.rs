//! Container backend driving the `docker` command line

use crate::config::DockerConfig;
use crate::container::{ContainerBackend, ContainerHostSystem};
use crate::error::{Error, Result};
use crate::monitor::Monitor;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Id of a container started by [`DockerCli`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerId(String);

impl ContainerId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Starts one container per test with `docker run -d -P`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    config: DockerConfig,
}

impl DockerCli {
    #[must_use]
    pub const fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &DockerConfig {
        &self.config
    }

    /// Run a docker subcommand and return its standard output.
    async fn docker(&self, args: &[&str]) -> Result<String> {
        let (program, prefix) = self
            .config
            .docker_command
            .split_first()
            .ok_or_else(|| Error::Config("Empty docker command".into()))?;
        debug!("Running {} {}", self.config.docker_command.join(" "), args.join(" "));

        let output = Command::new(program)
            .args(prefix)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Lifecycle(format!("Failed to run {program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Lifecycle(format!(
                "docker {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ContainerBackend for DockerCli {
    type Handle = ContainerId;

    async fn start(&self) -> Result<ContainerId> {
        let stdout = self.docker(&["run", "-d", "-P", self.config.image.as_str()]).await?;
        let id = stdout.trim();
        if id.is_empty() {
            return Err(Error::Lifecycle(format!(
                "docker run {} printed no container id",
                self.config.image
            )));
        }
        Ok(ContainerId(id.to_string()))
    }

    async fn stop(&self, handle: &ContainerId) -> Result<()> {
        self.docker(&["rm", "-f", handle.as_str()]).await?;
        Ok(())
    }

    async fn host_of(&self, _handle: &ContainerId) -> Result<String> {
        Ok(self.config.host.clone())
    }

    async fn port_of(&self, handle: &ContainerId) -> Result<u16> {
        let port = format!("{}/tcp", self.config.imap_port);
        let stdout = self.docker(&["port", handle.as_str(), port.as_str()]).await?;
        parse_published_port(&stdout).ok_or_else(|| {
            Error::Lifecycle(format!(
                "Container {} does not publish {port}: {:?}",
                handle.as_str(),
                stdout.trim()
            ))
        })
    }

    async fn add_user(&self, handle: &ContainerId, user: &str, password: &str) -> Result<bool> {
        let Some(template) = &self.config.add_user_command else {
            return Ok(false);
        };
        let command = template
            .replace("{user}", &shell_quote(user))
            .replace("{password}", &shell_quote(password));
        self.docker(&["exec", handle.as_str(), "sh", "-c", command.as_str()])
            .await?;
        Ok(true)
    }
}

impl ContainerHostSystem<DockerCli> {
    /// Host system that runs every test against a fresh container of
    /// `config.image`.
    #[must_use]
    pub fn docker(config: DockerConfig, monitor: Arc<dyn Monitor>) -> Self {
        let banner = config.banner.clone();
        Self::new(DockerCli::new(config), monitor, banner)
    }
}

/// Host port from `docker port` output such as `0.0.0.0:49153`.
///
/// Docker prints one mapping per line (IPv4 and IPv6); the first one
/// wins.
fn parse_published_port(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
        .filter(|port| *port > 0)
}

/// Quote `value` as a single `sh` word.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
