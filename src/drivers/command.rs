//! Out-of-process tunnel driver.
//!
//! Each provider is driven through its command-line tool. The child is spawned
//! and left to run; a detached task reaps it and logs the exit status.

use std::process::Stdio;

use async_trait::async_trait;

use crate::config;
use crate::core::profile::Provider;
use crate::error::AppError;

use super::{section_label, TunnelCommand, TunnelDriver};

/// Placeholder substituted with the tunnel name in command arguments.
pub const TUNNEL_PLACEHOLDER: &str = "{tunnel}";

/// Placeholder substituted with the OpenVPN Connect section (`PC`/`AS`),
/// empty for other providers.
pub const SECTION_PLACEHOLDER: &str = "{section}";

/// A program plus arguments; any argument may contain [`TUNNEL_PLACEHOLDER`]
/// or [`SECTION_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn render(&self, command: &TunnelCommand) -> Vec<String> {
        let section = section_label(command.provider).unwrap_or("");
        self.args
            .iter()
            .map(|a| {
                a.replace(TUNNEL_PLACEHOLDER, &command.tunnel_name)
                    .replace(SECTION_PLACEHOLDER, section)
            })
            .collect()
    }

    /// True when the command does not name a tunnel, so one invocation
    /// covers every tunnel of the provider.
    pub fn is_provider_wide(&self) -> bool {
        !self.args.iter().any(|a| a.contains(TUNNEL_PLACEHOLDER))
    }
}

#[derive(Debug, Clone)]
pub struct CommandDriver {
    up: CommandTemplate,
    down: CommandTemplate,
}

impl CommandDriver {
    pub fn new(up: CommandTemplate, down: CommandTemplate) -> Self {
        Self { up, down }
    }

    /// Driver using the default command lines from [`config`].
    pub fn for_provider(provider: Provider) -> Self {
        let (up, down) = config::default_provider_commands(provider);
        Self::new(up, down)
    }
}

#[async_trait]
impl TunnelDriver for CommandDriver {
    async fn set_state(&self, command: &TunnelCommand) -> Result<(), AppError> {
        let template = if command.up { &self.up } else { &self.down };
        let args = template.render(command);

        tracing::info!(
            "Set {} tunnel '{}' {}: {} {}",
            command.provider,
            command.tunnel_name,
            if command.up { "up" } else { "down" },
            template.program,
            args.join(" ")
        );

        let mut child = tokio::process::Command::new(&template.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                AppError::ProviderUnavailable(format!(
                    "failed to launch {} for {}: {e}",
                    template.program, command.provider
                ))
            })?;

        let program = template.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::debug!("{program} exited with {status}"),
                Err(e) => tracing::debug!("Failed to wait for {program}: {e}"),
            }
        });

        Ok(())
    }
}
