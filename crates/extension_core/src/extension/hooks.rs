//! Host-supplied collaborators invoked by the environment.
//!
//! The environment decides whether and when these run; how they run belongs to
//! the host application.

use crate::extension::manifest::ExtensionDescriptor;
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::process::Command;

/// Event published after an extension starts, suffixed with `: <name>`.
pub const EVENT_STARTED: &str = "extension.started";
/// Event published for every started extension on shutdown.
pub const EVENT_DONE: &str = "extension.done";

/// Builds the full lifecycle event name for one extension.
pub fn lifecycle_event(kind: &str, name: &str) -> String {
    format!("{kind}: {name}")
}

/// Runs an extension's bootstrap script.
pub trait BootstrapHook {
    fn run(&self, descriptor: &ExtensionDescriptor, script: &Path) -> Result<(), CollaboratorError>;
}

/// Receives lifecycle events synchronously, in publish order.
pub trait EventSink {
    fn publish(
        &self,
        event: &str,
        descriptor: &ExtensionDescriptor,
    ) -> Result<(), CollaboratorError>;
}

/// Registers the services aggregated across every started extension.
pub trait ServiceRegistrar {
    fn register_services(&self, services: &[String]) -> Result<(), CollaboratorError>;
}

/// Bootstrap hook that ignores scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBootstrapHook;

impl BootstrapHook for NoopBootstrapHook {
    fn run(&self, descriptor: &ExtensionDescriptor, script: &Path) -> Result<(), CollaboratorError> {
        debug!(
            "event=bootstrap_skip module=hooks status=skip name={} script={}",
            descriptor.name,
            script.display()
        );
        Ok(())
    }
}

/// Runs bootstrap scripts through `sh`, blocking until they exit.
///
/// The script sees `EXTENSION_NAME` and `EXTENSION_PATH` in its environment.
#[derive(Debug, Clone)]
pub struct ShellBootstrapHook {
    shell: String,
}

impl ShellBootstrapHook {
    pub fn new() -> Self {
        Self::with_shell("sh")
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellBootstrapHook {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapHook for ShellBootstrapHook {
    fn run(&self, descriptor: &ExtensionDescriptor, script: &Path) -> Result<(), CollaboratorError> {
        let status = Command::new(&self.shell)
            .arg(script)
            .current_dir(&descriptor.path)
            .env("EXTENSION_NAME", &descriptor.name)
            .env("EXTENSION_PATH", &descriptor.path)
            .status()
            .map_err(|err| {
                CollaboratorError::new(
                    "bootstrap",
                    format!("failed to spawn `{}`: {err}", self.shell),
                )
            })?;

        if !status.success() {
            return Err(CollaboratorError::new(
                "bootstrap",
                format!("{} exited with {status}", script.display()),
            ));
        }
        Ok(())
    }
}

/// Event sink that writes lifecycle events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(
        &self,
        event: &str,
        descriptor: &ExtensionDescriptor,
    ) -> Result<(), CollaboratorError> {
        info!(
            "event=lifecycle module=hooks status=ok lifecycle_event=\"{}\" path={}",
            event,
            descriptor.path.display()
        );
        Ok(())
    }
}

/// Service registrar that only records the aggregated list in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogServiceRegistrar;

impl ServiceRegistrar for LogServiceRegistrar {
    fn register_services(&self, services: &[String]) -> Result<(), CollaboratorError> {
        info!(
            "event=register_services module=hooks status=ok count={}",
            services.len()
        );
        for service in services {
            debug!("event=register_service module=hooks status=ok service={service}");
        }
        Ok(())
    }
}

/// Failure reported by a host collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorError {
    /// Collaborator role, e.g. `bootstrap`, `events`, `services`.
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

impl Display for CollaboratorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} collaborator failed: {}", self.collaborator, self.message)
    }
}

impl Error for CollaboratorError {}

#[cfg(test)]
mod tests {
    use super::{lifecycle_event, BootstrapHook, ShellBootstrapHook, EVENT_DONE, EVENT_STARTED};
    use crate::extension::manifest::ExtensionDescriptor;

    #[test]
    fn formats_lifecycle_event_names() {
        assert_eq!(
            lifecycle_event(EVENT_STARTED, "acme/widgets"),
            "extension.started: acme/widgets"
        );
        assert_eq!(lifecycle_event(EVENT_DONE, "app"), "extension.done: app");
    }

    #[cfg(unix)]
    #[test]
    fn shell_hook_runs_script_with_extension_environment() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("boot.sh");
        let marker = dir.path().join("marker");
        std::fs::write(
            &script,
            format!("printf '%s' \"$EXTENSION_NAME\" > '{}'\n", marker.display()),
        )
        .unwrap();

        let descriptor =
            ExtensionDescriptor::from_manifest("acme/widgets", dir.path(), b"{}").unwrap();
        ShellBootstrapHook::new()
            .run(&descriptor, &script)
            .expect("script should succeed");
        assert_eq!(std::fs::read_to_string(marker).unwrap(), "acme/widgets");
    }

    #[cfg(unix)]
    #[test]
    fn shell_hook_reports_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("boot.sh");
        std::fs::write(&script, "exit 3\n").unwrap();

        let descriptor =
            ExtensionDescriptor::from_manifest("acme/widgets", dir.path(), b"{}").unwrap();
        let err = ShellBootstrapHook::new()
            .run(&descriptor, &script)
            .expect_err("non-zero exit must fail");
        assert_eq!(err.collaborator, "bootstrap");
    }
}
