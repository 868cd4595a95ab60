pub mod types;

use crate::host::ChromotingHost;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use types::HostConfig;

/// Maximum config file size (1 MB)
const MAX_CONFIG_SIZE: u64 = 1_048_576;

/// Longest session limit accepted from configuration (30 days).
pub const MAX_SESSION_DURATION_LIMIT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Configuration printed by `default-config`.
pub const DEFAULT_CONFIG: &str = r#"[host]
# Account the host is registered to.
owner_email = "owner@example.com"
# Curtain the local console while a client is connected.
require_curtain = false
# Disconnect clients after this many seconds. 0 = unlimited.
max_session_duration_secs = 0
protocols = ["ice", "webrtc"]

[logging]
level = "info"
format = "pretty"

[audit]
# log_path = "/var/log/chromoting-host/audit.jsonl"

[metrics]
enabled = false
"#;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host.owner_email must not be empty")]
    MissingOwnerEmail,
    #[error("host.owner_email must be an email address (got '{0}')")]
    InvalidOwnerEmail(String),
    #[error("host.max_session_duration_secs must be <= {max} (got {got})")]
    SessionDurationTooLong { got: u64, max: u64 },
    #[error("host.protocols must list at least one transport")]
    NoProtocols,
}

/// Load and validate configuration from a TOML file
pub fn load_config(path: &Path) -> Result<HostConfig> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("reading config metadata: {}", path.display()))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        anyhow::bail!(
            "config file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        );
    }

    check_config_file_permissions(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    parse_config(&content)
}

/// On Unix, warn if the config file is writable by group or others,
/// since it controls who may take over the desktop.
#[cfg(unix)]
fn check_config_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode();
            if mode & 0o022 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    mode = format!("{:04o}", mode & 0o7777),
                    "Config file is writable by group/others. \
                     Consider restricting permissions to 0644 or tighter."
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not check config file permissions"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_config_file_permissions(_path: &Path) {}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<HostConfig> {
    let config: HostConfig = toml::from_str(content).context("parsing TOML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values
pub fn validate_config(config: &HostConfig) -> Result<(), ConfigError> {
    validate_owner(config)?;
    validate_session_duration(config)?;
    validate_protocols(config)?;
    Ok(())
}

fn validate_owner(config: &HostConfig) -> Result<(), ConfigError> {
    let email = config.host.owner_email.trim();
    if email.is_empty() {
        return Err(ConfigError::MissingOwnerEmail);
    }
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidOwnerEmail(email.to_string())),
    }
}

fn validate_session_duration(config: &HostConfig) -> Result<(), ConfigError> {
    let max = MAX_SESSION_DURATION_LIMIT.as_secs();
    if config.host.max_session_duration_secs > max {
        return Err(ConfigError::SessionDurationTooLong {
            got: config.host.max_session_duration_secs,
            max,
        });
    }
    Ok(())
}

fn validate_protocols(config: &HostConfig) -> Result<(), ConfigError> {
    if config.host.protocols.is_empty() {
        return Err(ConfigError::NoProtocols);
    }
    Ok(())
}

impl HostConfig {
    /// Push the session policy into a host.
    pub fn apply_to(&self, host: &ChromotingHost) {
        host.set_enable_curtaining(self.host.require_curtain);
        host.set_maximum_session_duration(self.host.max_session_duration());
        host.set_allowed_protocols(&self.host.protocols);
    }
}
