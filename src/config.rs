//! Runtime configuration surface (§6, "Configuration surface
//! recognized by the core").
//!
//! Mirrors the teacher's `SystemConfig`: a plain serde-serializable struct
//! with a fluent builder and a `validate()` pass run once before use. Loading
//! from a file or environment is an external collaborator's job; the core
//! only defines the shape and its defaults.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Runtime role, addressed by service-selection (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    Play,
    Api,
}

/// Default peer-selection policy for `send_to_service` / `request_to_service`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    RoundRobin,
    Weighted,
}

impl Default for PolicyKind {
    fn default() -> Self {
        PolicyKind::RoundRobin
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("server_id must not be empty")]
    EmptyServerId,

    #[error("authenticate_message_id must not be empty")]
    EmptyAuthMessageId,

    #[error("min_task_pool_size ({min}) must be <= max_task_pool_size ({max})")]
    InvalidTaskPoolBounds { min: usize, max: usize },

    #[error("max_task_pool_size must be greater than zero")]
    ZeroTaskPoolSize,

    #[error("max_packet_size must be greater than zero")]
    ZeroPacketSize,

    #[error("request_timeout_ms must be greater than zero")]
    ZeroRequestTimeout,
}

/// Full runtime configuration (§6).
///
/// Construct via [`RuntimeConfigBuilder`] or [`RuntimeConfig::default`];
/// always run [`RuntimeConfig::validate`] before handing the config to
/// [`crate::runtime::Runtime::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub server_type: ServerType,
    pub service_id: u16,
    pub server_id: String,
    pub request_timeout_ms: u64,
    pub authenticate_message_id: String,
    pub default_stage_type: Option<String>,
    pub min_task_pool_size: usize,
    pub max_task_pool_size: usize,
    pub max_packet_size: u32,
    pub heartbeat_timeout_ms: u64,
    pub default_selection_policy: PolicyKind,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            server_type: ServerType::Play,
            service_id: 0,
            server_id: "server-0".to_string(),
            request_timeout_ms: 5_000,
            authenticate_message_id: "Authenticate".to_string(),
            default_stage_type: None,
            min_task_pool_size: 2,
            max_task_pool_size: num_cpus_fallback(),
            max_packet_size: 2 * 1024 * 1024,
            heartbeat_timeout_ms: 30_000,
            default_selection_policy: PolicyKind::RoundRobin,
        }
    }
}

/// Conservative fallback when the actual core count is unavailable; the
/// teacher's benches assumed an 8-core box, which is a reasonable default
/// bound for the compute pool absent better information.
fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_id.trim().is_empty() {
            return Err(ConfigError::EmptyServerId);
        }
        if self.authenticate_message_id.trim().is_empty() {
            return Err(ConfigError::EmptyAuthMessageId);
        }
        if self.max_task_pool_size == 0 {
            return Err(ConfigError::ZeroTaskPoolSize);
        }
        if self.min_task_pool_size > self.max_task_pool_size {
            return Err(ConfigError::InvalidTaskPoolBounds {
                min: self.min_task_pool_size,
                max: self.max_task_pool_size,
            });
        }
        if self.max_packet_size == 0 {
            return Err(ConfigError::ZeroPacketSize);
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        Ok(())
    }
}

/// Fluent builder for [`RuntimeConfig`], following the teacher's
/// builder-with-validation shape.
#[derive(Debug)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }
}

impl RuntimeConfigBuilder {
    pub fn server_type(mut self, server_type: ServerType) -> Self {
        self.config.server_type = server_type;
        self
    }

    pub fn service_id(mut self, service_id: u16) -> Self {
        self.config.service_id = service_id;
        self
    }

    pub fn server_id(mut self, server_id: impl Into<String>) -> Self {
        self.config.server_id = server_id.into();
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn authenticate_message_id(mut self, msg_id: impl Into<String>) -> Self {
        self.config.authenticate_message_id = msg_id.into();
        self
    }

    pub fn default_stage_type(mut self, stage_type: impl Into<String>) -> Self {
        self.config.default_stage_type = Some(stage_type.into());
        self
    }

    pub fn task_pool_bounds(mut self, min: usize, max: usize) -> Self {
        self.config.min_task_pool_size = min;
        self.config.max_task_pool_size = max;
        self
    }

    pub fn max_packet_size(mut self, bytes: u32) -> Self {
        self.config.max_packet_size = bytes;
        self
    }

    pub fn heartbeat_timeout_ms(mut self, ms: u64) -> Self {
        self.config.heartbeat_timeout_ms = ms;
        self
    }

    pub fn default_selection_policy(mut self, policy: PolicyKind) -> Self {
        self.config.default_selection_policy = policy;
        self
    }

    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_rejects_empty_server_id() {
        let result = RuntimeConfig::builder().server_id("").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_inverted_pool_bounds() {
        let result = RuntimeConfig::builder().task_pool_bounds(10, 2).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidTaskPoolBounds { min: 10, max: 2 })
        ));
    }

    #[test]
    fn builder_applies_overrides() {
        let config = RuntimeConfig::builder()
            .server_id("play-03")
            .service_id(4)
            .request_timeout_ms(1_000)
            .build()
            .unwrap();
        assert_eq!(config.server_id, "play-03");
        assert_eq!(config.service_id, 4);
        assert_eq!(config.request_timeout(), Duration::from_millis(1_000));
    }
}
