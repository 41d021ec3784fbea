//! Manager configuration.

use serde::{Deserialize, Serialize};

use crate::domain::CavalcadeError;

/// What the worker loop does when a task (or its callback) fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Emit an error record and keep draining.
    #[default]
    Report,

    /// End the loop with the error. Anything still queued is abandoned.
    Propagate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Used in log records and as the loop thread's name.
    pub name: String,

    pub failure_policy: FailurePolicy,

    /// Treat Ctrl-C as a stop request.
    pub handle_interrupt: bool,
}

impl ManagerConfig {
    pub const DEFAULT_NAME: &'static str = "cavalcade";

    pub fn from_json_str(s: &str) -> Result<Self, CavalcadeError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// The name becomes the loop thread's name, which cannot hold NUL bytes.
    pub fn validate(&self) -> Result<(), CavalcadeError> {
        if self.name.contains('\0') {
            return Err(CavalcadeError::InvalidConfig(format!(
                "name {:?} contains a NUL byte",
                self.name
            )));
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_interrupt_handling(mut self, enabled: bool) -> Self {
        self.handle_interrupt = enabled;
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            failure_policy: FailurePolicy::Report,
            handle_interrupt: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reports_failures() {
        let config = ManagerConfig::default();
        assert_eq!(config.name, "cavalcade");
        assert_eq!(config.failure_policy, FailurePolicy::Report);
        assert!(!config.handle_interrupt);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = ManagerConfig::from_json_str(r#"{"failure_policy": "propagate"}"#).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Propagate);
        assert_eq!(config.name, "cavalcade");
    }

    #[test]
    fn nul_in_name_is_rejected() {
        let err = ManagerConfig::from_json_str(r#"{"name": "a\u0000b"}"#).unwrap_err();
        assert!(matches!(err, CavalcadeError::InvalidConfig(_)));
        assert!(ManagerConfig::default().with_name("a\0b").validate().is_err());
    }

    #[test]
    fn bad_json_is_a_config_error() {
        let err = ManagerConfig::from_json_str(r#"{"failure_policy": "explode"}"#).unwrap_err();
        assert!(matches!(err, CavalcadeError::Config(_)));
    }
}
