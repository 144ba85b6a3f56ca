// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;

/// Overture Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one JSON record per invocation
    pub invocation_dir: PathBuf,
    /// Directory where the engine keeps its durable instance state
    pub instance_state_dir: PathBuf,
    /// Orchestration engine executable invoked by the CLI engine adapter
    pub engine_bin: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional (with defaults):
    /// - `OVERTURE_INVOCATION_DIR`: invocation record directory (default: `.overture/invocations`)
    /// - `OVERTURE_INSTANCE_STATE_DIR`: engine instance-state directory (default: `.opera/instances`)
    /// - `OVERTURE_ENGINE_BIN`: engine executable (default: `opera`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let invocation_dir = std::env::var("OVERTURE_INVOCATION_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".overture/invocations"));

        let instance_state_dir = std::env::var("OVERTURE_INSTANCE_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".opera/instances"));

        let engine_bin = match std::env::var("OVERTURE_ENGINE_BIN") {
            Ok(v) if v.trim().is_empty() => {
                return Err(ConfigError::Invalid(
                    "OVERTURE_ENGINE_BIN",
                    "must not be empty",
                ));
            }
            Ok(v) => PathBuf::from(v),
            Err(_) => PathBuf::from("opera"),
        };

        Ok(Self {
            invocation_dir,
            instance_state_dir,
            engine_bin,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("OVERTURE_INVOCATION_DIR");
        guard.remove("OVERTURE_INSTANCE_STATE_DIR");
        guard.remove("OVERTURE_ENGINE_BIN");

        let config = Config::from_env().unwrap();

        assert_eq!(
            config.invocation_dir,
            PathBuf::from(".overture/invocations")
        );
        assert_eq!(
            config.instance_state_dir,
            PathBuf::from(".opera/instances")
        );
        assert_eq!(config.engine_bin, PathBuf::from("opera"));
    }

    #[test]
    fn test_config_custom_dirs() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("OVERTURE_INVOCATION_DIR", "/var/lib/overture/invocations");
        guard.set("OVERTURE_INSTANCE_STATE_DIR", "/var/lib/engine/instances");
        guard.remove("OVERTURE_ENGINE_BIN");

        let config = Config::from_env().unwrap();

        assert_eq!(
            config.invocation_dir,
            PathBuf::from("/var/lib/overture/invocations")
        );
        assert_eq!(
            config.instance_state_dir,
            PathBuf::from("/var/lib/engine/instances")
        );
    }

    #[test]
    fn test_config_custom_engine_bin() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("OVERTURE_ENGINE_BIN", "/usr/local/bin/opera");

        let config = Config::from_env().unwrap();
        assert_eq!(config.engine_bin, PathBuf::from("/usr/local/bin/opera"));
    }

    #[test]
    fn test_config_rejects_empty_engine_bin() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("OVERTURE_ENGINE_BIN", "   ");

        let result = Config::from_env();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("OVERTURE_ENGINE_BIN", _)));
    }

    #[test]
    fn test_config_error_display() {
        let invalid = ConfigError::Invalid("MY_VAR", "must not be empty");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must not be empty"
        );
    }
}
