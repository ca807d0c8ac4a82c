//! Replication configuration
//!
//! Loaded from environment variables with defaults suitable for a Postgres
//! deployment. Everything the stream components need at construction time
//! lives here so process wiring stays a single `from_env()` call.

use crate::{ConfigError, DatabaseEngine, EngineCapabilities};

/// Default table holding the caches stream.
pub const DEFAULT_CACHE_STREAM_TABLE: &str = "cache_invalidation_stream";

/// Default position column of the caches stream table.
pub const DEFAULT_CACHE_STREAM_COLUMN: &str = "stream_id";

/// Default number of rows per catch-up batch.
pub const DEFAULT_CATCH_UP_BATCH_SIZE: usize = 100;

/// Configuration for cache stream replication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Backing store engine.
    pub database_engine: DatabaseEngine,

    /// Explicit override of the engine's sequence capability.
    /// `None` means use whatever the engine reports.
    pub monotonic_sequences: Option<bool>,

    /// Table the caches stream is persisted in.
    pub cache_stream_table: String,

    /// Position column within `cache_stream_table`.
    pub cache_stream_column: String,

    /// Maximum rows per batch when catching up from a stored stream.
    pub catch_up_batch_size: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            database_engine: DatabaseEngine::Postgres,
            monotonic_sequences: None,
            cache_stream_table: DEFAULT_CACHE_STREAM_TABLE.to_string(),
            cache_stream_column: DEFAULT_CACHE_STREAM_COLUMN.to_string(),
            catch_up_batch_size: DEFAULT_CATCH_UP_BATCH_SIZE,
        }
    }
}

impl ReplicationConfig {
    /// Create ReplicationConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CACHEWIRE_DATABASE_ENGINE`: "postgres" or "sqlite" (default: postgres)
    /// - `CACHEWIRE_MONOTONIC_SEQUENCES`: "true"/"false" override (default: engine decides)
    /// - `CACHEWIRE_CACHE_STREAM_TABLE`: stream table (default: cache_invalidation_stream)
    /// - `CACHEWIRE_CACHE_STREAM_COLUMN`: position column (default: stream_id)
    /// - `CACHEWIRE_CATCH_UP_BATCH_SIZE`: rows per catch-up batch (default: 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_engine = match lookup("CACHEWIRE_DATABASE_ENGINE") {
            Some(value) => value.parse()?,
            None => defaults.database_engine,
        };

        let monotonic_sequences = match lookup("CACHEWIRE_MONOTONIC_SEQUENCES") {
            Some(value) => Some(parse_bool("CACHEWIRE_MONOTONIC_SEQUENCES", &value)?),
            None => None,
        };

        let cache_stream_table = lookup("CACHEWIRE_CACHE_STREAM_TABLE")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.cache_stream_table);

        let cache_stream_column = lookup("CACHEWIRE_CACHE_STREAM_COLUMN")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.cache_stream_column);

        let catch_up_batch_size = match lookup("CACHEWIRE_CATCH_UP_BATCH_SIZE") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "CACHEWIRE_CATCH_UP_BATCH_SIZE".to_string(),
                value: value.clone(),
                reason: "must be a positive integer".to_string(),
            })?,
            None => defaults.catch_up_batch_size,
        };

        let config = Self {
            database_engine,
            monotonic_sequences,
            cache_stream_table,
            cache_stream_column,
            catch_up_batch_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the stream components cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_stream_table.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "cache_stream_table".to_string(),
            });
        }
        if self.cache_stream_column.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "cache_stream_column".to_string(),
            });
        }
        if self.catch_up_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "catch_up_batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Effective capabilities after applying the override.
    pub fn capabilities(&self) -> EngineCapabilities {
        let mut caps = self.database_engine.capabilities();
        if let Some(flag) = self.monotonic_sequences {
            caps.monotonic_sequences = flag;
        }
        caps
    }

    /// Set the backing engine.
    pub fn with_engine(mut self, engine: DatabaseEngine) -> Self {
        self.database_engine = engine;
        self
    }

    /// Override the engine's sequence capability.
    pub fn with_monotonic_sequences(mut self, enabled: bool) -> Self {
        self.monotonic_sequences = Some(enabled);
        self
    }

    /// Set the stream table and its position column.
    pub fn with_stream_table(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.cache_stream_table = table.into();
        self.cache_stream_column = column.into();
        self
    }

    /// Set the catch-up batch size.
    pub fn with_catch_up_batch_size(mut self, size: usize) -> Self {
        self.catch_up_batch_size = size;
        self
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ReplicationConfig::from_vars(lookup_from(&[])).expect("defaults are valid");
        assert_eq!(config, ReplicationConfig::default());
        assert!(config.capabilities().supports_stream_positions());
    }

    #[test]
    fn test_sqlite_lacks_stream_positions() {
        let config =
            ReplicationConfig::from_vars(lookup_from(&[("CACHEWIRE_DATABASE_ENGINE", "sqlite")]))
                .expect("sqlite config");
        assert_eq!(config.database_engine, DatabaseEngine::Sqlite);
        assert!(!config.capabilities().supports_stream_positions());
    }

    #[test]
    fn test_capability_override() {
        let config = ReplicationConfig::from_vars(lookup_from(&[
            ("CACHEWIRE_DATABASE_ENGINE", "sqlite"),
            ("CACHEWIRE_MONOTONIC_SEQUENCES", "true"),
        ]))
        .expect("override config");
        assert!(config.capabilities().supports_stream_positions());

        let disabled = ReplicationConfig::default().with_monotonic_sequences(false);
        assert!(!disabled.capabilities().supports_stream_positions());
    }

    #[test]
    fn test_invalid_batch_size_rejected() {
        let err = ReplicationConfig::from_vars(lookup_from(&[(
            "CACHEWIRE_CATCH_UP_BATCH_SIZE",
            "lots",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let zero = ReplicationConfig::default().with_catch_up_batch_size(0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_empty_table_rejected() {
        let err = ReplicationConfig::from_vars(lookup_from(&[("CACHEWIRE_CACHE_STREAM_TABLE", "  ")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "cache_stream_table".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let err =
            ReplicationConfig::from_vars(lookup_from(&[("CACHEWIRE_DATABASE_ENGINE", "oracle")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
