//! Database engine identity and capability flags.
//!
//! Stream position tracking depends on the backend handing out integers that
//! are never reused and never observed out of order. Which engines qualify is
//! a deployment decision, so the check is a plain flag that config may
//! override rather than a hard-coded engine match at every call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// Backing store engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Postgres,
    Sqlite,
}

impl DatabaseEngine {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseEngine::Postgres => "postgres",
            DatabaseEngine::Sqlite => "sqlite",
        }
    }

    /// Capabilities this engine provides out of the box.
    pub fn capabilities(&self) -> EngineCapabilities {
        match self {
            DatabaseEngine::Postgres => EngineCapabilities {
                monotonic_sequences: true,
            },
            DatabaseEngine::Sqlite => EngineCapabilities {
                monotonic_sequences: false,
            },
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DatabaseEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "psycopg2" => Ok(DatabaseEngine::Postgres),
            "sqlite" | "sqlite3" => Ok(DatabaseEngine::Sqlite),
            other => Err(ConfigError::InvalidValue {
                field: "database_engine".to_string(),
                value: other.to_string(),
                reason: "expected postgres or sqlite".to_string(),
            }),
        }
    }
}

/// Capability flags consulted when constructing stream components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineCapabilities {
    /// Engine allocates stream positions that are unique and observed in order
    /// across concurrent writers.
    pub monotonic_sequences: bool,
}

impl EngineCapabilities {
    /// True when stream positions can be tracked on this engine.
    pub fn supports_stream_positions(&self) -> bool {
        self.monotonic_sequences
    }
}
