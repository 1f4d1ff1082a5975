//! RON configuration.
//!
//! ```ron
//! (
//!     root_command: "Start",
//!     store: Sqlite(path: "telenav.db"),
//!     log_filter: Some("telenav_session=debug,info"),
//!     titles: { "NEXT": "Next ▶" },
//! )
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::localize::StaticLocalizer;
use crate::store::{MemoryStore, SqliteStore, StateStore, StoreError};

/// Where blocks, pages and state live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreConfig {
    #[default]
    Memory,
    Sqlite {
        path: PathBuf,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelenavConfig {
    /// Tag of the command that receives unresolvable input.
    pub root_command: String,
    pub store: StoreConfig,
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub log_filter: Option<String>,
    /// Button titles by title id, layered over the system defaults.
    pub titles: HashMap<String, String>,
}

impl Default for TelenavConfig {
    fn default() -> Self {
        Self {
            root_command: "Start".to_string(),
            store: StoreConfig::Memory,
            log_filter: None,
            titles: HashMap::new(),
        }
    }
}

impl TelenavConfig {
    /// Load from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn with_root_command(mut self, tag: impl Into<String>) -> Self {
        self.root_command = tag.into();
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    pub fn with_title(mut self, title_id: impl Into<String>, title: impl Into<String>) -> Self {
        self.titles.insert(title_id.into(), title.into());
        self
    }

    /// Open the configured store backend.
    pub fn open_store(&self) -> Result<Arc<dyn StateStore>, ConfigError> {
        Ok(match &self.store {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::Sqlite { path } => Arc::new(SqliteStore::open(path)?),
        })
    }

    /// System defaults plus the configured titles.
    pub fn localizer(&self) -> StaticLocalizer {
        let mut localizer = StaticLocalizer::with_system_defaults();
        localizer.extend(self.titles.clone());
        localizer
    }
}

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localize::Localizer;

    #[test]
    fn test_parse_full() {
        let config = TelenavConfig::from_ron_str(
            r#"(
                root_command: "Menu",
                store: Sqlite(path: "/tmp/bot.db"),
                log_filter: Some("debug"),
                titles: { "NEXT": "Next ▶" },
            )"#,
        )
        .unwrap();

        assert_eq!(config.root_command, "Menu");
        assert_eq!(config.store, StoreConfig::Sqlite { path: "/tmp/bot.db".into() });
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        let localizer = config.localizer();
        assert_eq!(localizer.title("NEXT"), "Next ▶");
        assert_eq!(localizer.title("_GO_BACK"), "« Back");
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = TelenavConfig::from_ron_str("(root_command: \"Home\")").unwrap();
        assert_eq!(config, TelenavConfig::default().with_root_command("Home"));
    }

    #[test]
    fn test_bad_ron_is_an_error() {
        assert!(matches!(
            TelenavConfig::from_ron_str("(root_command: 5"),
            Err(ConfigError::Ron(_))
        ));
    }

    #[test]
    fn test_open_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = TelenavConfig::default().with_store(StoreConfig::Sqlite {
            path: dir.path().join("state.db"),
        });
        let store = config.open_store().unwrap();
        assert_eq!(store.blocks_count(telenav_types::UserId::new(1)).unwrap(), 0);
    }
}
