use crate::policy::LedgerPolicy;
use serde::{Deserialize, Serialize};

/// Database path that selects an in-memory store.
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Address the HTTP API listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub policy: LedgerPolicy,
}

fn default_db_path() -> String {
    "ledger.db".into()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3001".into()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            policy: LedgerPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Load from a JSON config file. Missing keys fall back to defaults.
    /// In tests, use LedgerConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LedgerConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    pub fn default_test() -> Self {
        Self {
            db_path: IN_MEMORY.into(),
            bind_addr: "127.0.0.1:0".into(),
            policy: LedgerPolicy::default(),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == IN_MEMORY
    }
}
