//! tablesync.toml configuration parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TableResult;
use crate::pagination::DEFAULT_PAGE_SIZE_OPTIONS;
use crate::types::{DEFAULT_LIMIT, FilterValue, Filters, TableDefaults};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub table: TableConfig,
    pub query: QueryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Cache namespace, so several tables on one page never share keys.
    pub namespace: String,
    pub default_limit: u32,
    pub page_size_options: Vec<u32>,
    /// Idle time before typed search text is committed to the URL.
    pub debounce_ms: u64,
    /// Filters written into the URL on first load when absent.
    pub default_filters: BTreeMap<String, serde_json::Value>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            namespace: "table".to_string(),
            default_limit: DEFAULT_LIMIT,
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
            debounce_ms: 300,
            default_filters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// How long a cached page stays usable.
    pub cache_ttl_secs: u64,
    pub max_entries: usize,
    /// Extra attempts after a failed fetch.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Keep showing the previous page while the next one loads.
    pub keep_previous_data: bool,
    /// Per-request timeout for the HTTP fetcher.
    pub fetch_timeout_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            max_entries: 64,
            max_retries: 1,
            retry_backoff_ms: 500,
            keep_previous_data: true,
            fetch_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Size of the generated fixture served by the demo endpoint.
    pub rows: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            rows: 500,
        }
    }
}

impl SyncConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl TableConfig {
    pub fn defaults(&self) -> TableDefaults {
        TableDefaults {
            limit: self.default_limit.max(1),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Default filters as a validated bag. Fails on reserved keys.
    pub fn default_filters(&self) -> TableResult<Filters> {
        let mut filters = Filters::new();
        for (key, value) in &self.default_filters {
            filters.try_set(key, FilterValue::from_json(value.clone()))?;
        }
        Ok(filters)
    }
}

impl QueryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;

    #[test]
    fn test_parse_empty() {
        let config: SyncConfig = toml::from_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.table.defaults().limit, 10);
        assert_eq!(config.table.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[table]
namespace = "users"
default_limit = 25
debounce_ms = 150

[table.default_filters]
status = "active"
verified = true

[query]
max_retries = 0
keep_previous_data = false

[server]
port = 8080
"#;
        let config: SyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.table.namespace, "users");
        assert_eq!(config.table.defaults().limit, 25);
        assert_eq!(config.query.max_retries, 0);
        assert!(!config.query.keep_previous_data);
        assert_eq!(config.query.max_entries, 64);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.rows, 500);

        let filters = config.table.default_filters().unwrap();
        assert_eq!(filters.get_str("status"), Some("active"));
        assert_eq!(filters.get("verified"), Some(&FilterValue::Bool(true)));
    }

    #[test]
    fn test_reserved_default_filter_rejected() {
        let config: SyncConfig = toml::from_str("[table.default_filters]\npage = 3\n").unwrap();
        assert_eq!(
            config.table.default_filters(),
            Err(TableError::ReservedKey("page".into()))
        );
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = SyncConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("namespace"));
        let back: SyncConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }
}
