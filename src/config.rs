//! Configuration: static bootstrap config plus the dynamic, operator-writable
//! configuration store.
//! Pilot in Command: configuration
//! Mission: one place secrets and tunables come from, read once at startup.

use chrono::{NaiveTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Static bootstrap configuration: environment variables and an optional
/// `config.toml`, read once at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub database_path: String,
    pub coordinator_port: u16,
    pub news_collector_port: u16,
    pub scanner_port: u16,
    pub market_timezone: String,

    pub news_api_keys: HashMap<String, String>,
    pub persistence_dsn: Option<String>,
    pub cache_dsn: Option<String>,

    pub api_timeout_secs: u64,
    pub collector_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "./catalyst.db".to_string(),
            coordinator_port: 5000,
            news_collector_port: 5008,
            scanner_port: 5001,
            market_timezone: "America/New_York".to_string(),
            news_api_keys: HashMap::new(),
            persistence_dsn: None,
            cache_dsn: None,
            api_timeout_secs: 30,
            collector_concurrency: 8,
        }
    }
}

impl Config {
    /// Load defaults from an optional `config.toml`, then apply environment
    /// variable overrides (env wins). Secrets are read only here, at startup.
    pub fn load(toml_path: Option<&str>) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let mut cfg = match toml_path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)?
            }
            None => Config::default(),
        };

        if let Ok(v) = std::env::var("DATABASE_PATH") {
            cfg.database_path = v;
        }
        if let Ok(v) = std::env::var("COORDINATOR_PORT") {
            cfg.coordinator_port = v.parse().unwrap_or(cfg.coordinator_port);
        }
        if let Ok(v) = std::env::var("NEWS_COLLECTOR_PORT") {
            cfg.news_collector_port = v.parse().unwrap_or(cfg.news_collector_port);
        }
        if let Ok(v) = std::env::var("SCANNER_PORT") {
            cfg.scanner_port = v.parse().unwrap_or(cfg.scanner_port);
        }
        if let Ok(v) = std::env::var("MARKET_TIMEZONE") {
            cfg.market_timezone = v;
        }
        if let Ok(v) = std::env::var("PERSISTENCE_DSN") {
            cfg.persistence_dsn = Some(v);
        }
        if let Ok(v) = std::env::var("CACHE_DSN") {
            cfg.cache_dsn = Some(v);
        }
        Ok(cfg)
    }
}

/// Recognized dynamic configuration keys. Values are kept
/// as strings/floats and parsed by the consuming component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConfigValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl ConfigValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            ConfigValue::Text(s) => NaiveTime::parse_from_str(s, "%H:%M").ok(),
            _ => None,
        }
    }
}

fn default_recognized_keys() -> HashMap<String, ConfigValue> {
    let mut m = HashMap::new();
    m.insert("max_positions".to_string(), ConfigValue::Int(5));
    m.insert("min_catalyst_score".to_string(), ConfigValue::Float(30.0));
    m.insert("min_price".to_string(), ConfigValue::Float(1.0));
    m.insert("max_price".to_string(), ConfigValue::Float(500.0));
    m.insert("min_volume".to_string(), ConfigValue::Int(500_000));
    m.insert(
        "min_relative_volume".to_string(),
        ConfigValue::Float(1.5),
    );
    m.insert(
        "premarket_start".to_string(),
        ConfigValue::Text("04:00".to_string()),
    );
    m.insert(
        "premarket_end".to_string(),
        ConfigValue::Text("09:30".to_string()),
    );
    m.insert("market_interval".to_string(), ConfigValue::Int(30));
    m.insert("premarket_interval".to_string(), ConfigValue::Int(5));
    m.insert("afterhours_interval".to_string(), ConfigValue::Int(60));
    m.insert("tier_1_weight".to_string(), ConfigValue::Float(1.0));
    m.insert("tier_2_weight".to_string(), ConfigValue::Float(0.8));
    m.insert("tier_3_weight".to_string(), ConfigValue::Float(0.6));
    m.insert("tier_4_weight".to_string(), ConfigValue::Float(0.4));
    m.insert("tier_5_weight".to_string(), ConfigValue::Float(0.2));
    m.insert("news_cache_ttl".to_string(), ConfigValue::Int(3600));
    m.insert("api_timeout".to_string(), ConfigValue::Int(30));
    m
}

struct CachedEntry {
    value: ConfigValue,
    cached_at: Instant,
}

/// The operator-writable configuration store.
/// Reads may observe stale values for up to one cache-TTL.
pub struct ConfigStore {
    entries: RwLock<HashMap<String, CachedEntry>>,
    ttl: Duration,
}

impl ConfigStore {
    pub fn new(ttl: Duration) -> Self {
        let mut entries = HashMap::new();
        let now = Instant::now();
        for (k, v) in default_recognized_keys() {
            entries.insert(k, CachedEntry { value: v, cached_at: now });
        }
        Self {
            entries: RwLock::new(entries),
            ttl,
        }
    }

    pub fn read(&self, key: &str) -> Option<ConfigValue> {
        self.entries.read().get(key).map(|e| e.value.clone())
    }

    /// Transactionally update a configuration entry and invalidate any cached
    /// copy.
    pub fn write(&self, key: &str, value: ConfigValue) {
        self.entries.write().insert(
            key.to_string(),
            CachedEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Whether the cached copy of `key` is still within its TTL window.
    pub fn is_fresh(&self, key: &str) -> bool {
        self.entries
            .read()
            .get(key)
            .map(|e| Instant::now().duration_since(e.cached_at) < self.ttl)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> HashMap<String, ConfigValue> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }
}

/// Marks the moment `reload` was last invoked, so the scheduler can re-read
/// schedule boundaries from the config store.
pub fn mark_reload(store: &ConfigStore) {
    store.write(
        "_reloaded_at",
        ConfigValue::Text(Utc::now().to_rfc3339()),
    );
}
