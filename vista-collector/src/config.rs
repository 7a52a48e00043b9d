use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::{Path, PathBuf}};
use tokio::fs;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address {0:?}")]
    Listen(String),
    #[error("invalid history table name {0:?}")]
    Table(String),
    #[error("invalid VISTA_MAX_BODY_BYTES {0:?}")]
    BodyLimit(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CollectorConfig {
    pub listen: String,
    pub data_file: PathBuf,
    pub history: HistoryConf,
    /// champs retirés de chaque rapport avant écriture du fichier snapshot
    pub strip_fields: Vec<String>,
    /// taille max du corps de POST /upload, `None` = illimitée
    pub max_body_bytes: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConf {
    pub database: PathBuf,
    pub table: String, // "collection" : une ligne par upload
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".into(),
            data_file: "./data/latest_network_data.json".into(),
            history: HistoryConf::default(),
            strip_fields: vec!["_id".into(), "id".into()],
            max_body_bytes: None,
        }
    }
}

impl Default for HistoryConf {
    fn default() -> Self {
        Self {
            database: "./data/history.db".into(),
            table: "raw_data_ndr_clients".into(),
        }
    }
}

impl CollectorConfig {
    /// Surcharges individuelles par variables d'environnement (après le fichier YAML).
    pub fn apply_env<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("VISTA_LISTEN") { self.listen = v; }
        if let Some(v) = get("VISTA_DATA_FILE") { self.data_file = v.into(); }
        if let Some(v) = get("VISTA_HISTORY_DB") { self.history.database = v.into(); }
        if let Some(v) = get("VISTA_HISTORY_TABLE") { self.history.table = v; }
        if let Some(v) = get("VISTA_MAX_BODY_BYTES") {
            self.max_body_bytes = match v.trim() {
                "" | "none" | "unlimited" => None,
                n => Some(n.parse().map_err(|_| ConfigError::BodyLimit(v.clone()))?),
            };
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| ConfigError::Listen(self.listen.clone()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if !is_sql_identifier(&self.history.table) {
            return Err(ConfigError::Table(self.history.table.clone()));
        }
        Ok(())
    }
}

// Le nom de table est interpolé dans le SQL : on n'accepte que [A-Za-z_][A-Za-z0-9_]*
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_config(txt: &str, path: &Path) -> CollectorConfig {
    if txt.trim().is_empty() { return CollectorConfig::default(); }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "invalid config, using defaults");
        CollectorConfig::default()
    })
}

pub async fn load_config() -> Result<CollectorConfig, ConfigError> {
    let path = std::env::var("VISTA_COLLECTOR_CONFIG").unwrap_or_else(|_| "collector.yaml".into());
    let path = Path::new(&path);
    let mut cfg = if path.exists() {
        let txt = fs::read_to_string(path).await.unwrap_or_default();
        parse_config(&txt, path)
    } else {
        warn!(path = %path.display(), "no config file, using defaults");
        CollectorConfig::default()
    };
    cfg.apply_env(|key| std::env::var(key).ok())?;
    Ok(cfg)
}
