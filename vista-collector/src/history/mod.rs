/**
 * HISTORY - Journal durable des uploads (append-only)
 *
 * RÔLE :
 * Chaque rapport accepté par POST /upload est copié ici, tel quel, horodaté.
 * Contrairement au snapshot (un seul rapport par hôte), rien n'est jamais écrasé.
 *
 * FONCTIONNEMENT :
 * - HistoryStore trait = interface commune (append + requêtes simples)
 * - Le store attribue son propre identifiant (`_id`) à chaque enregistrement
 * - Les erreurs sont remontées à l'appelant, qui se contente de les logger
 */

pub mod sqlite;

use crate::models::Report;

pub use sqlite::SqliteHistory;

/// Champ d'identifiant attribué par le store à chaque enregistrement
pub const RECORD_ID_FIELD: &str = "_id";

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// Store durable, append-only, interrogeable.
pub trait HistoryStore {
    /// Ajoute un enregistrement indépendant et retourne l'identifiant attribué.
    fn append(&self, report: &Report) -> Result<String, HistoryError>;

    /// Nombre total d'enregistrements
    fn count(&self) -> Result<u64, HistoryError>;

    /// Derniers enregistrements d'un hôte, du plus récent au plus ancien (avec `_id`)
    fn recent_for(&self, hostname: &str, limit: usize) -> Result<Vec<Report>, HistoryError>;
}
