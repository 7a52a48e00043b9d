use serde_json::{Map, Value};
use std::collections::HashMap;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Rapport réseau envoyé par un hôte : objet JSON opaque, seul `hostname` est requis.
pub type Report = Map<String, Value>;

/// hostname -> dernier rapport reçu
pub type HostsMap = HashMap<String, Report>;

pub const HOSTNAME_FIELD: &str = "hostname";
pub const RECEIVED_AT_FIELD: &str = "received_at";

/// Rapport validé, prêt à être horodaté et stocké.
#[derive(Debug, Clone)]
pub struct Upload {
    pub hostname: String,
    pub report: Report,
}

impl Upload {
    /// Parse le corps brut d'un POST /upload.
    /// `None` si le JSON est invalide, si ce n'est pas un objet, ou si `hostname` est absent/null.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        let Value::Object(report) = value else { return None; };
        let hostname = host_key(report.get(HOSTNAME_FIELD)?)?;
        Some(Self { hostname, report })
    }

    /// Pose `received_at` côté serveur (écrase toute valeur fournie par le client).
    pub fn stamp(&mut self, now: OffsetDateTime) {
        let ts = now.format(&Rfc3339).unwrap_or_default();
        self.report.insert(RECEIVED_AT_FIELD.into(), Value::String(ts));
    }
}

// Contrat laxiste : les scalaires deviennent une clé texte (`42` et `"42"` désignent le même hôte).
// `null`, tableaux et objets ne peuvent pas servir de clé.
fn host_key(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Copie d'un rapport sans les champs d'identifiant interne (`_id`, `id`, ...).
pub fn strip_fields(report: &Report, fields: &[String]) -> Report {
    report
        .iter()
        .filter(|(k, _)| !fields.iter().any(|f| f == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
