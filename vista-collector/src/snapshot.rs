/**
 * SNAPSHOT FILE - Miroir disque du dernier rapport de chaque hôte
 *
 * Le fichier est réécrit en entier à chaque upload réussi (jamais en append).
 * Écriture dans `<fichier>.tmp` puis rename : un lecteur ne voit jamais un fichier à moitié écrit.
 */

use crate::models::HostsMap;
use std::path::PathBuf;
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Écrase le fichier avec le snapshot complet (déjà nettoyé des identifiants internes).
    pub async fn write(&self, hosts: &HostsMap) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(hosts)?;
        let io_err = |source| SnapshotError::Io { path: self.path.clone(), source };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, json).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_write_overwrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/latest.json");
        let file = SnapshotFile::new(&path);

        let mut hosts = HostsMap::new();
        hosts.insert("h1".into(), json!({"hostname": "h1"}).as_object().unwrap().clone());
        hosts.insert("h2".into(), json!({"hostname": "h2"}).as_object().unwrap().clone());
        file.write(&hosts).await.unwrap();

        hosts.remove("h2");
        file.write(&hosts).await.unwrap();

        let txt = std::fs::read_to_string(&path).unwrap();
        let on_disk: Value = serde_json::from_str(&txt).unwrap();
        assert_eq!(on_disk, json!({"h1": {"hostname": "h1"}}));
        assert!(!dir.path().join("data/latest.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // le chemin cible est un répertoire : rename impossible
        std::fs::create_dir(dir.path().join("latest.json")).unwrap();
        let file = SnapshotFile::new(dir.path().join("latest.json"));

        let err = file.write(&HostsMap::new()).await.unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));
    }
}
