use crate::models::{strip_fields, HostsMap, Upload};
use crate::snapshot::{SnapshotError, SnapshotFile};
use parking_lot::RwLock;
use std::sync::Arc;

/// Dernier rapport de chaque hôte, en mémoire + miroir disque.
///
/// `upsert_and_persist` sérialise mutation et réécriture du fichier derrière `writer` :
/// le fichier suit toujours l'ordre des mutations. `/latest` ne prend que le verrou
/// de lecture et n'attend jamais l'I/O disque.
pub struct SnapshotStore {
    hosts: RwLock<HostsMap>,
    writer: tokio::sync::Mutex<SnapshotFile>,
    strip: Vec<String>,
}

impl SnapshotStore {
    pub fn new(file: SnapshotFile, strip: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            hosts: RwLock::new(HostsMap::new()),
            writer: tokio::sync::Mutex::new(file),
            strip,
        })
    }

    pub fn snapshot(&self) -> HostsMap {
        self.hosts.read().clone()
    }

    pub fn len(&self) -> usize {
        self.hosts.read().len()
    }

    /// Remplace (sans merge) le rapport de l'hôte puis réécrit le fichier complet.
    /// En cas d'échec d'écriture la mutation mémoire est conservée.
    pub async fn upsert_and_persist(&self, upload: Upload) -> Result<(), SnapshotError> {
        let file = self.writer.lock().await;

        let cleaned: HostsMap = {
            let mut hosts = self.hosts.write();
            hosts.insert(upload.hostname, upload.report);
            hosts
                .iter()
                .map(|(h, r)| (h.clone(), strip_fields(r, &self.strip)))
                .collect()
        };

        file.write(&cleaned).await
    }
}
