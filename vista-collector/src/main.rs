/**
 * VISTA COLLECTOR - Point d'entrée du collecteur d'état réseau
 *
 * RÔLE : Les hôtes postent leur état réseau (POST /upload), le collecteur garde
 * le dernier rapport par hôte en mémoire, le recopie dans un fichier JSON et
 * archive chaque soumission dans un historique SQLite append-only.
 *
 * ARCHITECTURE : config YAML + env -> SnapshotStore (mémoire + fichier) + HistoryStore -> API Axum.
 */

mod config;
mod history;
mod http;
mod models;
mod snapshot;
mod state;

use crate::config::load_config;
use crate::history::{SqliteHistory, RECORD_ID_FIELD};
use crate::http::AppState;
use crate::snapshot::SnapshotFile;
use crate::state::SnapshotStore;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vista_collector=info,tower_http=info")),
        )
        .init();

    let cfg = load_config().await.context("invalid collector configuration")?;
    cfg.validate().context("invalid collector configuration")?;

    // l'identifiant du store d'historique ne doit jamais finir dans le fichier
    let mut strip = cfg.strip_fields.clone();
    if !strip.iter().any(|f| f == RECORD_ID_FIELD) {
        strip.push(RECORD_ID_FIELD.into());
    }

    let store = SnapshotStore::new(SnapshotFile::new(&cfg.data_file), strip);
    let history = Arc::new(SqliteHistory::new(&cfg.history.database, &cfg.history.table));
    info!(
        data_file = %cfg.data_file.display(),
        history = %cfg.history.database.display(),
        table = %cfg.history.table,
        "collector configured"
    );

    let app = http::build_router(AppState { store, history }, cfg.max_body_bytes);

    let addr = cfg.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("collector stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
