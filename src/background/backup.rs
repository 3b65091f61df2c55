use crate::config::BackupConfig;
use crate::db;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Periodic compressed SQLite backups with age-based pruning.
pub async fn run(database_path: PathBuf, cfg: BackupConfig, cancel: CancellationToken) {
    info!(
        "backup: first run in {} min, then every {} min (retention {} days)",
        cfg.initial_delay_mins, cfg.interval_mins, cfg.retention_days
    );

    let start = tokio::time::Instant::now() + cfg.initial_delay();
    let mut ticker = tokio::time::interval_at(start, cfg.interval());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("backup: shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                backup_once(database_path.clone(), cfg.clone()).await;
            }
        }
    }
}

async fn backup_once(database_path: PathBuf, cfg: BackupConfig) {
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<(PathBuf, usize)> {
        let archive = db::backup_compressed(&database_path, &cfg.dir)?;
        let pruned = db::prune_backups(&cfg.dir, cfg.retention())?;
        Ok((archive, pruned))
    })
    .await;

    match result {
        Ok(Ok((archive, pruned))) => {
            info!("backup: wrote {} (pruned {})", archive.display(), pruned)
        }
        Ok(Err(e)) => error!("backup: failed: {:#}", e),
        Err(e) => error!("backup: task panicked: {}", e),
    }
}
