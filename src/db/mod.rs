pub mod pool;
pub mod tenants;

use anyhow::Context;
use flate2::write::GzEncoder;
use flate2::Compression;
use pool::DbPool;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use tenants::SqliteTenantRepository;

const MIGRATIONS: &[(&str, &str)] = &[("001_initial", include_str!("migrations/001_initial.sql"))];

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    pool.with_writer(|conn| {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            )",
        )?;

        for (name, sql) in MIGRATIONS {
            let applied: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )?;

            if !applied {
                conn.execute_batch(sql)?;
                conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
                tracing::info!("applied migration: {}", name);
            }
        }
        Ok(())
    })
}

/// SQLite online backup of `source` into a fresh file at `dest`. Safe while
/// the server is writing (WAL).
pub fn backup_database(source: &Path, dest: &Path) -> anyhow::Result<()> {
    let src = rusqlite::Connection::open(source)
        .with_context(|| format!("failed to open {}", source.display()))?;
    let mut dst = rusqlite::Connection::open(dest)
        .with_context(|| format!("failed to create {}", dest.display()))?;
    let backup = rusqlite::backup::Backup::new(&src, &mut dst)?;
    backup.run_to_completion(100, Duration::from_millis(50), None)?;
    Ok(())
}

/// Back up into `output_dir/tenants-<timestamp>.db.gz` and return the path.
pub fn backup_compressed(source: &Path, output_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let raw = output_dir.join(format!("tenants-{timestamp}.db"));
    backup_database(source, &raw)?;

    let archive = output_dir.join(format!("tenants-{timestamp}.db.gz"));
    let mut input = std::fs::File::open(&raw)?;
    let mut encoder = GzEncoder::new(std::fs::File::create(&archive)?, Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    std::fs::remove_file(&raw)?;
    Ok(archive)
}

/// Delete `*.db.gz` files in `dir` older than `retention`. Returns how many
/// were removed.
pub fn prune_backups(dir: &Path, retention: Duration) -> anyhow::Result<usize> {
    let mut removed = 0;
    let now = std::time::SystemTime::now();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_backup = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".db.gz"));
        if !is_backup {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age > retention {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
