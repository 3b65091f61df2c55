use anyhow::Context;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The tenant database: one writer connection plus a ring of readers over
/// the same WAL-mode file.
///
/// `with_writer`/`with_reader` run on the calling thread and are meant for
/// startup work (migrations). The async `write`/`read` hop onto tokio's
/// blocking pool.
pub struct DbPool {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

fn connect(path: &Path, writer: bool) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
    if writer {
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    }
    Ok(conn)
}

impl DbPool {
    pub fn open(path: impl AsRef<Path>, reader_count: usize) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = connect(&path, true)?;
        let readers = (0..reader_count.max(1))
            .map(|_| connect(&path, false).map(Mutex::new))
            .collect::<anyhow::Result<Vec<_>>>()?;
        debug!(path = %path.display(), readers = readers.len(), "database opened");

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// File backing this pool; the backup task copies it.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn with_writer<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        f(&self.writer.lock())
    }

    /// Any idle reader, starting from a rotating offset. Blocks on the
    /// starting reader when every connection is busy.
    pub fn with_reader<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let start = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let ring = self.readers[start..].iter().chain(&self.readers[..start]);
        for reader in ring {
            if let Some(conn) = reader.try_lock() {
                return f(&conn);
            }
        }
        debug!(readers = self.readers.len(), "all database readers busy, waiting");
        f(&self.readers[start].lock())
    }

    pub async fn write<F, T>(self: &Arc<Self>, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || pool.with_writer(f))
            .await
            .context("database write task panicked")?
    }

    pub async fn read<F, T>(self: &Arc<Self>, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || pool.with_reader(f))
            .await
            .context("database read task panicked")?
    }
}
