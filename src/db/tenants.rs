use super::pool::DbPool;
use crate::tenant::lifecycle::{LifecycleState, TenantRecord};
use crate::tenant::traits::TenantRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use uuid::Uuid;

const COLUMNS: &str = "id, domain, state, port, created_at, updated_at";

/// `TenantRepository` over the `tenants` table.
#[derive(Clone)]
pub struct SqliteTenantRepository {
    pool: Arc<DbPool>,
}

impl SqliteTenantRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {raw:?}"))?
        .with_timezone(&Utc))
}

struct RawRow {
    id: String,
    domain: String,
    state: String,
    port: Option<i64>,
    created_at: String,
    updated_at: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            domain: row.get(1)?,
            state: row.get(2)?,
            port: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<TenantRecord> {
        Ok(TenantRecord {
            id: Uuid::parse_str(&self.id).with_context(|| format!("bad tenant id {:?}", self.id))?,
            domain: self.domain,
            state: self.state,
            port: self.port.map(u16::try_from).transpose().context("port out of range")?,
            created_at: parse_time(&self.created_at)?,
            updated_at: self.updated_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[async_trait]
impl TenantRepository for SqliteTenantRepository {
    async fn create(&self, record: TenantRecord) -> Result<()> {
        self.pool
            .write(move |conn| {
                conn.execute(
                    "INSERT INTO tenants (id, domain, state, port, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.id.to_string(),
                        record.domain,
                        record.state,
                        record.port,
                        record.created_at.to_rfc3339(),
                        record.updated_at.map(|t| t.to_rfc3339()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn update_state(&self, id: Uuid, state: LifecycleState) -> Result<()> {
        self.pool
            .write(move |conn| {
                conn.execute(
                    "UPDATE tenants SET state = ?1, updated_at = ?2 WHERE id = ?3",
                    params![state.as_str(), now(), id.to_string()],
                )?;
                Ok(())
            })
            .await
    }

    async fn set_port(&self, id: Uuid, port: u16) -> Result<()> {
        self.pool
            .write(move |conn| {
                conn.execute(
                    "UPDATE tenants SET port = ?1, updated_at = ?2 WHERE id = ?3",
                    params![port, now(), id.to_string()],
                )?;
                Ok(())
            })
            .await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<TenantRecord>> {
        self.pool
            .read(move |conn| {
                conn.query_row(
                    &format!("SELECT {COLUMNS} FROM tenants WHERE id = ?1"),
                    [id.to_string()],
                    RawRow::from_row,
                )
                .optional()?
                .map(RawRow::into_record)
                .transpose()
            })
            .await
    }

    /// Most recent record for the domain; earlier failed attempts may exist.
    async fn get_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>> {
        let domain = domain.to_string();
        self.pool
            .read(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM tenants WHERE domain = ?1
                         ORDER BY created_at DESC LIMIT 1"
                    ),
                    [domain],
                    RawRow::from_row,
                )
                .optional()?
                .map(RawRow::into_record)
                .transpose()
            })
            .await
    }

    async fn list_with_ports(&self) -> Result<Vec<TenantRecord>> {
        self.pool
            .read(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM tenants WHERE port IS NOT NULL ORDER BY created_at"
                ))?;
                let rows = stmt
                    .query_map([], RawRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows.into_iter().map(RawRow::into_record).collect()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use crate::tenant::lifecycle::Instance;

    fn repo(dir: &std::path::Path) -> SqliteTenantRepository {
        let path = dir.join("tenants.db");
        let pool = DbPool::open(path.to_str().unwrap(), 2).unwrap();
        run_migrations(&pool).unwrap();
        SqliteTenantRepository::new(Arc::new(pool))
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = repo(tmp.path());
        let instance = Instance::new("a.example.com", "node");
        repo.create(TenantRecord::for_instance(&instance)).await.unwrap();

        let stored = repo.get_by_id(instance.id()).await.unwrap().unwrap();
        assert_eq!(stored.domain, "a.example.com");
        assert_eq!(stored.state, "Requested");
        assert_eq!(stored.port, None);
        assert!(stored.updated_at.is_none());

        let by_domain = repo.get_by_domain("a.example.com").await.unwrap().unwrap();
        assert_eq!(by_domain.id, instance.id());
    }

    #[tokio::test]
    async fn state_and_port_updates() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = repo(tmp.path());
        let instance = Instance::new("b.example.com", "python");
        repo.create(TenantRecord::for_instance(&instance)).await.unwrap();

        repo.update_state(instance.id(), LifecycleState::ConfiguringDomain)
            .await
            .unwrap();
        repo.set_port(instance.id(), 6007).await.unwrap();

        let stored = repo.get_by_id(instance.id()).await.unwrap().unwrap();
        assert_eq!(stored.state, "ConfiguringDomain");
        assert_eq!(stored.port, Some(6007));
        assert!(stored.updated_at.is_some());

        let with_ports = repo.list_with_ports().await.unwrap();
        assert_eq!(with_ports.len(), 1);
        assert_eq!(with_ports[0].id, instance.id());
    }

    #[tokio::test]
    async fn missing_rows_are_none() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = repo(tmp.path());
        assert!(repo.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert!(repo.get_by_domain("nope.test").await.unwrap().is_none());
        // updating an unknown id is a silent no-op
        repo.update_state(Uuid::new_v4(), LifecycleState::Failed).await.unwrap();
    }
}
