use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::domain::{
    ComicHash, ComicSummary, GeneratedComic, HistoryEntryId, ScanHistoryEntry, ScanResult,
};

pub mod assets;

pub use assets::{AssetStore, LocalAssetStore};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool_options = if is_in_memory(database_url) {
            // An in-memory database lives and dies with its single connection.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn save_comic(&self, comic: &GeneratedComic) -> Result<()> {
        let comic_json = serde_json::to_string(comic)?;
        sqlx::query(
            r#"
            INSERT INTO comics (comic_hash, title, comic_json, generated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(comic_hash) DO UPDATE SET
                title = excluded.title,
                comic_json = excluded.comic_json,
                generated_at = excluded.generated_at
            "#,
        )
        .bind(comic.comic_hash.as_str())
        .bind(&comic.title)
        .bind(comic_json)
        .bind(comic.generated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_comic(&self, comic_hash: &ComicHash) -> Result<Option<GeneratedComic>> {
        let row = sqlx::query("SELECT comic_json FROM comics WHERE comic_hash = ?1")
            .bind(comic_hash.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let raw: String = row.get("comic_json");
            serde_json::from_str(&raw)
                .with_context(|| format!("stored comic '{comic_hash}' is not valid json"))
        })
        .transpose()
    }

    /// Records a completed scan and returns the id of the new history entry.
    pub async fn create_history_entry(&self, scan: &ScanResult) -> Result<HistoryEntryId> {
        self.create_history_entry_with_report(scan, None).await
    }

    pub async fn create_history_entry_with_report(
        &self,
        scan: &ScanResult,
        report: Option<&serde_json::Value>,
    ) -> Result<HistoryEntryId> {
        let id = HistoryEntryId(Uuid::new_v4().to_string());
        let scan_result_json = serde_json::to_string(scan)?;
        let report_json = report.map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO scan_history (
                id,
                filename,
                created_at,
                package_count,
                scan_result_json,
                report_json
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(id.as_str())
        .bind(&scan.filename)
        .bind(Utc::now())
        .bind(i64::from(scan.package_count))
        .bind(scan_result_json)
        .bind(report_json)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Adds a comic summary to an existing entry.
    ///
    /// Returns `false` when the entry does not exist. Appending a hash the
    /// entry already lists is a no-op.
    pub async fn append_history_comic(
        &self,
        entry_id: &HistoryEntryId,
        comic: &ComicSummary,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM scan_history WHERE id = ?1")
            .bind(entry_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO scan_history_comics (entry_id, comic_hash, title)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(entry_id, comic_hash) DO NOTHING
            "#,
        )
        .bind(entry_id.as_str())
        .bind(comic.hash.as_str())
        .bind(&comic.title)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn load_history_entry(
        &self,
        entry_id: &HistoryEntryId,
    ) -> Result<Option<ScanHistoryEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, created_at, package_count, scan_result_json, report_json
            FROM scan_history
            WHERE id = ?1
            "#,
        )
        .bind(entry_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_history_entry(row).await?)),
            None => Ok(None),
        }
    }

    /// All history entries, newest first.
    pub async fn list_history_entries(&self) -> Result<Vec<ScanHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, created_at, package_count, scan_result_json, report_json
            FROM scan_history
            ORDER BY rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(self.hydrate_history_entry(row).await?);
        }
        Ok(entries)
    }

    async fn hydrate_history_entry(&self, row: SqliteRow) -> Result<ScanHistoryEntry> {
        let id = HistoryEntryId(row.get::<String, _>("id"));
        let scan_result_json: String = row.get("scan_result_json");
        let scan_result: ScanResult = serde_json::from_str(&scan_result_json)
            .with_context(|| format!("history entry '{id}' has an unreadable scan result"))?;
        let report = row
            .get::<Option<String>, _>("report_json")
            .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
            .transpose()
            .with_context(|| format!("history entry '{id}' has an unreadable report"))?;
        let package_count = u32::try_from(row.get::<i64, _>("package_count")).unwrap_or(0);

        let comics = sqlx::query(
            r#"
            SELECT comic_hash, title
            FROM scan_history_comics
            WHERE entry_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| ComicSummary {
            hash: ComicHash(row.get::<String, _>("comic_hash")),
            title: row.get::<String, _>("title"),
        })
        .collect();

        Ok(ScanHistoryEntry {
            filename: row.get("filename"),
            timestamp: row.get::<DateTime<Utc>, _>("created_at"),
            package_count,
            scan_result,
            report,
            comics,
            id,
        })
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
