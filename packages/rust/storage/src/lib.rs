//! libSQL storage layer: the dedup store for harvested champions.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the
//! `champions` table and the harvest run history.
//!
//! **Access rules:**
//! - Harvester: read-write via [`Storage::open`], shared across continuations
//!   behind an `Arc`. Champion rows are insert-only.
//! - Publication builder / `summary`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use lorebook_shared::{ChampionRecord, LorebookError, Result, RunId};
use tokio::sync::Mutex;

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written and committed.
    Inserted,
    /// A row for `(champion, lang)` already existed; nothing was written.
    AlreadyPresent,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    /// Serializes writers on the shared connection.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LorebookError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LorebookError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LorebookError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LorebookError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LorebookError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LorebookError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Champion operations
    // -----------------------------------------------------------------------

    /// Whether `(champion, lang)` has already been harvested.
    pub async fn champion_exists(&self, champion: &str, lang: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM champions WHERE champion = ?1 AND lang = ?2 LIMIT 1",
                params![champion, lang],
            )
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(LorebookError::Storage(e.to_string())),
        }
    }

    /// Insert a champion unless `(champion, lang)` is already present.
    ///
    /// A single autocommitted statement: the existence check and the write
    /// cannot be split by a concurrent insert of the same key.
    pub async fn insert_champion(&self, record: &ChampionRecord) -> Result<InsertOutcome> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let changed = self
            .conn
            .execute(
                "INSERT INTO champions (
                    champion, name, lang, story, bio, race, title, role,
                    region, quote, short_bio, related_champions
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(champion, lang) DO NOTHING",
                params![
                    record.champion.as_str(),
                    record.name.as_str(),
                    record.lang.as_str(),
                    record.story.as_str(),
                    record.bio.as_str(),
                    record.race.as_str(),
                    record.title.as_str(),
                    record.role.as_str(),
                    record.region.as_str(),
                    record.quote.as_str(),
                    record.short_bio.as_str(),
                    record.related_joined(),
                ],
            )
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?;

        if changed == 0 {
            Ok(InsertOutcome::AlreadyPresent)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Get one champion by key.
    pub async fn get_champion(&self, champion: &str, lang: &str) -> Result<Option<ChampionRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT champion, name, lang, story, bio, race, title, role,
                        region, quote, short_bio, related_champions
                 FROM champions WHERE champion = ?1 AND lang = ?2",
                params![champion, lang],
            )
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_champion(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LorebookError::Storage(e.to_string())),
        }
    }

    /// List champions, optionally restricted to one language, ordered by language then code.
    pub async fn list_champions(&self, lang: Option<&str>) -> Result<Vec<ChampionRecord>> {
        let mut rows = match lang {
            Some(lang) => self
                .conn
                .query(
                    "SELECT champion, name, lang, story, bio, race, title, role,
                            region, quote, short_bio, related_champions
                     FROM champions WHERE lang = ?1 ORDER BY champion",
                    params![lang],
                )
                .await,
            None => self
                .conn
                .query(
                    "SELECT champion, name, lang, story, bio, race, title, role,
                            region, quote, short_bio, related_champions
                     FROM champions ORDER BY lang, champion",
                    params![],
                )
                .await,
        }
        .map_err(|e| LorebookError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?
        {
            results.push(row_to_champion(&row)?);
        }
        Ok(results)
    }

    /// Number of stored champions per language.
    pub async fn count_by_language(&self) -> Result<BTreeMap<String, usize>> {
        let mut rows = self
            .conn
            .query(
                "SELECT lang, COUNT(*) FROM champions GROUP BY lang",
                params![],
            )
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?;

        let mut counts = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?
        {
            let lang: String = row
                .get(0)
                .map_err(|e| LorebookError::Storage(e.to_string()))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| LorebookError::Storage(e.to_string()))?;
            counts.insert(lang, count as usize);
        }
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Harvest run operations
    // -----------------------------------------------------------------------

    /// Record the start of a harvest run.
    pub async fn insert_harvest_run(&self, run_id: &RunId, previous_count: usize) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO harvest_runs (id, started_at, previous_count) VALUES (?1, ?2, ?3)",
                params![run_id.to_string(), now.as_str(), previous_count as i64],
            )
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Close a harvest run with its stats.
    pub async fn finish_harvest_run(&self, run_id: &RunId, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE harvest_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id.to_string()],
            )
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Stats JSON of a finished run, `None` if the run is unknown or unfinished.
    pub async fn harvest_run_stats(&self, run_id: &RunId) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stats_json FROM harvest_runs WHERE id = ?1",
                params![run_id.to_string()],
            )
            .await
            .map_err(|e| LorebookError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(LorebookError::Storage(e.to_string())),
        }
    }
}

/// Convert a database row to a [`ChampionRecord`].
fn row_to_champion(row: &libsql::Row) -> Result<ChampionRecord> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| LorebookError::Storage(e.to_string()))
    };

    Ok(ChampionRecord {
        champion: text(0)?,
        name: text(1)?,
        lang: text(2)?,
        story: text(3)?,
        bio: text(4)?,
        race: text(5)?,
        title: text(6)?,
        role: text(7)?,
        region: text(8)?,
        quote: text(9)?,
        short_bio: text(10)?,
        related_champions: ChampionRecord::split_related(&text(11)?),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("lorebook_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn record(champion: &str, lang: &str) -> ChampionRecord {
        ChampionRecord {
            champion: champion.into(),
            name: champion.to_uppercase(),
            lang: lang.into(),
            race: "Darkin".into(),
            title: "the Darkin Blade".into(),
            role: "Fighter".into(),
            region: "Runeterra".into(),
            quote: "I must destroy even hope.".into(),
            short_bio: "Once honored defenders of Shurima.".into(),
            bio: "<div>long bio</div>".into(),
            story: String::new(),
            related_champions: vec!["Kayle".into(), "Morgana".into()],
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("lorebook_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn insert_then_exists() {
        let storage = test_storage().await;
        assert!(!storage.champion_exists("aatrox", "en_US").await.unwrap());

        let outcome = storage.insert_champion(&record("aatrox", "en_US")).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);

        assert!(storage.champion_exists("aatrox", "en_US").await.unwrap());
        // Same code, other language is a different key
        assert!(!storage.champion_exists("aatrox", "fr_FR").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_noop() {
        let storage = test_storage().await;
        let first = record("aatrox", "en_US");
        storage.insert_champion(&first).await.unwrap();

        let mut second = record("aatrox", "en_US");
        second.name = "Changed".into();
        let outcome = storage.insert_champion(&second).await.unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyPresent);

        let stored = storage.get_champion("aatrox", "en_US").await.unwrap().unwrap();
        assert_eq!(stored.name, "AATROX");
    }

    #[tokio::test]
    async fn concurrent_inserts_persist_one_row() {
        let storage = Arc::new(test_storage().await);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.insert_champion(&record("ahri", "ko_KR")).await.unwrap()
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() == InsertOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(storage.list_champions(Some("ko_KR")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_roundtrips_through_columns() {
        let storage = test_storage().await;
        let original = record("jinx", "en_US");
        storage.insert_champion(&original).await.unwrap();

        let stored = storage.get_champion("jinx", "en_US").await.unwrap().unwrap();
        assert_eq!(stored, original);
    }

    #[tokio::test]
    async fn counts_group_by_language() {
        let storage = test_storage().await;
        for (code, lang) in [("aatrox", "en_US"), ("ahri", "en_US"), ("aatrox", "fr_FR")] {
            storage.insert_champion(&record(code, lang)).await.unwrap();
        }

        let counts = storage.count_by_language().await.unwrap();
        assert_eq!(counts.get("en_US"), Some(&2));
        assert_eq!(counts.get("fr_FR"), Some(&1));

        let all = storage.list_champions(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].lang, "en_US");
    }

    #[tokio::test]
    async fn harvest_run_lifecycle() {
        let storage = test_storage().await;
        let run_id = RunId::new();
        storage.insert_harvest_run(&run_id, 10).await.unwrap();
        assert!(storage.harvest_run_stats(&run_id).await.unwrap().is_none());

        storage
            .finish_harvest_run(&run_id, r#"{"inserted": 3}"#)
            .await
            .unwrap();
        let stats = storage.harvest_run_stats(&run_id).await.unwrap().unwrap();
        assert!(stats.contains("inserted"));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("lorebook_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_champion(&record("aatrox", "en_US")).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.champion_exists("aatrox", "en_US").await.unwrap());
        let result = ro.insert_champion(&record("ahri", "en_US")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
