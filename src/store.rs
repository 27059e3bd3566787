//! Player record persistence.
//!
//! One row per player, keyed by the Discord user id. Only this module talks
//! to SQLite; the game code goes through [`PlayerStore`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::progression::{self, League};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Progression state of one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub player_id: String,
    pub money: u64,
    pub experience: u64,
    /// Number of successful `/fish` calls.
    pub catches: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlayerRecord {
    /// A zeroed record, as created on a player's first interaction.
    pub fn new(player_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            player_id: player_id.into(),
            money: 0,
            experience: 0,
            catches: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn level(&self) -> u32 {
        progression::level_for(self.experience)
    }

    pub fn league(&self) -> League {
        progression::league_for(self.level())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Keyed read/write access to player records.
///
/// Each call is atomic on its own. Read-modify-write goes through
/// [`PlayerStore::update`] / [`PlayerStore::update_existing`], never `get`
/// followed by `upsert`.
pub trait PlayerStore: Send + Sync {
    fn get(&self, player_id: &str) -> StoreResult<Option<PlayerRecord>>;

    fn upsert(&self, record: &PlayerRecord) -> StoreResult<()>;

    /// Remove one record. Returns whether it existed.
    fn delete(&self, player_id: &str) -> StoreResult<bool>;

    /// Remove every record in one transaction. Returns how many were removed.
    fn delete_all(&self) -> StoreResult<usize>;

    /// All records, ordered by `player_id`.
    fn list_all(&self) -> StoreResult<Vec<PlayerRecord>>;

    /// Load the record, creating and persisting a zeroed one if absent.
    fn get_or_create(&self, player_id: &str) -> StoreResult<PlayerRecord> {
        self.update(player_id, |_| ()).map(|(record, ())| record)
    }

    /// Apply `f` to the player's record (lazily created) and persist the
    /// result, holding the store lock throughout. Returns the stored record
    /// and whatever `f` returned.
    fn update<F, T>(&self, player_id: &str, f: F) -> StoreResult<(PlayerRecord, T)>
    where
        F: FnOnce(&mut PlayerRecord) -> T;

    /// Like [`PlayerStore::update`] but never creates: `Ok(None)` when the
    /// player has no record.
    fn update_existing<F, T>(&self, player_id: &str, f: F) -> StoreResult<Option<(PlayerRecord, T)>>
    where
        F: FnOnce(&mut PlayerRecord) -> T;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS players (
    player_id  TEXT PRIMARY KEY NOT NULL,
    money      INTEGER NOT NULL DEFAULT 0,
    experience INTEGER NOT NULL DEFAULT 0,
    catches    INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);";

const SELECT_COLUMNS: &str =
    "SELECT player_id, money, experience, catches, created_at, updated_at FROM players";

/// File-backed (or in-memory) SQLite store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!(path = %path.display(), "opened player store");
        Self::with_connection(conn)
    }

    /// Open a private in-memory database (used in tests).
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn select_one(conn: &Connection, player_id: &str) -> rusqlite::Result<Option<PlayerRecord>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE player_id = ?1"),
        params![player_id],
        read_record,
    )
    .optional()
}

fn write_one(conn: &Connection, record: &PlayerRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO players (player_id, money, experience, catches, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(player_id) DO UPDATE SET
             money = excluded.money,
             experience = excluded.experience,
             catches = excluded.catches,
             updated_at = excluded.updated_at",
        params![
            record.player_id,
            to_sql_int(record.money),
            to_sql_int(record.experience),
            to_sql_int(record.catches),
            record.created_at.to_rfc3339(),
            record.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<PlayerRecord> {
    Ok(PlayerRecord {
        player_id: row.get(0)?,
        money: from_sql_int(row.get(1)?),
        experience: from_sql_int(row.get(2)?),
        catches: from_sql_int(row.get(3)?),
        created_at: read_timestamp(row, 4)?,
        updated_at: read_timestamp(row, 5)?,
    })
}

fn read_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// SQLite integers are signed; balances saturate rather than wrap.
fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl PlayerStore for SqliteStore {
    fn get(&self, player_id: &str) -> StoreResult<Option<PlayerRecord>> {
        let conn = self.lock()?;
        Ok(select_one(&conn, player_id)?)
    }

    fn upsert(&self, record: &PlayerRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        write_one(&conn, record)?;
        Ok(())
    }

    fn delete(&self, player_id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM players WHERE player_id = ?1", params![player_id])?;
        debug!(player_id, removed, "delete player");
        Ok(removed > 0)
    }

    fn delete_all(&self) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM players", [])?;
        tx.commit()?;
        info!(removed, "wiped player store");
        Ok(removed)
    }

    fn list_all(&self) -> StoreResult<Vec<PlayerRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY player_id ASC"))?;
        let records = stmt
            .query_map([], read_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn update<F, T>(&self, player_id: &str, f: F) -> StoreResult<(PlayerRecord, T)>
    where
        F: FnOnce(&mut PlayerRecord) -> T,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut record = match select_one(&tx, player_id)? {
            Some(existing) => existing,
            None => {
                debug!(player_id, "creating player record");
                PlayerRecord::new(player_id)
            }
        };
        let out = f(&mut record);
        record.updated_at = Utc::now();
        write_one(&tx, &record)?;
        tx.commit()?;
        Ok((record, out))
    }

    fn update_existing<F, T>(&self, player_id: &str, f: F) -> StoreResult<Option<(PlayerRecord, T)>>
    where
        F: FnOnce(&mut PlayerRecord) -> T,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let Some(mut record) = select_one(&tx, player_id)? else {
            return Ok(None);
        };
        let out = f(&mut record);
        record.updated_at = Utc::now();
        write_one(&tx, &record)?;
        tx.commit()?;
        Ok(Some((record, out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(SqliteStore: Send, Sync, PlayerStore);

    fn store() -> SqliteStore {
        SqliteStore::in_memory().expect("in-memory store")
    }

    #[test]
    fn missing_player_reads_as_none() {
        assert!(store().get("1").unwrap().is_none());
    }

    #[test]
    fn get_or_create_persists_zeroed_record() {
        let s = store();
        let record = s.get_or_create("42").unwrap();
        assert_eq!(record.money, 0);
        assert_eq!(record.experience, 0);
        assert_eq!(record.level(), 1);
        assert_eq!(s.get("42").unwrap(), Some(record));
    }

    #[test]
    fn upsert_then_get_roundtrips_fields() {
        let s = store();
        let mut record = PlayerRecord::new("7");
        record.money = 120;
        record.experience = 3_000;
        record.catches = 4;
        s.upsert(&record).unwrap();

        let loaded = s.get("7").unwrap().expect("record");
        assert_eq!(loaded.money, 120);
        assert_eq!(loaded.experience, 3_000);
        assert_eq!(loaded.catches, 4);
        assert_eq!(loaded.league(), League::Pond);
    }

    #[test]
    fn upsert_keeps_single_row_per_player() {
        let s = store();
        let mut record = PlayerRecord::new("7");
        s.upsert(&record).unwrap();
        record.money = 5;
        s.upsert(&record).unwrap();
        let all = s.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].money, 5);
    }

    #[test]
    fn update_applies_closure_atomically() {
        let s = store();
        let (updated, previous) = s
            .update("9", |r| {
                let previous = r.money;
                r.money += 10;
                r.experience += 3;
                previous
            })
            .unwrap();
        assert_eq!(previous, 0);
        assert_eq!((updated.money, updated.experience), (10, 3));
        let (again, ()) = s.update("9", |r| r.money += 1).unwrap();
        assert_eq!(again.money, 11);
        assert_eq!(again.created_at, updated.created_at);
    }

    #[test]
    fn update_existing_never_creates() {
        let s = store();
        assert!(s.update_existing("404", |r| r.money = 1).unwrap().is_none());
        assert!(s.get("404").unwrap().is_none());

        s.get_or_create("404").unwrap();
        let (record, ()) = s.update_existing("404", |r| r.money = 1).unwrap().unwrap();
        assert_eq!(record.money, 1);
    }

    #[test]
    fn delete_reports_existence() {
        let s = store();
        s.get_or_create("1").unwrap();
        assert!(s.delete("1").unwrap());
        assert!(!s.delete("1").unwrap());
        assert!(s.get("1").unwrap().is_none());
    }

    #[test]
    fn delete_all_empties_store() {
        let s = store();
        for id in ["1", "2", "3"] {
            s.get_or_create(id).unwrap();
        }
        assert_eq!(s.delete_all().unwrap(), 3);
        assert!(s.list_all().unwrap().is_empty());
        assert_eq!(s.delete_all().unwrap(), 0);
    }

    #[test]
    fn list_all_is_ordered_by_id() {
        let s = store();
        for id in ["30", "10", "20"] {
            s.get_or_create(id).unwrap();
        }
        let ids: Vec<String> = s.list_all().unwrap().into_iter().map(|r| r.player_id).collect();
        assert_eq!(ids, ["10", "20", "30"]);
    }

    #[test]
    fn huge_balances_saturate_instead_of_wrapping() {
        let s = store();
        let mut record = PlayerRecord::new("1");
        record.money = u64::MAX;
        s.upsert(&record).unwrap();
        assert_eq!(s.get("1").unwrap().unwrap().money, i64::MAX as u64);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("players.db");
        {
            let s = SqliteStore::open(&path).unwrap();
            s.update("5", |r| r.money = 77).unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get("5").unwrap().map(|r| r.money), Some(77));
    }
}
