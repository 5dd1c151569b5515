//! Mirror Store - SQLite-backed cache of campaign view models
//!
//! One table, `campaigns`, keyed by campaign address. The payload column
//! holds the view model as JSON. Each public call runs in its own
//! transaction.

use crate::campaign::types::CampaignView;
use crate::chain::types::Address;
use crate::store::error::{StoreError, StoreResult};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Database file name inside the data directory
pub const DB_FILE: &str = "crowdfund.db";

/// Schema revision recorded in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Local mirror of fetched campaigns
pub struct MirrorStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl MirrorStore {
    /// Create or open the store under `data_dir`
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(DB_FILE);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Self::init(conn, Some(path))
    }

    /// Store that lives only as long as the process
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS campaigns (
                campaign_address TEXT PRIMARY KEY NOT NULL,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        if version < SCHEMA_VERSION {
            conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
            tracing::debug!(version = SCHEMA_VERSION, "Initialized mirror store schema");
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    /// Insert a campaign; fails if its address is already stored
    pub fn add_object(&self, campaign: &CampaignView) -> StoreResult<()> {
        let payload = serde_json::to_string(campaign)?;
        let key = campaign.campaign_address.to_string();
        let conn = self.lock()?;

        let result = conn.execute(
            "INSERT INTO campaigns (campaign_address, payload, updated_at) VALUES (?1, ?2, ?3)",
            params![key, payload, chrono::Utc::now().timestamp()],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::ConstraintViolation(campaign.campaign_address))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace a campaign by address
    pub fn put_object(&self, campaign: &CampaignView) -> StoreResult<()> {
        let payload = serde_json::to_string(campaign)?;
        let key = campaign.campaign_address.to_string();
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO campaigns (campaign_address, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(campaign_address) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![key, payload, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// All stored campaigns, in first-insertion order
    pub fn all(&self) -> StoreResult<Vec<CampaignView>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT payload FROM campaigns ORDER BY rowid")?;

        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(StoreError::from))
            .collect()
    }

    /// Hand every stored campaign to `callback`
    pub fn get_all_objects<F>(&self, callback: F) -> StoreResult<()>
    where
        F: FnOnce(Vec<CampaignView>),
    {
        callback(self.all()?);
        Ok(())
    }

    /// One campaign by address
    pub fn get_object(&self, address: Address) -> StoreResult<Option<CampaignView>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM campaigns WHERE campaign_address = ?1",
                params![address.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    /// Remove one campaign; returns whether it existed
    pub fn remove_object(&self, address: Address) -> StoreResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM campaigns WHERE campaign_address = ?1",
            params![address.to_string()],
        )?;
        Ok(removed > 0)
    }

    /// Drop every campaign not in `keep`; returns the number removed
    pub fn retain_only(&self, keep: &[Address]) -> StoreResult<usize> {
        let keep: HashSet<String> = keep.iter().map(Address::to_string).collect();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let stored = {
            let mut stmt = tx.prepare("SELECT campaign_address FROM campaigns")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut removed = 0;
        for key in stored.iter().filter(|k| !keep.contains(*k)) {
            removed += tx.execute(
                "DELETE FROM campaigns WHERE campaign_address = ?1",
                params![key],
            )?;
        }

        tx.commit()?;
        if removed > 0 {
            tracing::debug!(removed, "Pruned campaigns no longer deployed");
        }
        Ok(removed)
    }

    /// Remove every stored campaign
    pub fn clear_store(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM campaigns", [])?;
        Ok(())
    }

    /// Number of stored campaigns
    pub fn count(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM campaigns", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn view(byte: u8, target: &str) -> CampaignView {
        CampaignView {
            campaign_address: Address([byte; 20]),
            campaign_owner: Address([0x01; 20]),
            campaign_duration: 1_700_000_600,
            remaining_duration: 600,
            campaign_target_amount: target.to_string(),
            funding_cid: "QmCid".to_string(),
            no_of_donors: 0,
            received_donation: "0.0 ETH".to_string(),
            current_milestone: 0,
            has_campaign_ended: false,
            balance: "0.0 ETH".to_string(),
            progress_value: 0.0,
            donors: vec![],
            milestones: vec![],
            donors_list: vec![],
        }
    }

    #[test]
    fn test_add_and_get() {
        let store = MirrorStore::open_in_memory().unwrap();
        let campaign = view(0xaa, "1.0 ETH");

        store.add_object(&campaign).unwrap();
        assert_eq!(store.get_object(campaign.campaign_address).unwrap(), Some(campaign));
        assert_eq!(store.get_object(Address([0xbb; 20])).unwrap(), None);
    }

    #[test]
    fn test_add_duplicate_is_constraint_violation() {
        let store = MirrorStore::open_in_memory().unwrap();
        let campaign = view(0xaa, "1.0 ETH");

        store.add_object(&campaign).unwrap();
        let err = store.add_object(&campaign).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(a) if a == campaign.campaign_address));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_put_replaces_in_place() {
        let store = MirrorStore::open_in_memory().unwrap();
        store.put_object(&view(0xaa, "1.0 ETH")).unwrap();
        store.put_object(&view(0xbb, "2.0 ETH")).unwrap();
        store.put_object(&view(0xaa, "3.0 ETH")).unwrap();

        let all = store.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].campaign_address, Address([0xaa; 20]));
        assert_eq!(all[0].campaign_target_amount, "3.0 ETH");
    }

    #[test]
    fn test_get_all_objects_callback() {
        let store = MirrorStore::open_in_memory().unwrap();
        store.put_object(&view(0xaa, "1.0 ETH")).unwrap();

        let mut seen = Vec::new();
        store.get_all_objects(|campaigns| seen = campaigns).unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_retain_only_and_clear() {
        let store = MirrorStore::open_in_memory().unwrap();
        for byte in [0xaa, 0xbb, 0xcc] {
            store.put_object(&view(byte, "1.0 ETH")).unwrap();
        }

        let removed = store.retain_only(&[Address([0xbb; 20])]).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.all().unwrap()[0].campaign_address, Address([0xbb; 20]));

        assert!(store.remove_object(Address([0xbb; 20])).unwrap());
        assert!(!store.remove_object(Address([0xbb; 20])).unwrap());

        store.put_object(&view(0xaa, "1.0 ETH")).unwrap();
        store.clear_store().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = MirrorStore::open(dir.path()).unwrap();
            store.put_object(&view(0xaa, "1.0 ETH")).unwrap();
            assert_eq!(store.path(), Some(dir.path().join(DB_FILE).as_path()));
        }

        let store = MirrorStore::open(dir.path()).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let conn = store.lock().unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_rejects_newer_schema() {
        let dir = tempdir().unwrap();
        {
            let conn = Connection::open(dir.path().join(DB_FILE)).unwrap();
            conn.execute_batch("PRAGMA user_version = 7").unwrap();
        }

        let err = MirrorStore::open(dir.path()).err().unwrap();
        assert!(matches!(
            err,
            StoreError::UnsupportedSchema { found: 7, expected: 1 }
        ));
    }
}
