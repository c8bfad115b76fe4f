use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, Transaction, TransactionBehavior};
use tracing::{debug, info};

use super::{NewSnapshot, Project, ProjectId, ProjectSummary, Snapshot, SnapshotId, StoreError};
use crate::fingerprint::Fingerprint;
use crate::model::{BlockRecord, ExtractedEntities, HardwareRecord, TagRecord};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SNAPSHOT_COLUMNS: &str =
    "id, project_id, fingerprint, created_at, operator, source_file_name";

/// Default database path (~/.local/share/tiatrack/tiatrack.db or platform equivalent)
pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let dirs = directories::ProjectDirs::from("", "", "tiatrack").ok_or(StoreError::DataDir)?;
    Ok(dirs.data_dir().join("tiatrack.db"))
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            fingerprint TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            operator TEXT NOT NULL,
            source_file_name TEXT NOT NULL,
            FOREIGN KEY(project_id) REFERENCES projects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            data_type TEXT,
            address TEXT,
            description TEXT,
            hardware_ref TEXT,
            block_ref TEXT,
            FOREIGN KEY(snapshot_id) REFERENCES snapshots(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS blocks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            block_type TEXT NOT NULL,
            number INTEGER,
            FOREIGN KEY(snapshot_id) REFERENCES snapshots(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS hardware (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            device_type TEXT,
            ip_address TEXT,
            rack_slot TEXT,
            FOREIGN KEY(snapshot_id) REFERENCES snapshots(id)
        )",
        [],
    )?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_snapshots_project ON snapshots(project_id)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_tags_snapshot ON tags(snapshot_id)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_blocks_snapshot ON blocks(snapshot_id)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_hardware_snapshot ON hardware(snapshot_id)", [])?;

    Ok(())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn find_snapshot_id(conn: &Connection, fingerprint: &Fingerprint) -> rusqlite::Result<Option<SnapshotId>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM snapshots WHERE fingerprint = ?1")?;
    let mut rows = stmt.query(params![fingerprint.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

fn get_or_create_project(tx: &Transaction<'_>, name: &str) -> rusqlite::Result<ProjectId> {
    let existing: Option<ProjectId> = {
        let mut stmt = tx.prepare_cached("SELECT id FROM projects WHERE name = ?1")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        }
    };

    if let Some(id) = existing {
        return Ok(id);
    }

    tx.execute(
        "INSERT INTO projects (name, created_at) VALUES (?1, ?2)",
        params![name, now()],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Database handle. Open once, pass by reference to whatever needs it.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init_schema(&conn)?;
        Ok(Store { conn })
    }

    /// Returns the project called `name` (trimmed), creating it if needed.
    pub fn create_project(&mut self, name: &str) -> Result<Project, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyProjectName);
        }

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = get_or_create_project(&tx, name)?;
        let project = tx.query_row(
            "SELECT id, name, created_at FROM projects WHERE id = ?1",
            params![id],
            project_from_row,
        )?;
        tx.commit()?;

        info!(project = id, name, "project ready");
        Ok(project)
    }

    /// Persists a snapshot and all of its records atomically.
    ///
    /// Fails with `DuplicateSnapshot` if any snapshot, in any project, already
    /// has this fingerprint. The check and the insert share one IMMEDIATE
    /// transaction, so two writers racing on the same archive cannot both win.
    pub fn create_snapshot(
        &mut self,
        new: &NewSnapshot<'_>,
        entities: &ExtractedEntities,
    ) -> Result<SnapshotId, StoreError> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = find_snapshot_id(&tx, new.fingerprint)? {
            debug!(existing, "duplicate fingerprint, nothing written");
            return Err(StoreError::DuplicateSnapshot { existing });
        }

        let project_id = get_or_create_project(&tx, new.project)?;

        let inserted = tx.execute(
            "INSERT INTO snapshots (project_id, fingerprint, created_at, operator, source_file_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project_id,
                new.fingerprint.as_str(),
                now(),
                new.operator,
                new.source_file_name
            ],
        );

        if let Err(e) = inserted {
            // only reachable if another writer skipped the IMMEDIATE lock
            if is_unique_violation(&e) {
                if let Some(existing) = find_snapshot_id(&tx, new.fingerprint)? {
                    return Err(StoreError::DuplicateSnapshot { existing });
                }
            }
            return Err(e.into());
        }

        let snapshot_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO tags (snapshot_id, name, data_type, address, description, hardware_ref, block_ref)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for tag in &entities.tags {
                stmt.execute(params![
                    snapshot_id,
                    tag.name,
                    tag.data_type,
                    tag.address,
                    tag.description,
                    tag.hardware_ref,
                    tag.block_ref
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO blocks (snapshot_id, name, block_type, number) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for block in &entities.blocks {
                stmt.execute(params![snapshot_id, block.name, block.block_type, block.number])?;
            }
        }

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO hardware (snapshot_id, name, device_type, ip_address, rack_slot)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for hw in &entities.hardware {
                stmt.execute(params![
                    snapshot_id,
                    hw.name,
                    hw.device_type,
                    hw.ip_address,
                    hw.rack_slot
                ])?;
            }
        }

        tx.commit()?;

        info!(
            snapshot_id,
            project_id,
            tags = entities.tags.len(),
            blocks = entities.blocks.len(),
            hardware = entities.hardware.len(),
            "snapshot stored"
        );
        Ok(snapshot_id)
    }

    /// All projects with their snapshot counts, newest first.
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.created_at,
                    (SELECT COUNT(*) FROM snapshots s WHERE s.project_id = p.id)
             FROM projects p
             ORDER BY p.created_at DESC, p.id DESC",
        )?;

        let projects = stmt
            .query_map([], |row| {
                Ok(ProjectSummary {
                    project: project_from_row(row)?,
                    snapshot_count: row.get::<_, i64>(3)?.max(0) as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn find_project(&self, name: &str) -> Result<Option<Project>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM projects WHERE name = ?1")?;
        let mut rows = stmt.query(params![name])?;

        if let Some(row) = rows.next()? {
            Ok(Some(project_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Snapshot headers of one project, newest first.
    pub fn list_snapshots(&self, project_id: ProjectId) -> Result<Vec<Snapshot>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS}
             FROM snapshots
             WHERE project_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;

        let snapshots = stmt
            .query_map(params![project_id], snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    pub fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(snapshot_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<SnapshotId>, StoreError> {
        Ok(find_snapshot_id(&self.conn, fingerprint)?)
    }

    /// The two most recent snapshots of a project as `(older, newer)`.
    pub fn latest_pair(&self, project_id: ProjectId) -> Result<Option<(Snapshot, Snapshot)>, StoreError> {
        let mut snapshots = self.list_snapshots(project_id)?;
        if snapshots.len() < 2 {
            return Ok(None);
        }
        snapshots.truncate(2);
        let older = snapshots.pop();
        let newer = snapshots.pop();
        Ok(older.zip(newer))
    }

    /// Entity records of a snapshot, in insertion order.
    pub fn get_entities(&self, snapshot_id: SnapshotId) -> Result<ExtractedEntities, StoreError> {
        if self.get_snapshot(snapshot_id)?.is_none() {
            return Err(StoreError::SnapshotNotFound(snapshot_id));
        }

        let tags = {
            let mut stmt = self.conn.prepare(
                "SELECT name, data_type, address, description, hardware_ref, block_ref
                 FROM tags WHERE snapshot_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![snapshot_id], |row| {
                Ok(TagRecord {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    address: row.get(2)?,
                    description: row.get(3)?,
                    hardware_ref: row.get(4)?,
                    block_ref: row.get(5)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let blocks = {
            let mut stmt = self.conn.prepare(
                "SELECT name, block_type, number FROM blocks WHERE snapshot_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![snapshot_id], |row| {
                Ok(BlockRecord {
                    name: row.get(0)?,
                    block_type: row.get(1)?,
                    number: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let hardware = {
            let mut stmt = self.conn.prepare(
                "SELECT name, device_type, ip_address, rack_slot
                 FROM hardware WHERE snapshot_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![snapshot_id], |row| {
                Ok(HardwareRecord {
                    name: row.get(0)?,
                    device_type: row.get(1)?,
                    ip_address: row.get(2)?,
                    rack_slot: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        Ok(ExtractedEntities { tags, blocks, hardware })
    }
}

fn project_from_row(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn snapshot_from_row(row: &rusqlite::Row) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        project_id: row.get(1)?,
        fingerprint: Fingerprint::from_hex(row.get::<_, String>(2)?),
        created_at: row.get(3)?,
        operator: row.get(4)?,
        source_file_name: row.get(5)?,
    })
}
