//! Store handle and open discipline
//!
//! One file, one writer. Writes serialize behind a mutex around the write
//! connection; reads open short-lived read-only connections against the
//! same file. Before SQLite touches an existing file the 100-byte header is
//! checked so corruption and incompatibility surface as typed errors
//! instead of opaque `SQLITE_NOTADB` failures.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags};

use crate::error::{Result, StoreError};
use crate::migrations;

/// Size of the database file header.
const HEADER_SIZE: usize = 100;
/// The well-known format magic.
const MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Bundle page cache, in pages, shared across readers of a connection.
const PAGE_CACHE_PAGES: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadWrite,
    ReadOnly,
}

/// Handle to a catalog store.
#[derive(Debug)]
pub struct Store {
    location: Location,
    writer: Mutex<Connection>,
    mode: OpenMode,
}

#[derive(Debug)]
enum Location {
    File(PathBuf),
    Memory,
}

impl Store {
    /// Open (creating if absent) a store file and bring its schema up to
    /// date.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        preflight(path)?;

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        configure(&conn)?;

        let mut store = Self {
            location: Location::File(path.to_path_buf()),
            writer: Mutex::new(conn),
            mode: OpenMode::ReadWrite,
        };
        store.migrate_to_latest()?;
        Ok(store)
    }

    /// Open an existing store without taking the writer role. Migrations
    /// are verified, never applied; a schema newer than this build knows is
    /// tolerated read-only.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        preflight(path)?;

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        configure_reader(&conn)?;

        Ok(Self {
            location: Location::File(path.to_path_buf()),
            writer: Mutex::new(conn),
            mode: OpenMode::ReadOnly,
        })
    }

    /// Open an in-memory store (for tests). Reads and writes share the one
    /// connection.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        let mut store = Self {
            location: Location::Memory,
            writer: Mutex::new(conn),
            mode: OpenMode::ReadWrite,
        };
        store.migrate_to_latest()?;
        Ok(store)
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    /// Run `f` with the (exclusive) write connection inside a transaction.
    /// The transaction commits when `f` returns Ok and rolls back otherwise.
    /// `f` may run twice when the first attempt hits lock contention.
    pub fn with_writer<T>(
        &self,
        mut f: impl FnMut(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        if self.mode == OpenMode::ReadOnly {
            return Err(StoreError::FailedPrecondition {
                action: "write".to_string(),
                reason: "store opened read-only".to_string(),
            });
        }
        let mut guard = self.writer.lock().expect("writer lock poisoned");
        with_busy_retry(|| {
            let tx = guard.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Run `f` with a read connection. File-backed stores hand out a fresh
    /// read-only connection so readers never contend with the writer;
    /// in-memory stores share the writer connection.
    pub fn with_reader<T>(&self, mut f: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        match &self.location {
            Location::File(path) => {
                let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
                configure_reader(&conn)?;
                with_busy_retry(|| f(&conn))
            }
            Location::Memory => {
                let guard = self.writer.lock().expect("writer lock poisoned");
                f(&guard)
            }
        }
    }

    fn migrate_to_latest(&mut self) -> Result<()> {
        let mut guard = self.writer.lock().expect("writer lock poisoned");
        migrations::migrate_up(&mut guard, None)
    }

    /// Replay `down` migrations until `target` is the newest applied id.
    pub fn migrate_down_to(&self, target: i64) -> Result<()> {
        if self.mode == OpenMode::ReadOnly {
            return Err(StoreError::FailedPrecondition {
                action: "migrate".to_string(),
                reason: "store opened read-only".to_string(),
            });
        }
        let mut guard = self.writer.lock().expect("writer lock poisoned");
        migrations::migrate_down(&mut guard, target)
    }

    /// Applied schema version (highest migration id), for diagnostics.
    pub fn schema_version(&self) -> Result<i64> {
        let guard = self.writer.lock().expect("writer lock poisoned");
        migrations::current_version(&guard)
    }
}

/// Retry once on lock contention, then surface `Busy`.
fn with_busy_retry<T>(mut f: impl FnMut() -> Result<T>) -> Result<T> {
    match f() {
        Err(StoreError::Sqlite(e)) if is_busy(&e) => {
            tracing::warn!("store locked by another writer, retrying once");
            match f() {
                Err(StoreError::Sqlite(e)) if is_busy(&e) => Err(StoreError::Busy),
                other => other,
            }
        }
        other => other,
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn configure(conn: &Connection) -> Result<()> {
    // rollback-journal mode only; WAL is out of contract for this file
    conn.pragma_update(None, "journal_mode", "DELETE")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "cache_size", PAGE_CACHE_PAGES)?;
    conn.busy_timeout(std::time::Duration::from_millis(250))?;
    Ok(())
}

fn configure_reader(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "cache_size", PAGE_CACHE_PAGES)?;
    conn.busy_timeout(std::time::Duration::from_millis(250))?;
    Ok(())
}

/// Validate the file header and journal state before opening.
///
/// An absent or empty file is fine (SQLite initializes it); anything else
/// must look like a healthy database we understand.
fn preflight(path: &Path) -> Result<()> {
    let journal = journal_path(path);
    if journal.exists() && std::fs::metadata(&journal)?.len() > 0 {
        return Err(StoreError::HotJournal(journal.display().to_string()));
    }

    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(());
    }

    let mut header = [0u8; HEADER_SIZE];
    file.read_exact(&mut header)
        .map_err(|_| StoreError::Corruption("file shorter than the 100-byte header".into()))?;
    check_header(&header)
}

fn check_header(header: &[u8; HEADER_SIZE]) -> Result<()> {
    if &header[0..16] != MAGIC {
        return Err(StoreError::Corruption("bad header magic".into()));
    }

    // stored big-endian at offset 16; the value 1 encodes 65536
    let raw_page_size = u16::from_be_bytes([header[16], header[17]]);
    let page_size: u32 = if raw_page_size == 1 {
        65536
    } else {
        raw_page_size as u32
    };
    if !(512..=65536).contains(&page_size) || !page_size.is_power_of_two() {
        return Err(StoreError::Corruption(format!(
            "page size {page_size} is not a power of two in [512, 65536]"
        )));
    }

    // text encoding at offset 56: 1 = UTF-8, 2/3 = UTF-16 variants
    let encoding = u32::from_be_bytes([header[56], header[57], header[58], header[59]]);
    if encoding != 0 && encoding != 1 {
        return Err(StoreError::Incompatible(format!(
            "unsupported text encoding {encoding} (only UTF-8 is supported)"
        )));
    }

    // bytes 72..92 are reserved for expansion and must read zero
    if header[72..92].iter().any(|&b| b != 0) {
        return Err(StoreError::Incompatible(
            "reserved header bytes are non-zero".into(),
        ));
    }

    Ok(())
}

fn journal_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push("-journal");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_creates_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        {
            let store = Store::open(&path).unwrap();
            assert!(store.schema_version().unwrap() > 0);
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.mode(), OpenMode::ReadWrite);
    }

    #[test]
    fn test_bad_magic_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        std::fs::write(&path, vec![0xffu8; 200]).unwrap();
        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corruption(_)));
    }

    #[test]
    fn test_hot_journal_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        Store::open(&path).unwrap();
        let mut journal = std::fs::File::create(dir.path().join("index.db-journal")).unwrap();
        journal.write_all(b"leftover journal frames").unwrap();

        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::HotJournal(_)));
    }

    #[test]
    fn test_header_utf16_is_incompatible() {
        let mut header = [0u8; HEADER_SIZE];
        header[0..16].copy_from_slice(MAGIC);
        header[16] = 0x10; // page size 4096
        header[59] = 2; // UTF-16le
        let err = check_header(&header).unwrap_err();
        assert!(matches!(err, StoreError::Incompatible(_)));
    }

    #[test]
    fn test_in_memory_store() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_reader(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM package", [], |r| r.get(0))?;
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_read_only_refuses_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        Store::open(&path).unwrap();

        let store = Store::open_read_only(&path).unwrap();
        let err = store.with_writer(|_| Ok(())).unwrap_err();
        assert!(matches!(err, StoreError::FailedPrecondition { .. }));
    }
}
