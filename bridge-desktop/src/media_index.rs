//! Filesystem-backed Media Index
//!
//! Desktop platforms have no OS media catalog, so this index scans a set of
//! root folders and keeps its own SQLite catalog with generation markers:
//!
//! - every folder that directly contains photos or videos is an album;
//! - each scan that sees a new file assigns it the next generation as both
//!   `generation_added` and `generation_modified`;
//! - a file whose size or mtime changed gets the next generation as
//!   `generation_modified`;
//! - files that vanished are dropped from the catalog.
//!
//! The index `version` is a UUID minted when the catalog is first created, so
//! deleting the catalog invalidates stored sync cursors.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    media::{MediaAlbum, MediaIndex, MediaKind, MediaRecord},
};
use sha2::{Digest, Sha256};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    QueryBuilder, Row, Sqlite,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::UNIX_EPOCH;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "bmp", "tif", "tiff", "avif", "dng",
];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "3gp", "mkv", "webm", "avi", "mts"];

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS media_index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS media_entries (
        path TEXT PRIMARY KEY,
        bucket_id INTEGER NOT NULL,
        bucket_name TEXT NOT NULL,
        kind TEXT NOT NULL,
        display_name TEXT NOT NULL,
        size INTEGER NOT NULL,
        mtime_ms INTEGER NOT NULL,
        date_added INTEGER NOT NULL,
        generation_added INTEGER NOT NULL,
        generation_modified INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_media_entries_bucket ON media_entries(bucket_id)",
];

const RECORD_COLUMNS: &str = "path, bucket_id, kind, display_name, size, mtime_ms, date_added, \
                              generation_added, generation_modified";

fn db_error(context: &str, e: sqlx::Error) -> BridgeError {
    BridgeError::DatabaseError(format!("{}: {}", context, e))
}

/// Counts from one [`FsMediaIndex::rescan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub added: u64,
    pub modified: u64,
    pub removed: u64,
    /// Generation after the scan
    pub generation: i64,
}

#[derive(Debug)]
struct ScannedFile {
    path: String,
    bucket_id: i64,
    bucket_name: String,
    kind: MediaKind,
    display_name: String,
    size: u64,
    mtime_ms: i64,
}

#[derive(sqlx::FromRow)]
struct MediaRow {
    path: String,
    bucket_id: i64,
    kind: String,
    display_name: String,
    size: i64,
    mtime_ms: i64,
    date_added: i64,
    generation_added: i64,
    generation_modified: i64,
}

impl TryFrom<MediaRow> for MediaRecord {
    type Error = BridgeError;

    fn try_from(row: MediaRow) -> Result<Self> {
        let kind = MediaKind::from_str(&row.kind)?;
        Ok(MediaRecord {
            content_ref: row.path,
            kind,
            bucket_id: row.bucket_id,
            display_name: row.display_name,
            size: row.size.max(0) as u64,
            width: 0,
            height: 0,
            date_taken: row.mtime_ms,
            date_added: row.date_added,
            date_modified: row.mtime_ms / 1000,
            duration: 0,
            favorite: false,
            generation_added: row.generation_added,
            generation_modified: row.generation_modified,
        })
    }
}

/// Classify a file by extension.
pub fn media_kind_for(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Stable album id for a folder: the first 63 bits of SHA-256 over the
/// lower-cased path.
pub fn bucket_id_for(dir: &Path) -> i64 {
    let digest = Sha256::digest(dir.to_string_lossy().to_lowercase().as_bytes());
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(raw) >> 1) as i64
}

/// Catalog entry for one media file, or `None` when the file cannot be
/// indexed. Paths that are not valid UTF-8 could never be opened again from
/// the stored content reference, so they are left out.
fn scanned_file(
    dir: &Path,
    path: &Path,
    kind: MediaKind,
    metadata: std::io::Result<std::fs::Metadata>,
) -> Option<ScannedFile> {
    let Some(utf8_path) = path.to_str() else {
        warn!(path = ?path, "Skipping media file with a non UTF-8 path");
        return None;
    };
    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(path = %utf8_path, error = %e, "Skipping media file without metadata");
            return None;
        }
    };
    let mtime_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Some(ScannedFile {
        path: utf8_path.to_string(),
        bucket_id: bucket_id_for(dir),
        bucket_name: dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.to_string_lossy().into_owned()),
        kind,
        display_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: metadata.len(),
        mtime_ms,
    })
}

/// SQLite catalog over one or more media folders.
pub struct FsMediaIndex {
    pool: SqlitePool,
    roots: Vec<PathBuf>,
    scan_lock: Mutex<()>,
}

impl FsMediaIndex {
    /// Open (or create) the catalog at `db_path` indexing `roots`.
    pub async fn open(db_path: PathBuf, roots: Vec<PathBuf>) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Failed to open media index", e))?;

        debug!(path = ?db_path, roots = roots.len(), "Opened media index");
        Self::with_pool(pool, roots).await
    }

    /// Catalog that lives only as long as this value (for testing).
    pub async fn in_memory(roots: Vec<PathBuf>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| db_error("Invalid in-memory options", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Failed to open in-memory media index", e))?;

        Self::with_pool(pool, roots).await
    }

    async fn with_pool(pool: SqlitePool, roots: Vec<PathBuf>) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| db_error("Failed to create media index schema", e))?;
        }

        sqlx::query("INSERT OR IGNORE INTO media_index_meta (key, value) VALUES ('version', ?)")
            .bind(uuid::Uuid::new_v4().to_string())
            .execute(&pool)
            .await
            .map_err(|e| db_error("Failed to initialise index version", e))?;
        sqlx::query("INSERT OR IGNORE INTO media_index_meta (key, value) VALUES ('generation', '0')")
            .execute(&pool)
            .await
            .map_err(|e| db_error("Failed to initialise index generation", e))?;

        Ok(Self {
            pool,
            roots,
            scan_lock: Mutex::new(()),
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    async fn meta_value(&self, key: &str) -> Result<String> {
        let row = sqlx::query("SELECT value FROM media_index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to read media index metadata", e))?;

        row.map(|r| r.get::<String, _>(0)).ok_or_else(|| {
            BridgeError::DatabaseError(format!("Media index metadata '{}' missing", key))
        })
    }

    /// Walk all roots and collect media files. Hidden folders are skipped;
    /// unreadable folders and files are logged and skipped.
    async fn walk_roots(&self) -> Result<Vec<ScannedFile>> {
        let mut found = Vec::new();
        let mut pending: Vec<PathBuf> = self.roots.clone();

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = ?dir, error = %e, "Skipping unreadable media folder");
                    continue;
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(BridgeError::Io)? {
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        warn!(path = ?path, error = %e, "Skipping unreadable media entry");
                        continue;
                    }
                };
                let hidden = entry.file_name().to_string_lossy().starts_with('.');

                if file_type.is_dir() {
                    if !hidden {
                        pending.push(path);
                    }
                    continue;
                }
                if !file_type.is_file() || hidden {
                    continue;
                }
                let Some(kind) = media_kind_for(&path) else {
                    continue;
                };

                if let Some(file) = scanned_file(&dir, &path, kind, entry.metadata().await) {
                    found.push(file);
                }
            }
        }

        Ok(found)
    }

    /// Reconcile the catalog with the folders on disk.
    #[instrument(skip(self), fields(roots = self.roots.len()))]
    pub async fn rescan(&self) -> Result<ScanSummary> {
        let _guard = self.scan_lock.lock().await;
        let scanned = self.walk_roots().await?;

        let existing: HashMap<String, (i64, i64)> =
            sqlx::query("SELECT path, size, mtime_ms FROM media_entries")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("Failed to load media entries", e))?
                .into_iter()
                .map(|row| (row.get::<String, _>(0), (row.get(1), row.get(2))))
                .collect();

        let mut generation: i64 = self.meta_value("generation").await?.parse().map_err(|e| {
            BridgeError::DatabaseError(format!("Corrupt media index generation: {}", e))
        })?;
        let now = chrono::Utc::now().timestamp();
        let mut summary = ScanSummary::default();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin scan transaction", e))?;

        let mut seen = std::collections::HashSet::with_capacity(scanned.len());
        for file in &scanned {
            seen.insert(file.path.as_str());
            match existing.get(&file.path) {
                None => {
                    generation += 1;
                    summary.added += 1;
                    sqlx::query(
                        r#"
                        INSERT INTO media_entries (
                            path, bucket_id, bucket_name, kind, display_name, size, mtime_ms,
                            date_added, generation_added, generation_modified
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&file.path)
                    .bind(file.bucket_id)
                    .bind(&file.bucket_name)
                    .bind(file.kind.as_str())
                    .bind(&file.display_name)
                    .bind(file.size as i64)
                    .bind(file.mtime_ms)
                    .bind(now)
                    .bind(generation)
                    .bind(generation)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_error("Failed to insert media entry", e))?;
                }
                Some(&(size, mtime_ms)) if size != file.size as i64 || mtime_ms != file.mtime_ms => {
                    generation += 1;
                    summary.modified += 1;
                    sqlx::query(
                        "UPDATE media_entries SET size = ?, mtime_ms = ?, generation_modified = ? \
                         WHERE path = ?",
                    )
                    .bind(file.size as i64)
                    .bind(file.mtime_ms)
                    .bind(generation)
                    .bind(&file.path)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_error("Failed to update media entry", e))?;
                }
                Some(_) => {}
            }
        }

        for path in existing.keys().filter(|p| !seen.contains(p.as_str())) {
            summary.removed += 1;
            sqlx::query("DELETE FROM media_entries WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to delete media entry", e))?;
        }

        sqlx::query("UPDATE media_index_meta SET value = ? WHERE key = 'generation'")
            .bind(generation.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to store generation", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit scan", e))?;

        summary.generation = generation;
        info!(
            added = summary.added,
            modified = summary.modified,
            removed = summary.removed,
            generation = generation,
            "Media index rescanned"
        );
        Ok(summary)
    }

    fn push_changed_filter(
        builder: &mut QueryBuilder<'_, Sqlite>,
        bucket_ids: &[i64],
        since_generation: i64,
    ) {
        builder.push(" WHERE bucket_id IN (");
        {
            let mut ids = builder.separated(", ");
            for id in bucket_ids {
                ids.push_bind(*id);
            }
        }
        builder.push(") AND (generation_added > ");
        builder.push_bind(since_generation);
        builder.push(" OR generation_modified > ");
        builder.push_bind(since_generation);
        builder.push(")");
    }
}

#[async_trait]
impl MediaIndex for FsMediaIndex {
    async fn refresh(&self) -> Result<()> {
        self.rescan().await.map(|_| ())
    }

    async fn version(&self) -> Result<String> {
        self.meta_value("version").await
    }

    async fn current_generation(&self) -> Result<i64> {
        self.meta_value("generation").await?.parse().map_err(|e| {
            BridgeError::DatabaseError(format!("Corrupt media index generation: {}", e))
        })
    }

    async fn list_albums(&self) -> Result<Vec<MediaAlbum>> {
        let rows = sqlx::query(
            "SELECT bucket_id, bucket_name FROM media_entries \
             GROUP BY bucket_id, bucket_name ORDER BY bucket_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list albums", e))?;

        Ok(rows
            .into_iter()
            .map(|row| MediaAlbum {
                bucket_id: row.get(0),
                bucket_name: row.get(1),
            })
            .collect())
    }

    async fn query_changed(
        &self,
        bucket_ids: &[i64],
        since_generation: i64,
    ) -> Result<Vec<MediaRecord>> {
        if bucket_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM media_entries",
            RECORD_COLUMNS
        ));
        Self::push_changed_filter(&mut builder, bucket_ids, since_generation);
        builder.push(" ORDER BY generation_modified ASC");

        let rows: Vec<MediaRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to query changed media", e))?;

        rows.into_iter().map(MediaRecord::try_from).collect()
    }

    async fn count_changed(&self, bucket_ids: &[i64], since_generation: i64) -> Result<u64> {
        if bucket_ids.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM media_entries");
        Self::push_changed_filter(&mut builder, bucket_ids, since_generation);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count changed media", e))?;
        Ok(count.max(0) as u64)
    }

    async fn open_read(
        &self,
        content_ref: &str,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let known = sqlx::query("SELECT 1 FROM media_entries WHERE path = ?")
            .bind(content_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to look up media entry", e))?;
        if known.is_none() {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not in the media index", content_ref),
            )));
        }

        let file = tokio::fs::File::open(content_ref)
            .await
            .map_err(BridgeError::Io)?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn write(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, bytes).await.unwrap();
    }

    #[test]
    fn test_media_kind_by_extension() {
        assert_eq!(media_kind_for(Path::new("a/IMG_1.JPG")), Some(MediaKind::Image));
        assert_eq!(media_kind_for(Path::new("a/clip.mov")), Some(MediaKind::Video));
        assert_eq!(media_kind_for(Path::new("a/notes.txt")), None);
        assert_eq!(media_kind_for(Path::new("a/no_extension")), None);
    }

    #[test]
    fn test_bucket_id_is_stable_and_case_insensitive() {
        let a = bucket_id_for(Path::new("/photos/Camera"));
        let b = bucket_id_for(Path::new("/photos/camera"));
        assert_eq!(a, b);
        assert!(a >= 0);
        assert_ne!(a, bucket_id_for(Path::new("/photos/Screenshots")));
    }

    #[tokio::test]
    async fn test_rescan_assigns_generations() {
        let dir = tempfile::tempdir().unwrap();
        let camera = dir.path().join("Camera");
        write(&camera.join("a.jpg"), b"aaaa").await;
        write(&camera.join("b.mp4"), b"bbbbbbbb").await;
        write(&camera.join("readme.txt"), b"ignored").await;
        write(&dir.path().join(".thumbnails").join("t.jpg"), b"t").await;

        let index = FsMediaIndex::in_memory(vec![dir.path().to_path_buf()])
            .await
            .unwrap();
        assert_eq!(index.current_generation().await.unwrap(), 0);

        let summary = index.rescan().await.unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(summary.generation, 2);

        let albums = index.list_albums().await.unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].bucket_name, "Camera");
        assert_eq!(albums[0].bucket_id, bucket_id_for(&camera));

        let changed = index.query_changed(&[albums[0].bucket_id], 0).await.unwrap();
        assert_eq!(changed.len(), 2);
        assert!(changed
            .windows(2)
            .all(|w| w[0].generation_modified <= w[1].generation_modified));

        // Nothing changed: no new generations.
        let again = index.rescan().await.unwrap();
        assert_eq!(again, ScanSummary { generation: 2, ..Default::default() });
        assert!(index
            .query_changed(&[albums[0].bucket_id], 2)
            .await
            .unwrap()
            .is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_rescan_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let camera = dir.path().join("Camera");
        write(&camera.join(OsStr::from_bytes(b"bad\xff.jpg")), b"bad").await;
        write(&camera.join("good.jpg"), b"good").await;

        let index = FsMediaIndex::in_memory(vec![dir.path().to_path_buf()])
            .await
            .unwrap();
        let summary = index.rescan().await.unwrap();
        assert_eq!(summary.added, 1);

        let changed = index.query_changed(&[bucket_id_for(&camera)], 0).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].display_name, "good.jpg");

        let mut reader = index.open_read(&changed[0].content_ref).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"good");
    }

    #[test]
    fn test_vanished_file_is_skipped() {
        let dir = Path::new("/photos/Camera");
        let gone = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(scanned_file(dir, &dir.join("a.jpg"), MediaKind::Image, Err(gone)).is_none());
    }

    #[tokio::test]
    async fn test_modified_and_removed_files() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("Trips");
        write(&album.join("one.jpg"), b"1").await;
        write(&album.join("two.jpg"), b"2").await;

        let index = FsMediaIndex::in_memory(vec![dir.path().to_path_buf()])
            .await
            .unwrap();
        index.rescan().await.unwrap();
        let bucket = bucket_id_for(&album);

        write(&album.join("one.jpg"), b"one, but larger").await;
        tokio::fs::remove_file(album.join("two.jpg")).await.unwrap();

        let summary = index.rescan().await.unwrap();
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.generation, 3);

        let changed = index.query_changed(&[bucket], 2).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].display_name, "one.jpg");
        assert_eq!(changed[0].generation_added, 1);
        assert_eq!(changed[0].generation_modified, 3);
        assert_eq!(changed[0].size, 15);
        assert_eq!(index.count_changed(&[bucket], 2).await.unwrap(), 1);
        assert_eq!(index.count_changed(&[], 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_read_only_serves_indexed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Camera").join("pic.png");
        write(&path, b"png-bytes").await;

        let index = FsMediaIndex::in_memory(vec![dir.path().to_path_buf()])
            .await
            .unwrap();
        index.refresh().await.unwrap();

        let mut reader = index.open_read(&path.to_string_lossy()).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"png-bytes");

        let outside = dir.path().join("elsewhere.png");
        assert!(matches!(
            index.open_read(&outside.to_string_lossy()).await,
            Err(BridgeError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_version_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("index.db");

        let first = FsMediaIndex::open(db.clone(), vec![]).await.unwrap();
        let version = first.version().await.unwrap();
        drop(first);

        let second = FsMediaIndex::open(db, vec![]).await.unwrap();
        assert_eq!(second.version().await.unwrap(), version);
    }
}
