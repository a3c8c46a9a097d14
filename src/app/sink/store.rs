//! Parquet-backed durable store
//!
//! The full result set lives in two Parquet files holding identical content:
//! the primary and a backup whose name carries a `_bckup` stem suffix. Every
//! write goes to `<file>.tmp`, is fsynced and then renamed over the target,
//! so a crash leaves either the old or the new file, never a torn one.
//!
//! Schema: `id: UInt64` (non-null), `result: Utf8` (JSON-encoded document).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, RecordBatch, StringArray, UInt64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::id::CandidateId;
use crate::app::models::Document;
use crate::constants::{files, sink};
use crate::errors::{ConfigError, ConfigResult, PersistenceError, PersistenceResult};

/// Full set of persisted results keyed by candidate id
pub type StoredResults = BTreeMap<CandidateId, Document>;

/// Durable store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Primary store file; the backup path is derived from it
    pub path: PathBuf,
    /// Optional Parquet file supplying extra ids for section selection
    pub seed_path: Option<PathBuf>,
    /// Id column name in the seed file
    pub seed_id_column: String,
    /// Zstd compression level
    pub zstd_level: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(files::DEFAULT_STORE_PATH),
            seed_path: None,
            seed_id_column: files::DEFAULT_SEED_ID_COLUMN.to_string(),
            zstd_level: sink::DEFAULT_ZSTD_LEVEL,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.path.file_name().is_none() {
            return Err(ConfigError::InvalidValue {
                field: "store.path".to_string(),
                value: self.path.display().to_string(),
                reason: "store path must name a file".to_string(),
            });
        }

        if ZstdLevel::try_new(self.zstd_level).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "store.zstd_level".to_string(),
                value: self.zstd_level.to_string(),
                reason: "not a valid zstd compression level".to_string(),
            });
        }

        if self.seed_id_column.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.seed_id_column".to_string(),
                value: String::new(),
                reason: "seed id column cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Derive the backup path: `dir/name.ext` becomes `dir/name_bckup.ext`
pub fn backup_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!(
            "{}{}.{}",
            stem,
            files::BACKUP_STEM_SUFFIX,
            ext.to_string_lossy()
        ),
        None => format!("{}{}", stem, files::BACKUP_STEM_SUFFIX),
    };
    path.with_file_name(name)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", name, files::TEMP_FILE_SUFFIX))
}

/// Arrow schema of the store files
pub fn store_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(sink::ID_COLUMN, DataType::UInt64, false),
        Field::new(sink::RESULT_COLUMN, DataType::Utf8, false),
    ]))
}

/// Encode the full result set as a single record batch
pub fn to_record_batch(results: &StoredResults) -> PersistenceResult<RecordBatch> {
    let ids = UInt64Array::from_iter_values(results.keys().copied());
    let documents = results
        .values()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;

    let columns: Vec<ArrayRef> = vec![Arc::new(ids), Arc::new(StringArray::from(documents))];
    Ok(RecordBatch::try_new(store_schema(), columns)?)
}

/// Primary and backup Parquet files
#[derive(Debug, Clone)]
pub struct ParquetStore {
    primary: PathBuf,
    backup: PathBuf,
    zstd_level: i32,
}

impl ParquetStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            primary: config.path.clone(),
            backup: backup_path_for(&config.path),
            zstd_level: config.zstd_level,
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Read the persisted result set at startup
    ///
    /// The primary is preferred; a missing or corrupt primary falls back to
    /// the backup. Neither file existing is a first run and yields an empty
    /// set. Leftover temp files from an interrupted write are removed first.
    pub fn load(&self) -> ConfigResult<StoredResults> {
        self.remove_stale_temp_files();

        let primary_error = match read_results(&self.primary) {
            Ok(Some(results)) => {
                info!(
                    "Loaded {} stored results from {}",
                    results.len(),
                    self.primary.display()
                );
                return Ok(results);
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    "Primary store {} unreadable, trying backup: {}",
                    self.primary.display(),
                    e
                );
                Some(e)
            }
        };

        match read_results(&self.backup) {
            Ok(Some(results)) => {
                warn!(
                    "Recovered {} stored results from backup {}",
                    results.len(),
                    self.backup.display()
                );
                Ok(results)
            }
            Ok(None) => match primary_error {
                None => {
                    info!("No existing store at {}, starting empty", self.primary.display());
                    Ok(StoredResults::new())
                }
                Some(e) => Err(ConfigError::StoreUnreadable {
                    path: self.primary.clone(),
                    reason: e.to_string(),
                }),
            },
            Err(e) => {
                let (path, reason) = match primary_error {
                    Some(primary) => (
                        self.primary.clone(),
                        format!("{}; backup: {}", primary, e),
                    ),
                    None => (self.backup.clone(), e.to_string()),
                };
                Err(ConfigError::StoreUnreadable { path, reason })
            }
        }
    }

    fn remove_stale_temp_files(&self) {
        for path in [&self.primary, &self.backup] {
            let temp = temp_path_for(path);
            if temp.exists() {
                warn!("Removing stale temp file: {}", temp.display());
                if let Err(e) = fs::remove_file(&temp) {
                    warn!("Failed to remove {}: {}", temp.display(), e);
                }
            }
        }
    }

    /// Write the batch to the primary, then the backup
    ///
    /// Blocking; callers on the runtime should use `spawn_blocking`.
    pub fn write(&self, batch: &RecordBatch) -> PersistenceResult<usize> {
        self.write_atomic(&self.primary, batch)?;
        self.write_atomic(&self.backup, batch)?;
        debug!(
            "Persisted {} rows to {} and {}",
            batch.num_rows(),
            self.primary.display(),
            self.backup.display()
        );
        Ok(batch.num_rows())
    }

    fn write_atomic(&self, path: &Path, batch: &RecordBatch) -> PersistenceResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = temp_path_for(path);
        let file = File::create(&temp_path)?;
        let level = ZstdLevel::try_new(self.zstd_level)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(batch)?;
        let file = writer.into_inner()?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, path).map_err(|source| PersistenceError::AtomicRename {
            temp_path: temp_path.clone(),
            final_path: path.to_path_buf(),
            source,
        })?;
        sync_parent_dir(path)?;
        Ok(())
    }
}

/// Flush the directory entry of `path` so a completed rename survives power loss
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

// Directories cannot be opened as files here
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Read a store file; `Ok(None)` when it does not exist
pub fn read_results(path: &Path) -> PersistenceResult<Option<StoredResults>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut results = StoredResults::new();
    for batch in reader {
        let batch = batch?;
        let ids = batch
            .column_by_name(sink::ID_COLUMN)
            .ok_or_else(|| schema_error(path, "missing id column"))?;
        let ids = cast(ids, &DataType::UInt64)?;
        let ids = ids
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| schema_error(path, "id column is not integer"))?;

        let documents = batch
            .column_by_name(sink::RESULT_COLUMN)
            .ok_or_else(|| schema_error(path, "missing result column"))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| schema_error(path, "result column is not Utf8"))?;

        for row in 0..batch.num_rows() {
            if ids.is_null(row) || documents.is_null(row) {
                continue;
            }
            let document: Document = serde_json::from_str(documents.value(row))?;
            results.insert(ids.value(row), document);
        }
    }

    Ok(Some(results))
}

/// Read candidate ids from an arbitrary Parquet column
///
/// Integer and string columns are accepted; values that do not convert to an
/// unsigned 64-bit integer are skipped.
pub fn load_seed_ids(path: &Path, column: &str) -> PersistenceResult<Vec<CandidateId>> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    if builder.schema().column_with_name(column).is_none() {
        return Err(schema_error(path, &format!("no column named {}", column)));
    }

    let mask = ProjectionMask::columns(builder.parquet_schema(), std::iter::once(column));
    let reader = builder.with_projection(mask).build()?;

    let mut ids = Vec::new();
    for batch in reader {
        let batch = batch?;
        let values = cast(batch.column(0), &DataType::UInt64)?;
        let values = values
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| schema_error(path, "seed column did not cast to UInt64"))?;
        ids.extend(values.iter().flatten());
    }

    info!("Loaded {} seed ids from {}", ids.len(), path.display());
    Ok(ids)
}

fn schema_error(path: &Path, reason: &str) -> PersistenceError {
    PersistenceError::Schema {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(temp_dir: &TempDir) -> ParquetStore {
        ParquetStore::new(&StoreConfig {
            path: temp_dir.path().join("results.parquet"),
            ..Default::default()
        })
    }

    fn sample_results() -> StoredResults {
        let mut results = StoredResults::new();
        results.insert(3, json!({"aweme_list": [{"aweme_id": "3"}]}));
        results.insert(1, json!({"status_code": 0}));
        results
    }

    #[test]
    fn test_backup_path_derivation() {
        assert_eq!(
            backup_path_for(Path::new("data/sampled_results.parquet")),
            PathBuf::from("data/sampled_results_bckup.parquet")
        );
        assert_eq!(
            backup_path_for(Path::new("/tmp/store")),
            PathBuf::from("/tmp/store_bckup")
        );
    }

    /// Test the directory entry sync after rename
    ///
    /// Verifies that the parent of a nested store path and the working
    /// directory for a bare file name can both be flushed.
    #[test]
    fn test_sync_parent_dir_after_rename() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("results.parquet");
        fs::create_dir_all(nested.parent().unwrap()).unwrap();
        fs::write(&nested, b"x").unwrap();

        sync_parent_dir(&nested).unwrap();
        sync_parent_dir(Path::new("results.parquet")).unwrap();
    }

    #[test]
    fn test_missing_store_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_write_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let results = sample_results();

        let batch = to_record_batch(&results).unwrap();
        assert_eq!(store.write(&batch).unwrap(), 2);

        assert!(store.primary_path().exists());
        assert!(store.backup_path().exists());
        assert!(!temp_path_for(store.primary_path()).exists());

        assert_eq!(store.load().unwrap(), results);
        assert_eq!(read_results(store.backup_path()).unwrap(), Some(results));
    }

    /// Test recovery from the backup when the primary is corrupt
    #[test]
    fn test_corrupt_primary_falls_back_to_backup() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let results = sample_results();
        store.write(&to_record_batch(&results).unwrap()).unwrap();

        fs::write(store.primary_path(), b"not parquet").unwrap();
        assert_eq!(store.load().unwrap(), results);
    }

    #[test]
    fn test_unreadable_store_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        fs::write(store.primary_path(), b"garbage").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, ConfigError::StoreUnreadable { .. }));
    }

    #[test]
    fn test_stale_temp_files_removed() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let temp = temp_path_for(store.primary_path());
        fs::write(&temp, b"partial").unwrap();

        store.load().unwrap();
        assert!(!temp.exists());
    }

    #[test]
    fn test_load_seed_ids_from_string_column() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seed.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("aweme_id", DataType::Utf8, true),
            Field::new("desc", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![
                    Some("7246466967640198459"),
                    None,
                    Some("12"),
                ])),
                Arc::new(StringArray::from(vec![Some("a"), Some("b"), Some("c")])),
            ],
        )
        .unwrap();

        let file = File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ids = load_seed_ids(&path, "aweme_id").unwrap();
        assert_eq!(ids, vec![7_246_466_967_640_198_459, 12]);
        assert!(load_seed_ids(&path, "missing").is_err());
    }
}
