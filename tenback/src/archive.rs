//! Archive layout and packing.
//!
//! A backup archive is rooted at `{folder_key}/{run_date}/` on local disk and
//! contains one JSON envelope per collection, a `summary.json`, and a
//! `_files/{collection}/{record_id}/{filename}` tree of attachment bytes.
//! The zip is written with paths relative to the tenant root (entries start
//! with `{run_date}/`), so an extracted archive is self-describing.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use recbase::record::Record;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use zip::{ZipArchive, ZipWriter, write::SimpleFileOptions};

/// Archive format version written into every summary.
pub const BACKUP_VERSION: &str = "2.0";

/// Name of the per-archive summary document.
pub const SUMMARY_NAME: &str = "summary.json";

/// Subdirectory holding downloaded attachment bytes.
pub const FILES_DIR: &str = "_files";

/// Per-collection export envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionEnvelope {
    pub collection: String,
    /// Present for tenant-scoped collections; every record in `records`
    /// carries this value in its `ownerId` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub exported_at: String,
    pub count: usize,
    pub records: Vec<Record>,
}

impl CollectionEnvelope {
    pub fn new(collection: &str, owner_id: Option<&str>, records: Vec<Record>) -> Self {
        CollectionEnvelope {
            collection: collection.to_string(),
            owner_id: owner_id.map(str::to_string),
            exported_at: Utc::now().to_rfc3339(),
            count: records.len(),
            records,
        }
    }
}

/// Per-archive summary: provenance plus per-collection record counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSummary {
    pub tenant: String,
    pub owner_id: String,
    pub date: String,
    /// collection name -> exported record count
    pub collections: BTreeMap<String, usize>,
    pub files_count: u64,
    pub backup_version: String,
}

impl TenantSummary {
    pub fn new(tenant: &str, owner_id: &str, date: &str) -> Self {
        TenantSummary {
            tenant: tenant.to_string(),
            owner_id: owner_id.to_string(),
            date: date.to_string(),
            collections: BTreeMap::new(),
            files_count: 0,
            backup_version: BACKUP_VERSION.to_string(),
        }
    }

    pub fn total_records(&self) -> usize {
        self.collections.values().sum()
    }
}

/// Writes a collection envelope as `{collection}.json` under `dir`.
pub fn write_collection(dir: &Path, envelope: &CollectionEnvelope) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", envelope.collection));
    let text = serde_json::to_string_pretty(envelope)?;
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Writes `summary.json` under `dir`.
pub fn write_summary(dir: &Path, summary: &TenantSummary) -> Result<PathBuf> {
    let path = dir.join(SUMMARY_NAME);
    let text = serde_json::to_string_pretty(summary)?;
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Packages `src_dir` into a zip at `zip_path`, naming entries relative to
/// `arc_root`. Returns the zip size in bytes.
pub fn zip_dir(src_dir: &Path, zip_path: &Path, arc_root: &Path) -> Result<u64> {
    let file = fs::File::create(zip_path)
        .with_context(|| format!("creating archive {}", zip_path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let mut stack = vec![src_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let rel = path
                .strip_prefix(arc_root)
                .with_context(|| format!("archive file not under root: {}", path.display()))?;
            writer.start_file(rel.to_string_lossy().replace('\\', "/"), options)?;
            let bytes = fs::read(&path)?;
            writer.write_all(&bytes)?;
        }
    }
    writer.finish()?;
    Ok(fs::metadata(zip_path)?.len())
}

/// Extracts a zip archive into a scoped temporary directory.
///
/// The directory is removed when the returned handle drops, on every exit
/// path, so restore never leaves scratch space behind.
pub fn extract_to_temp(zip_path: &Path) -> Result<TempDir> {
    let temp = tempfile::Builder::new().prefix("tenback_restore_").tempdir()?;
    let file = fs::File::open(zip_path)
        .with_context(|| format!("opening archive {}", zip_path.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("reading archive {}", zip_path.display()))?;
    zip.extract(temp.path())
        .with_context(|| format!("extracting {}", zip_path.display()))?;
    Ok(temp)
}

/// Locates `summary.json` anywhere under `root`. Returns the directory that
/// holds it (the archive's data directory), or None.
pub fn find_data_dir(root: &Path) -> Option<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let candidate = dir.join(SUMMARY_NAME);
        if candidate.is_file() {
            return Some(dir);
        }
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            }
        }
    }
    None
}

/// Locates a directory under `root` holding at least one `*.json` file.
/// Fallback for archives that carry no summary document.
pub fn find_collection_dir(root: &Path) -> Option<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "json") {
                return Some(dir);
            }
        }
    }
    None
}

/// Reads and parses the summary in `data_dir`.
pub fn read_summary(data_dir: &Path) -> Result<TenantSummary> {
    let path = data_dir.join(SUMMARY_NAME);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Lists the collection envelope files in `data_dir`: every `*.json` except
/// the summary, sorted by name.
pub fn collection_files(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && name.ends_with(".json") && name != SUMMARY_NAME {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parses one collection envelope file.
pub fn read_envelope(path: &Path) -> Result<CollectionEnvelope> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// One attachment present in an extracted archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub collection: String,
    pub record_id: String,
    pub filename: String,
}

/// Enumerates attachments under `{data_dir}/_files/{collection}/{record_id}/{filename}`.
pub fn list_attachments(data_dir: &Path) -> Result<Vec<AttachmentRef>> {
    let files_dir = data_dir.join(FILES_DIR);
    let mut refs = Vec::new();
    if !files_dir.is_dir() {
        return Ok(refs);
    }
    for col_entry in fs::read_dir(&files_dir)? {
        let col_dir = col_entry?.path();
        if !col_dir.is_dir() {
            continue;
        }
        let collection = dir_name(&col_dir)?;
        for rec_entry in fs::read_dir(&col_dir)? {
            let rec_dir = rec_entry?.path();
            if !rec_dir.is_dir() {
                continue;
            }
            let record_id = dir_name(&rec_dir)?;
            for file_entry in fs::read_dir(&rec_dir)? {
                let file_path = file_entry?.path();
                if file_path.is_file() {
                    refs.push(AttachmentRef {
                        collection: collection.clone(),
                        record_id: record_id.clone(),
                        filename: dir_name(&file_path)?,
                    });
                }
            }
        }
    }
    refs.sort_by(|a, b| {
        (&a.collection, &a.record_id, &a.filename).cmp(&(&b.collection, &b.record_id, &b.filename))
    });
    Ok(refs)
}

fn dir_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("non-utf8 path in archive: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_records(owner: &str, n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                serde_json::from_value(json!({
                    "id": format!("rec{i:04}"),
                    "ownerId": owner,
                    "qty": i,
                }))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn envelope_counts_match_records() {
        let envelope = CollectionEnvelope::new("inventory", Some("owner001"), sample_records("owner001", 3));
        assert_eq!(envelope.count, envelope.records.len());
        assert_eq!(envelope.owner_id.as_deref(), Some("owner001"));
    }

    #[test]
    fn zip_round_trip_preserves_layout() {
        let temp = tempfile::tempdir().unwrap();
        let tenant_root = temp.path().join("Toko_1_abcd1234");
        let data_dir = tenant_root.join("2026-08-27_0300");

        let envelope =
            CollectionEnvelope::new("inventory", Some("owner001"), sample_records("owner001", 2));
        write_collection(&data_dir, &envelope).unwrap();
        let mut summary = TenantSummary::new("Toko 1", "owner001", "2026-08-27_0300");
        summary.collections.insert("inventory".into(), 2);
        write_summary(&data_dir, &summary).unwrap();

        let files_dir = data_dir.join(FILES_DIR).join("users").join("rec0001");
        fs::create_dir_all(&files_dir).unwrap();
        fs::write(files_dir.join("avatar.png"), b"png-bytes").unwrap();

        let zip_path = tenant_root.join("backup_2026-08-27_0300.zip");
        let size = zip_dir(&data_dir, &zip_path, &tenant_root).unwrap();
        assert!(size > 0);

        let extracted = extract_to_temp(&zip_path).unwrap();
        let data = find_data_dir(extracted.path()).expect("summary found");
        // archive-internal paths are relative to the tenant root
        assert!(data.ends_with("2026-08-27_0300"));

        let summary = read_summary(&data).unwrap();
        assert_eq!(summary.owner_id, "owner001");
        assert_eq!(summary.backup_version, BACKUP_VERSION);
        assert_eq!(summary.total_records(), 2);

        let cols = collection_files(&data).unwrap();
        assert_eq!(cols.len(), 1);
        let envelope = read_envelope(&cols[0]).unwrap();
        assert_eq!(envelope.collection, "inventory");
        assert_eq!(envelope.count, 2);
        assert!(
            envelope
                .records
                .iter()
                .all(|r| r.get_str("ownerId") == Some("owner001"))
        );

        let attachments = list_attachments(&data).unwrap();
        assert_eq!(
            attachments,
            [AttachmentRef {
                collection: "users".into(),
                record_id: "rec0001".into(),
                filename: "avatar.png".into(),
            }]
        );
    }

    #[test]
    fn missing_summary_yields_none() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("sub")).unwrap();
        assert!(find_data_dir(temp.path()).is_none());
    }

    #[test]
    fn collection_dir_fallback_finds_json() {
        let temp = tempfile::tempdir().unwrap();
        let data_dir = temp.path().join("2026-08-27_0300");
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("inventory.json"), b"{}").unwrap();
        assert_eq!(find_collection_dir(temp.path()), Some(data_dir));

        let empty = tempfile::tempdir().unwrap();
        fs::create_dir_all(empty.path().join("nothing/here")).unwrap();
        assert!(find_collection_dir(empty.path()).is_none());
    }
}
