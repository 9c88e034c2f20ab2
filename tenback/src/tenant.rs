//! Tenant partitioning: folder keys and per-tenant archive builds.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use recbase::{client::RecbaseClient, record::Record};
use tracing::{debug, info, warn};

use crate::{
    archive::{self, CollectionEnvelope, FILES_DIR, TenantSummary},
    collections::{TENANT_COLLECTIONS, file_fields},
    config::BackupConfig,
};

/// Derives a stable, filesystem-safe folder key for a tenant.
///
/// The display name (falling back to the raw id) is sanitized by keeping
/// alphanumerics, dot, underscore, hyphen, and space; everything else becomes
/// an underscore. Spaces then become underscores, runs of underscores
/// collapse to one, and the first 8 characters of the tenant id are appended.
/// Human-legible, collision-resistant, but not collision-proof: two tenants
/// whose names sanitize identically and whose id prefixes match would share
/// a remote folder.
pub fn derive_folder_key(display_name: Option<&str>, id: &str) -> String {
    let name = display_name.filter(|s| !s.is_empty()).unwrap_or(id);
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut key = String::with_capacity(safe.len() + 9);
    let mut last_underscore = false;
    for c in safe.trim().chars() {
        let c = if c == ' ' { '_' } else { c };
        if c == '_' && last_underscore {
            continue;
        }
        last_underscore = c == '_';
        key.push(c);
    }
    key.push('_');
    key.extend(id.chars().take(8));
    key
}

/// Result of one tenant's archive build.
#[derive(Debug)]
pub struct TenantArchive {
    pub folder_key: String,
    pub zip_path: PathBuf,
    pub zip_name: String,
    pub summary: TenantSummary,
}

/// The display name used for a tenant in logs and summaries:
/// `name`, else `storeName`, else the raw id.
pub fn tenant_display_name(owner: &Record) -> String {
    owner
        .get_str("name")
        .or_else(|| owner.get_str("storeName"))
        .or_else(|| owner.id())
        .unwrap_or("(unknown)")
        .to_string()
}

/// Exports everything one tenant owns into `{work_dir}/{folder_key}/{run_date}/`
/// and packages it as `backup_{run_date}.zip`.
///
/// Per-collection fetch and per-file download failures are tolerated; only
/// filesystem problems (cannot write the archive) are errors.
pub async fn backup_tenant(
    client: &RecbaseClient,
    config: &BackupConfig,
    owner: &Record,
    run_date: &str,
) -> Result<TenantArchive> {
    let oid = owner
        .id()
        .ok_or_else(|| anyhow!("owner record without id"))?;
    let oname = tenant_display_name(owner);
    let folder_key = derive_folder_key(Some(&oname), oid);

    let tenant_root = config.work_dir.join(&folder_key);
    let data_dir = tenant_root.join(run_date);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    info!(tenant = %oname, owner = oid, key = %folder_key, "backing up tenant");

    let mut summary = TenantSummary::new(&oname, oid, run_date);
    let filter = format!(r#"ownerId = "{oid}""#);
    let mut total_files = 0u64;

    for collection in TENANT_COLLECTIONS {
        let fetched = client.fetch_all(collection, Some(&filter)).await;
        if !fetched.complete {
            warn!(collection, "collection export is partial");
        }
        let envelope = CollectionEnvelope::new(collection, Some(oid), fetched.records);
        summary
            .collections
            .insert((*collection).to_string(), envelope.count);
        debug!(collection, count = envelope.count, "exported");

        if config.include_files && !envelope.records.is_empty() {
            let fields = file_fields(collection);
            if !fields.is_empty() {
                let count = save_attachments(
                    &envelope.records,
                    collection,
                    fields,
                    &data_dir,
                    async |coll_id, record_id, name| {
                        client.download_file(coll_id, record_id, name).await.ok()
                    },
                )
                .await?;
                if count > 0 {
                    debug!(collection, count, "attachments downloaded");
                    total_files += count;
                }
            }
        }
        archive::write_collection(&data_dir, &envelope)?;
    }

    summary.files_count = total_files;
    archive::write_summary(&data_dir, &summary)?;

    let zip_name = format!("backup_{run_date}.zip");
    let zip_path = tenant_root.join(&zip_name);
    let size = archive::zip_dir(&data_dir, &zip_path, &tenant_root)?;
    info!(
        zip = %zip_name,
        kb = size / 1024,
        files = total_files,
        records = summary.total_records(),
        "tenant archive written"
    );

    Ok(TenantArchive {
        folder_key,
        zip_path,
        zip_name,
        summary,
    })
}

/// Downloads every attachment referenced by `records` file fields into
/// `{data_dir}/_files/{collection}/{record_id}/{filename}`.
///
/// A failed download is skipped and omitted from the count; it never affects
/// sibling records or aborts the export.
pub async fn save_attachments<F>(
    records: &[Record],
    collection: &str,
    fields: &[&str],
    data_dir: &Path,
    mut download: F,
) -> Result<u64>
where
    F: AsyncFnMut(&str, &str, &str) -> Option<bytes::Bytes>,
{
    let files_dir = data_dir.join(FILES_DIR).join(collection);
    let mut count = 0u64;
    for record in records {
        let Some(record_id) = record.id() else {
            continue;
        };
        // attachment urls use the collection id when the record carries one
        let coll_id = record.collection_id().unwrap_or(collection);
        for field in fields {
            for name in record.file_names(field) {
                match download(coll_id, record_id, name).await {
                    Some(data) => {
                        let dest = files_dir.join(record_id).join(name);
                        if let Some(parent) = dest.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        std::fs::write(&dest, &data)
                            .with_context(|| format!("writing {}", dest.display()))?;
                        count += 1;
                    }
                    None => {
                        warn!(collection, record_id, name, "attachment download failed, skipping");
                    }
                }
            }
        }
    }
    Ok(count)
}
