//! Restore: replays archived records back into the store.
//!
//! Restore is an idempotent upsert keyed on record identity. Each archived
//! record is looked up by id; a hit becomes a partial update with system
//! fields stripped, a miss becomes a create that carries the original id
//! forward. Running the same archive twice converges instead of duplicating.
//! Attachments are inventoried and reported but never re-uploaded.

use std::{
    io::BufRead,
    path::Path,
};

use anyhow::{Result, anyhow};
use recbase::{client::RecbaseClient, record::Record};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    archive,
    orchestrator::FULLDB_FOLDER,
    remote::{RemoteSync, SyncRunner, latest_backup},
};

/// Store mutations needed by restore, as a seam so the replay logic is
/// testable against an in-memory double.
pub trait RecordStore {
    fn lookup(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = recbase::Result<Option<Record>>>;

    fn create(
        &self,
        collection: &str,
        body: &Map<String, Value>,
    ) -> impl Future<Output = recbase::Result<Record>>;

    fn update(
        &self,
        collection: &str,
        id: &str,
        body: &Map<String, Value>,
    ) -> impl Future<Output = recbase::Result<Record>>;
}

impl RecordStore for RecbaseClient {
    async fn lookup(&self, collection: &str, id: &str) -> recbase::Result<Option<Record>> {
        self.get_record(collection, id).await
    }

    async fn create(&self, collection: &str, body: &Map<String, Value>) -> recbase::Result<Record> {
        self.create_record(collection, body).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: &Map<String, Value>,
    ) -> recbase::Result<Record> {
        self.update_record(collection, id, body).await
    }
}

/// Counters accumulated across one restore pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreTotals {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl RestoreTotals {
    pub fn add(&mut self, other: RestoreTotals) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }

    pub fn render(&self) -> String {
        format!(
            "created: {}  updated: {}  skipped: {}  errors: {}",
            self.created, self.updated, self.skipped, self.errors
        )
    }
}

/// Upserts a batch of archived records into one collection.
///
/// Records without an id cannot be matched to an identity and are skipped.
/// In dry-run mode the store is never contacted; every restorable record is
/// counted as it would be created.
pub async fn restore_records<S: RecordStore>(
    store: &S,
    collection: &str,
    records: &[Record],
    dry_run: bool,
) -> RestoreTotals {
    let mut totals = RestoreTotals::default();
    for record in records {
        let Some(id) = record.id() else {
            warn!(collection, "archived record without id, skipping");
            totals.skipped += 1;
            continue;
        };
        if dry_run {
            debug!(collection, id, "would restore");
            totals.created += 1;
            continue;
        }
        match store.lookup(collection, id).await {
            Ok(Some(_)) => match store.update(collection, id, &record.user_fields()).await {
                Ok(_) => totals.updated += 1,
                Err(err) => {
                    warn!(collection, id, %err, "update failed");
                    totals.errors += 1;
                }
            },
            Ok(None) => match store.create(collection, &record.create_body()).await {
                Ok(_) => totals.created += 1,
                Err(err) => {
                    warn!(collection, id, %err, "create failed");
                    totals.errors += 1;
                }
            },
            Err(err) => {
                warn!(collection, id, %err, "lookup failed");
                totals.errors += 1;
            }
        }
    }
    totals
}

/// Restores every collection in a local archive file.
///
/// The archive is extracted into a scoped temp directory that is removed on
/// every exit path. Attachments found in the archive are counted and reported
/// but not pushed back to the store.
pub async fn restore_from_archive<S: RecordStore>(
    store: &S,
    zip_path: &Path,
    dry_run: bool,
) -> Result<RestoreTotals> {
    let extracted = archive::extract_to_temp(zip_path)?;
    // the summary identifies provenance but never gates the restore
    let data_dir = if let Some(dir) = archive::find_data_dir(extracted.path()) {
        match archive::read_summary(&dir) {
            Ok(summary) => info!(
                tenant = %summary.tenant,
                owner = %summary.owner_id,
                date = %summary.date,
                records = summary.total_records(),
                "restoring archive"
            ),
            Err(err) => warn!(%err, "archive summary unreadable, continuing"),
        }
        dir
    } else {
        warn!("archive has no summary.json, restoring every collection file found");
        archive::find_collection_dir(extracted.path())
            .ok_or_else(|| anyhow!("no collection files in {}", zip_path.display()))?
    };

    let mut totals = RestoreTotals::default();
    for path in archive::collection_files(&data_dir)? {
        let envelope = archive::read_envelope(&path)?;
        let result =
            restore_records(store, &envelope.collection, &envelope.records, dry_run).await;
        info!(
            collection = %envelope.collection,
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            errors = result.errors,
            "collection restored"
        );
        totals.add(result);
    }

    let attachments = archive::list_attachments(&data_dir)?;
    if !attachments.is_empty() {
        info!(
            count = attachments.len(),
            "archive holds attachments; file re-upload is manual"
        );
    }
    Ok(totals)
}

/// Restores the latest archive of every tenant folder on the remote,
/// optionally narrowed to folders whose name contains `tenant_filter`.
/// System folders (underscore prefix) are never touched.
pub async fn restore_latest<S: RecordStore, R: SyncRunner>(
    store: &S,
    sync: &RemoteSync<R>,
    tenant_filter: Option<&str>,
    dry_run: bool,
) -> Result<RestoreTotals> {
    let folders: Vec<String> = sync
        .list_dirs("")
        .await
        .into_iter()
        .filter(|name| !name.starts_with('_'))
        .filter(|name| tenant_filter.is_none_or(|f| name.contains(f)))
        .collect();
    if folders.is_empty() {
        return Err(anyhow!("no matching tenant folders on the remote"));
    }

    let scratch = tempfile::Builder::new().prefix("tenback_fetch_").tempdir()?;
    let mut totals = RestoreTotals::default();
    for folder in &folders {
        let files = sync.list_files(folder).await;
        let Some(latest) = latest_backup(&files) else {
            warn!(folder, "no backup archive in tenant folder, skipping");
            continue;
        };
        info!(folder, archive = %latest.name, "fetching latest archive");
        // one tenant's failed download never blocks the remaining tenants
        if !sync.download(folder, &latest.name, scratch.path()).await {
            warn!(folder, archive = %latest.name, "download failed, skipping tenant");
            totals.errors += 1;
            continue;
        }
        let local = scratch.path().join(&latest.name);
        totals.add(restore_from_archive(store, &local, dry_run).await?);
    }
    Ok(totals)
}

/// Reads the typed confirmation required before a full-database restore.
/// Only the exact word `RESTORE` proceeds; there is no bypass flag.
pub fn confirm_restore(input: &mut impl BufRead) -> bool {
    let mut line = String::new();
    input.read_line(&mut line).unwrap_or(0);
    line.trim() == "RESTORE"
}

/// Uploads the most recent full-database snapshot from `_fulldb` back to the
/// server's snapshot endpoint. Applying it is a server-side operation, so
/// this prints the final instruction instead of pretending to finish.
pub async fn restore_full_db<R: SyncRunner>(
    client: &RecbaseClient,
    sync: &RemoteSync<R>,
    dry_run: bool,
) -> Result<()> {
    let files = sync.list_files(FULLDB_FOLDER).await;
    let latest = files
        .iter()
        .find(|f| f.name.ends_with(".zip"))
        .ok_or_else(|| anyhow!("no snapshot found under {FULLDB_FOLDER}"))?;
    println!(
        "Latest full snapshot: {} ({} KB)",
        latest.name,
        latest.size / 1024
    );
    if dry_run {
        println!("Dry run: snapshot not uploaded.");
        return Ok(());
    }

    println!("This uploads the snapshot over the live database's backup slot.");
    println!("Type RESTORE to continue:");
    if !confirm_restore(&mut std::io::stdin().lock()) {
        return Err(anyhow!("confirmation not given, aborting"));
    }

    let scratch = tempfile::Builder::new().prefix("tenback_fetch_").tempdir()?;
    if !sync.download(FULLDB_FOLDER, &latest.name, scratch.path()).await {
        return Err(anyhow!("download of {} failed", latest.name));
    }
    let local = scratch.path().join(&latest.name);
    client.upload_snapshot(&local).await?;
    println!("Snapshot {} uploaded. Apply it with:", latest.name);
    println!(
        "  {}",
        restore_endpoint_command(&client.get_config().base_url, &latest.name)
    );
    Ok(())
}

/// The server-side call that applies an uploaded snapshot. Applying is the
/// irreversible step, so it is printed for the operator, never invoked here.
fn restore_endpoint_command(base_url: &str, name: &str) -> String {
    format!(
        "curl -X POST {base_url}/api/backups/{name}/restore -H \"Authorization: <admin token>\""
    )
}

/// Prints the newest archives per remote folder.
pub async fn list_backups<R: SyncRunner>(sync: &RemoteSync<R>) -> Result<()> {
    let folders = sync.list_dirs("").await;
    if folders.is_empty() {
        return Err(anyhow!("no folders on the remote (or remote unreachable)"));
    }
    for folder in &folders {
        println!("{folder}/");
        let files = sync.list_files(folder).await;
        for file in files.iter().take(5) {
            println!("  {:>10} KB  {}", file.size / 1024, file.name);
        }
        if files.len() > 5 {
            println!("  ... {} more", files.len() - 5);
        }
    }
    Ok(())
}
