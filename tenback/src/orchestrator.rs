//! Backup run orchestration.
//!
//! A run is a single linear pass: full-database snapshot, global collections,
//! every tenant in turn, local retention cleanup, then the report and an
//! aggregate notification. Failures accumulate into the run summary's error
//! list and never abort later stages; only preconditions (config, login,
//! rclone) are fatal and handled before this module is reached.

use std::{
    path::Path,
    time::{Duration, Instant, SystemTime},
};

use anyhow::{Context, Result};
use chrono::Local;
use recbase::{client::RecbaseClient, snapshot::snapshot_name_now};
use tracing::{error, info, warn};

use crate::{
    archive::{self, CollectionEnvelope},
    collections::{GLOBAL_COLLECTIONS, file_fields},
    config::BackupConfig,
    notify,
    remote::{RemoteSync, SyncRunner},
    report::{Outcome, RunSummary, TenantResult},
    tenant::{self, tenant_display_name},
};

/// Remote subfolder for server-side full snapshots.
pub const FULLDB_FOLDER: &str = "_fulldb";

/// Remote subfolder for the global (non-tenant) collections archive.
pub const GLOBAL_FOLDER: &str = "_global";

/// Timestamp used for this run's archive names: `YYYY-mm-dd_HHMM`
pub fn run_date_now() -> String {
    Local::now().format("%Y-%m-%d_%H%M").to_string()
}

/// Drives a full backup run. Returns the aggregated summary; the caller maps
/// `has_errors()` onto the process exit code.
pub async fn run_backup<R: SyncRunner>(
    client: &RecbaseClient,
    config: &BackupConfig,
    sync: &RemoteSync<R>,
) -> Result<RunSummary> {
    let started = Instant::now();
    let run_date = run_date_now();
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("creating work dir {}", config.work_dir.display()))?;

    let mut summary = RunSummary::default();

    if config.include_full_snapshot {
        info!("--- full database snapshot ---");
        full_snapshot_stage(client, config, sync, &mut summary).await;
    }

    info!("--- global collections ---");
    global_stage(client, config, sync, &run_date, &mut summary).await;

    info!("--- per-tenant backup ---");
    tenant_stage(client, config, sync, &run_date, &mut summary).await;

    let cutoff = SystemTime::now() - Duration::from_secs(config.keep_local_days * 86_400);
    let removed = cleanup_older_than(&config.work_dir, cutoff);
    if removed > 0 {
        info!(
            removed,
            days = config.keep_local_days,
            "cleaned up old local files"
        );
    }
    prune_empty_dirs(&config.work_dir);

    let elapsed = started.elapsed();
    println!("{}", summary.render(elapsed));

    if summary.has_errors() {
        notify::send_webhook(
            config,
            &format!("Backup finished with {} errors", summary.errors.len()),
            &summary.notification_body(&run_date, elapsed),
            true,
        )
        .await;
    } else {
        notify::send_webhook(
            config,
            "Backup OK",
            &summary.notification_body(&run_date, elapsed),
            false,
        )
        .await;
    }
    Ok(summary)
}

/// Stage 1: trigger a server-side snapshot, download it, upload to `_fulldb`.
async fn full_snapshot_stage<R: SyncRunner>(
    client: &RecbaseClient,
    config: &BackupConfig,
    sync: &RemoteSync<R>,
    summary: &mut RunSummary,
) {
    let name = snapshot_name_now();
    let local_path = config.work_dir.join(FULLDB_FOLDER).join(&name);
    let result: Result<()> = async {
        client.create_snapshot(&name).await?;
        let data = client.download_snapshot(&name).await?;
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&local_path, &data)?;
        info!(name = %name, kb = data.len() / 1024, "full snapshot downloaded");
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            if !sync.upload(&local_path, FULLDB_FOLDER).await {
                summary.record_error("Upload of full database snapshot failed");
            }
        }
        Err(err) => {
            warn!(%err, "full snapshot failed");
            summary.record_error(format!("Full database snapshot failed: {err:#}"));
        }
    }
}

/// Stage 2: export global collections into one shared archive and upload it.
async fn global_stage<R: SyncRunner>(
    client: &RecbaseClient,
    config: &BackupConfig,
    sync: &RemoteSync<R>,
    run_date: &str,
    summary: &mut RunSummary,
) {
    let global_root = config.work_dir.join(GLOBAL_FOLDER);
    let data_dir = global_root.join(run_date);

    let result: Result<std::path::PathBuf> = async {
        std::fs::create_dir_all(&data_dir)?;
        let mut summary_doc = archive::TenantSummary::new(GLOBAL_FOLDER, "", run_date);
        for collection in GLOBAL_COLLECTIONS {
            let fetched = client.fetch_all(collection, None).await;
            let envelope = CollectionEnvelope::new(collection, None, fetched.records);
            info!(collection, count = envelope.count, "global collection exported");
            summary_doc
                .collections
                .insert((*collection).to_string(), envelope.count);

            if config.include_files && !envelope.records.is_empty() {
                let fields = file_fields(collection);
                if !fields.is_empty() {
                    summary_doc.files_count += tenant::save_attachments(
                        &envelope.records,
                        collection,
                        fields,
                        &data_dir,
                        async |coll_id, record_id, name| {
                            client.download_file(coll_id, record_id, name).await.ok()
                        },
                    )
                    .await?;
                }
            }
            archive::write_collection(&data_dir, &envelope)?;
        }
        archive::write_summary(&data_dir, &summary_doc)?;
        let zip_path = global_root.join(format!("backup_{run_date}.zip"));
        archive::zip_dir(&data_dir, &zip_path, &global_root)?;
        Ok(zip_path)
    }
    .await;

    match result {
        Ok(zip_path) => {
            if !sync.upload(&zip_path, GLOBAL_FOLDER).await {
                summary.record_error("Upload of global collections archive failed");
            }
        }
        Err(err) => {
            warn!(%err, "global collections export failed");
            summary.record_error(format!("Global collections export failed: {err:#}"));
        }
    }
}

/// Stage 3: one archive per tenant. A per-tenant failure is recorded and the
/// loop continues with the next tenant.
async fn tenant_stage<R: SyncRunner>(
    client: &RecbaseClient,
    config: &BackupConfig,
    sync: &RemoteSync<R>,
    run_date: &str,
    summary: &mut RunSummary,
) {
    let owners = client.fetch_all("owners", None).await;
    if !owners.complete {
        summary.record_error("Tenant list fetch was incomplete; some tenants may be missing");
    }
    info!(count = owners.records.len(), "tenants found");

    for owner in &owners.records {
        let oname = tenant_display_name(owner);
        match tenant::backup_tenant(client, config, owner, run_date).await {
            Ok(built) => {
                let ok = sync.upload(&built.zip_path, &built.folder_key).await;
                if ok && !sync.verify(&built.folder_key, &built.zip_name).await {
                    warn!(tenant = %oname, "upload verification failed");
                }
                let outcome = if ok { Outcome::Ok } else { Outcome::Failed };
                if !ok {
                    summary.record_error(format!("Upload for tenant '{oname}' failed"));
                }
                summary
                    .results
                    .push(TenantResult::from_summary(&built.summary, outcome));
            }
            Err(err) => {
                error!(tenant = %oname, ?err, "tenant backup error");
                summary.record_error(format!("Backup of tenant '{oname}' error: {err:#}"));
                summary.results.push(TenantResult {
                    tenant: oname,
                    owner_id: owner.id().unwrap_or_default().to_string(),
                    outcome: Outcome::Error,
                    records: 0,
                    files: 0,
                });
            }
        }
    }
}

/// Stage 4a: removes files under `dir` with a modification time before
/// `cutoff`. Unreadable entries are skipped; returns the number removed.
pub fn cleanup_older_than(dir: &Path, cutoff: SystemTime) -> usize {
    let mut removed = 0;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let Some(mtime) = entry.metadata().and_then(|m| m.modified()).ok() else {
                continue;
            };
            if mtime < cutoff && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
    }
    removed
}

/// Stage 4b: removes now-empty directories under `dir`, bottom-up. The root
/// itself is kept. Not transactional: a crash can leave stale empty
/// directories, which the next run picks up.
pub fn prune_empty_dirs(dir: &Path) {
    let mut dirs = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path.clone());
                stack.push(path);
            }
        }
    }
    // deepest first
    dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    for d in dirs {
        let is_empty = std::fs::read_dir(&d)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            let _ = std::fs::remove_dir(&d);
        }
    }
}
