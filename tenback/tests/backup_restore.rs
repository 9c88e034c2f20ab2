//! End-to-end archive round trip: build a tenant archive on disk, zip it,
//! then replay it into an in-memory store and check convergence.

use std::{collections::HashMap, sync::Mutex};

use recbase::record::Record;
use serde_json::{Map, Value, json};
use tenback::{
    archive::{self, CollectionEnvelope, TenantSummary},
    restore::{self, RecordStore, RestoreTotals},
    tenant::derive_folder_key,
};

#[derive(Default)]
struct MemStore {
    records: Mutex<HashMap<(String, String), Map<String, Value>>>,
}

impl MemStore {
    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl RecordStore for MemStore {
    async fn lookup(&self, collection: &str, id: &str) -> recbase::Result<Option<Record>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(collection.to_string(), id.to_string()))
            .map(|m| Record(m.clone())))
    }

    async fn create(
        &self,
        collection: &str,
        body: &Map<String, Value>,
    ) -> recbase::Result<Record> {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("generated")
            .to_string();
        self.records
            .lock()
            .unwrap()
            .insert((collection.to_string(), id), body.clone());
        Ok(Record(body.clone()))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: &Map<String, Value>,
    ) -> recbase::Result<Record> {
        let mut records = self.records.lock().unwrap();
        let entry = records
            .get_mut(&(collection.to_string(), id.to_string()))
            .expect("update of missing record");
        for (k, v) in body {
            entry.insert(k.clone(), v.clone());
        }
        Ok(Record(entry.clone()))
    }
}

fn record(value: Value) -> Record {
    serde_json::from_value(value).unwrap()
}

/// Builds an archive the way a backup run lays it out, including attachments.
fn build_archive(root: &std::path::Path) -> std::path::PathBuf {
    let run_date = "2026-08-27_0300";
    let owner_id = "own4567890ab";
    let folder_key = derive_folder_key(Some("Jaya Phone"), owner_id);
    assert_eq!(folder_key, "Jaya_Phone_own45678");

    let tenant_root = root.join(&folder_key);
    let data_dir = tenant_root.join(run_date);

    let inventory = CollectionEnvelope::new(
        "inventory",
        Some(owner_id),
        vec![
            record(json!({
                "id": "inv00001",
                "created": "2026-01-01 00:00:00",
                "updated": "2026-01-01 00:00:00",
                "ownerId": owner_id,
                "name": "charger",
                "qty": 7,
            })),
            record(json!({
                "id": "inv00002",
                "ownerId": owner_id,
                "name": "case",
                "qty": 2,
            })),
        ],
    );
    archive::write_collection(&data_dir, &inventory).unwrap();

    let users = CollectionEnvelope::new(
        "users",
        Some(owner_id),
        vec![record(json!({
            "id": "usr00001",
            "collectionId": "col_users",
            "ownerId": owner_id,
            "name": "Kasir",
            "avatar": "face.png",
        }))],
    );
    archive::write_collection(&data_dir, &users).unwrap();

    let avatar = data_dir.join("_files/users/usr00001/face.png");
    std::fs::create_dir_all(avatar.parent().unwrap()).unwrap();
    std::fs::write(&avatar, b"png-bytes").unwrap();

    let mut summary = TenantSummary::new("Jaya Phone", owner_id, run_date);
    summary.collections.insert("inventory".into(), 2);
    summary.collections.insert("users".into(), 1);
    summary.files_count = 1;
    archive::write_summary(&data_dir, &summary).unwrap();

    let zip_path = tenant_root.join(format!("backup_{run_date}.zip"));
    archive::zip_dir(&data_dir, &zip_path, &tenant_root).unwrap();
    zip_path
}

#[test_log::test(tokio::test)]
async fn archive_round_trip_converges() {
    let temp = tempfile::tempdir().unwrap();
    let zip_path = build_archive(temp.path());

    let store = MemStore::default();

    // first pass into an empty store: everything is created
    let first = restore::restore_from_archive(&store, &zip_path, false)
        .await
        .unwrap();
    assert_eq!(
        first,
        RestoreTotals {
            created: 3,
            updated: 0,
            skipped: 0,
            errors: 0
        }
    );
    assert_eq!(store.len(), 3);

    // identity survived the round trip
    let rec = store.lookup("inventory", "inv00001").await.unwrap().unwrap();
    assert_eq!(rec.get("qty"), Some(&json!(7)));
    // system timestamps were stripped before the create
    assert_eq!(rec.get("created"), None);

    // second pass: same identities resolve to updates, nothing duplicates
    let second = restore::restore_from_archive(&store, &zip_path, false)
        .await
        .unwrap();
    assert_eq!(
        second,
        RestoreTotals {
            created: 0,
            updated: 3,
            skipped: 0,
            errors: 0
        }
    );
    assert_eq!(store.len(), 3);
}

#[test_log::test(tokio::test)]
async fn dry_run_reports_without_writing() {
    let temp = tempfile::tempdir().unwrap();
    let zip_path = build_archive(temp.path());

    let store = MemStore::default();
    let totals = restore::restore_from_archive(&store, &zip_path, true)
        .await
        .unwrap();
    assert_eq!(totals.created, 3);
    assert_eq!(totals.errors, 0);
    assert_eq!(store.len(), 0);
}
