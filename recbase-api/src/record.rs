//! Record container model.
//!
//! A [`Record`] is an ordered mapping of field name to JSON value, as returned
//! by the store. A small closed set of *system fields* (identity, timestamps,
//! collection linkage) is distinguished from arbitrary tenant-defined fields,
//! so that restore can strip system fields as a pure function.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields managed by the store itself. These are never sent back on update,
/// and only `id` is carried forward on create.
pub const SYSTEM_FIELDS: &[&str] = &[
    "id",
    "created",
    "updated",
    "collectionId",
    "collectionName",
    "expand",
];

/// True if `name` is one of the store-managed system fields.
pub fn is_system_field(name: &str) -> bool {
    SYSTEM_FIELDS.contains(&name)
}

/// A single record: an ordered field-name -> value mapping.
///
/// Field order is preserved on round-trip (serde_json `preserve_order`),
/// so exported JSON matches what the store returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    /// The record's stable identity, if present.
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// The id of the collection this record belongs to, if present.
    pub fn collection_id(&self) -> Option<&str> {
        self.0.get("collectionId").and_then(Value::as_str)
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns a string field value, treating empty strings as absent.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Filenames referenced by a file field.
    ///
    /// File field values are either a single filename string or an ordered
    /// array of filename strings. Empty and non-string entries are skipped.
    pub fn file_names(&self, field: &str) -> Vec<&str> {
        match self.0.get(field) {
            Some(Value::String(name)) if !name.is_empty() => vec![name.as_str()],
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| !name.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the record with all system fields removed, preserving the
    /// order of the remaining tenant-defined fields.
    pub fn user_fields(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(name, _)| !is_system_field(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// `user_fields()` plus the original identity, used when re-creating a
    /// record that no longer exists in the store.
    pub fn create_body(&self) -> Map<String, Value> {
        let mut body = self.user_fields();
        if let Some(id) = self.id() {
            body.insert("id".to_string(), Value::String(id.to_string()));
        }
        body
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Record {
        serde_json::from_value(json!({
            "id": "rec12345",
            "collectionId": "col_users",
            "collectionName": "users",
            "created": "2026-01-01 00:00:00",
            "updated": "2026-01-02 00:00:00",
            "name": "Alice",
            "ownerId": "owner001",
            "avatar": "photo.png",
        }))
        .expect("record")
    }

    #[test]
    fn identity_and_collection() {
        let rec = sample();
        assert_eq!(rec.id(), Some("rec12345"));
        assert_eq!(rec.collection_id(), Some("col_users"));
    }

    #[test]
    fn strip_system_fields_is_pure_and_ordered() {
        let rec = sample();
        let user = rec.user_fields();
        assert!(!user.contains_key("id"));
        assert!(!user.contains_key("created"));
        assert!(!user.contains_key("updated"));
        assert!(!user.contains_key("collectionId"));
        assert!(!user.contains_key("collectionName"));
        let keys: Vec<&String> = user.keys().collect();
        assert_eq!(keys, ["name", "ownerId", "avatar"]);
        // original record untouched
        assert_eq!(rec.id(), Some("rec12345"));
    }

    #[test]
    fn create_body_carries_id_forward() {
        let rec = sample();
        let body = rec.create_body();
        assert_eq!(body.get("id"), Some(&json!("rec12345")));
        assert!(!body.contains_key("created"));
    }

    #[test]
    fn file_names_single_and_list() {
        let rec: Record = serde_json::from_value(json!({
            "id": "r1",
            "avatar": "a.png",
            "gallery": ["b.png", "", "c.jpg"],
            "empty": "",
            "number": 7,
        }))
        .unwrap();
        assert_eq!(rec.file_names("avatar"), ["a.png"]);
        assert_eq!(rec.file_names("gallery"), ["b.png", "c.jpg"]);
        assert!(rec.file_names("empty").is_empty());
        assert!(rec.file_names("number").is_empty());
        assert!(rec.file_names("missing").is_empty());
    }

    #[test]
    fn get_str_skips_empty() {
        let rec: Record = serde_json::from_value(json!({"name": "", "store": "Toko"})).unwrap();
        assert_eq!(rec.get_str("name"), None);
        assert_eq!(rec.get_str("store"), Some("Toko"));
    }
}
