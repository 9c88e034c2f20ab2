//! Collection classification tables.
//!
//! Every collection is statically classified as tenant-scoped (filterable by
//! `ownerId`) or global. The classification is configuration, not inferred
//! from the store's schema, so a schema change here is a deliberate edit.

/// Collections partitioned per tenant via an `ownerId` field.
pub const TENANT_COLLECTIONS: &[&str] = &[
    "users",
    "stores",
    "inventory",
    "customers",
    "services",
    "transactions",
    "sales",
    "suppliers",
    "brands",
    "cash_accounts",
    "cash_flow",
    "debts",
    "attendance",
    "leaves",
    "shifts",
    "payroll",
    "salary_settings",
    "purchases",
    "purchase_returns",
    "sales_returns",
    "checklist_items",
    "checklist_templates",
    "qc_items",
    "qc_templates",
    "monthly_budgets",
];

/// Collections with no owner partition, exported once per run.
pub const GLOBAL_COLLECTIONS: &[&str] = &[
    "owners",
    "products",
    "plan_configs",
    "subscription_config",
];

/// File fields per collection (attachment-typed fields in the store schema).
const FILE_FIELDS: &[(&str, &[&str])] = &[("users", &["avatar"])];

/// Returns the file field names for a collection, empty for collections
/// without attachments.
pub fn file_fields(collection: &str) -> &'static [&'static str] {
    FILE_FIELDS
        .iter()
        .find(|(name, _)| *name == collection)
        .map_or(&[], |(_, fields)| fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        for name in TENANT_COLLECTIONS {
            assert!(
                !GLOBAL_COLLECTIONS.contains(name),
                "{name} classified as both tenant-scoped and global"
            );
        }
    }

    #[test]
    fn file_field_lookup() {
        assert_eq!(file_fields("users"), ["avatar"]);
        assert!(file_fields("inventory").is_empty());
    }
}
