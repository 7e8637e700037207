//! Core domain model for skusweep: SKU categories, classification, and
//! inventory-document normalization decisions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const CRATE_NAME: &str = "skusweep-core";

/// The `storeId` value that marks an inventory entry as online availability.
pub const ONLINE_STORE_ID: &str = "online";

/// Product type code as reported by the catalog source-of-truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    BigTicket,
    SoftLine,
    Other(i32),
}

impl ProductCategory {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::BigTicket,
            1 => Self::SoftLine,
            other => Self::Other(other),
        }
    }
}

/// The two categories that are subject to destructive cleanup. `Others`
/// SKUs are recorded for history but never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleteCategory {
    BigTicket,
    SoftLine,
}

impl DeleteCategory {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::BigTicket => "BT",
            Self::SoftLine => "SL",
        }
    }

    pub fn list_prefix(self) -> &'static str {
        match self {
            Self::BigTicket => "BigTicket",
            Self::SoftLine => "SoftLine",
        }
    }
}

/// One validated (SKU, category) pair from the source-of-truth query.
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuRecord {
    pub sku_id: String,
    pub category: ProductCategory,
}

impl SkuRecord {
    pub fn new(sku_id: impl Into<String>, category: ProductCategory) -> Self {
        Self {
            sku_id: sku_id.into(),
            category,
        }
    }
}

/// Three pairwise-disjoint, lexicographically sorted SKU sets. Every
/// distinct input identifier lands in exactly one of them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Classification {
    pub big_ticket: Vec<String>,
    pub soft_line: Vec<String>,
    pub others: Vec<String>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.big_ticket.is_empty() && self.soft_line.is_empty() && self.others.is_empty()
    }
}

/// Partition records into big-ticket, soft-line, and others. An identifier
/// tagged as both big-ticket and soft-line moves to others; an identifier
/// already tagged as others is silently dropped from the two primary sets.
pub fn classify(records: &[SkuRecord]) -> Classification {
    let mut big_ticket: BTreeSet<String> = BTreeSet::new();
    let mut soft_line: BTreeSet<String> = BTreeSet::new();
    let mut others: BTreeSet<String> = BTreeSet::new();

    for record in records {
        match record.category {
            ProductCategory::BigTicket => big_ticket.insert(record.sku_id.clone()),
            ProductCategory::SoftLine => soft_line.insert(record.sku_id.clone()),
            ProductCategory::Other(_) => others.insert(record.sku_id.clone()),
        };
    }

    let duplicated: BTreeSet<String> = big_ticket.intersection(&soft_line).cloned().collect();
    let raw_others = others.clone();
    others.extend(duplicated.iter().cloned());

    big_ticket.retain(|sku| !duplicated.contains(sku) && !raw_others.contains(sku));
    soft_line.retain(|sku| !duplicated.contains(sku) && !raw_others.contains(sku));

    Classification {
        big_ticket: big_ticket.into_iter().collect(),
        soft_line: soft_line.into_iter().collect(),
        others: others.into_iter().collect(),
    }
}

/// Inventory document held by the document store, keyed by SKU. Entries are
/// arbitrary JSON objects; only the `storeId` field is interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "hasOnlineInventory", skip_serializing_if = "Option::is_none")]
    pub has_online_inventory: Option<bool>,
    #[serde(default)]
    pub inventory: Vec<Value>,
    #[serde(
        rename = "hasOnlineInventory_Previous",
        skip_serializing_if = "Option::is_none"
    )]
    pub has_online_inventory_previous: Option<bool>,
}

impl InventoryDocument {
    pub fn new(id: impl Into<String>, inventory: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            has_online_inventory: None,
            inventory,
            has_online_inventory_previous: None,
        }
    }
}

/// Which normalization case applied to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeAction {
    /// Inventory list was absent or empty; replaced with a single online entry.
    Initialized,
    /// No online entry was present; one was appended.
    AppendedOnline,
    /// An online entry existed and was stripped to its minimal form.
    CleanedOnline,
}

fn minimal_online_entry() -> Value {
    json!({ "storeId": ONLINE_STORE_ID })
}

fn is_online_entry(entry: &Value) -> bool {
    entry.get("storeId").and_then(Value::as_str) == Some(ONLINE_STORE_ID)
}

/// Apply the single normalization case that matches the document. Non-online
/// entries are preserved verbatim. Idempotent: a second application always
/// hits the clean-online case and produces the same document.
pub fn normalize_inventory(doc: &mut InventoryDocument) -> NormalizeAction {
    if doc.inventory.is_empty() {
        doc.inventory = vec![minimal_online_entry()];
        return NormalizeAction::Initialized;
    }

    if doc.inventory.iter().any(is_online_entry) {
        for entry in &mut doc.inventory {
            if is_online_entry(entry) {
                *entry = minimal_online_entry();
            }
        }
        NormalizeAction::CleanedOnline
    } else {
        doc.inventory.push(minimal_online_entry());
        NormalizeAction::AppendedOnline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sku: &str, code: i32) -> SkuRecord {
        SkuRecord::new(sku, ProductCategory::from_code(code))
    }

    #[test]
    fn classify_moves_cross_category_duplicates_to_others() {
        let records = vec![
            record("S1", 0),
            record("S2", 1),
            record("S3", 0),
            record("S2", 0),
        ];
        let result = classify(&records);
        assert_eq!(result.big_ticket, vec!["S1", "S3"]);
        assert!(result.soft_line.is_empty());
        assert_eq!(result.others, vec!["S2"]);
    }

    #[test]
    fn classify_output_sets_are_disjoint_and_cover_input() {
        let records = vec![
            record("A", 0),
            record("B", 1),
            record("C", 7),
            record("A", 1),
            record("C", 0),
            record("D", 0),
        ];
        let result = classify(&records);

        let mut all: Vec<&String> = result
            .big_ticket
            .iter()
            .chain(&result.soft_line)
            .chain(&result.others)
            .collect();
        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(before, all.len(), "sets overlap");

        let distinct: BTreeSet<&str> = records.iter().map(|r| r.sku_id.as_str()).collect();
        assert_eq!(all.len(), distinct.len());
        // C was tagged Other elsewhere, so it never appears under big-ticket
        assert!(!result.big_ticket.contains(&"C".to_string()));
        assert!(result.others.contains(&"C".to_string()));
    }

    #[test]
    fn classify_sorts_each_set() {
        let records = vec![record("zz", 0), record("aa", 0), record("mm", 0)];
        let result = classify(&records);
        assert_eq!(result.big_ticket, vec!["aa", "mm", "zz"]);
    }

    #[test]
    fn classify_empty_input_yields_empty_result() {
        let result = classify(&[]);
        assert!(result.is_empty());
    }

    #[test]
    fn normalize_initializes_empty_inventory() {
        let mut doc = InventoryDocument::new("sku-1", vec![]);
        let action = normalize_inventory(&mut doc);
        assert_eq!(action, NormalizeAction::Initialized);
        assert_eq!(doc.inventory, vec![json!({"storeId": "online"})]);
    }

    #[test]
    fn normalize_appends_online_when_missing() {
        let mut doc = InventoryDocument::new("sku-2", vec![json!({"storeId": "store1", "stock": 3})]);
        let action = normalize_inventory(&mut doc);
        assert_eq!(action, NormalizeAction::AppendedOnline);
        assert_eq!(
            doc.inventory,
            vec![
                json!({"storeId": "store1", "stock": 3}),
                json!({"storeId": "online"}),
            ]
        );
    }

    #[test]
    fn normalize_strips_online_entry_and_keeps_store_entries() {
        let mut doc = InventoryDocument::new(
            "sku-3",
            vec![
                json!({"storeId": "store1"}),
                json!({"storeId": "online", "stock": 5, "extra": "x"}),
            ],
        );
        let action = normalize_inventory(&mut doc);
        assert_eq!(action, NormalizeAction::CleanedOnline);
        assert_eq!(
            doc.inventory,
            vec![json!({"storeId": "store1"}), json!({"storeId": "online"})]
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut doc = InventoryDocument::new(
            "sku-4",
            vec![json!({"storeId": "online", "stock": 9, "reserved": 2})],
        );
        normalize_inventory(&mut doc);
        let once = doc.clone();
        let action = normalize_inventory(&mut doc);
        assert_eq!(action, NormalizeAction::CleanedOnline);
        assert_eq!(doc, once);
    }

    #[test]
    fn normalize_leaves_non_object_entries_alone() {
        let mut doc = InventoryDocument::new("sku-5", vec![json!("legacy-marker")]);
        normalize_inventory(&mut doc);
        assert_eq!(
            doc.inventory,
            vec![json!("legacy-marker"), json!({"storeId": "online"})]
        );
    }

    #[test]
    fn document_round_trips_with_store_field_names() {
        let doc = InventoryDocument {
            id: "sku-6".into(),
            has_online_inventory: Some(true),
            inventory: vec![json!({"storeId": "online"})],
            has_online_inventory_previous: Some(false),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["_id"], "sku-6");
        assert_eq!(value["hasOnlineInventory"], true);
        assert_eq!(value["hasOnlineInventory_Previous"], false);
        let back: InventoryDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }
}
