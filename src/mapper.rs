use std::collections::{HashMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::formats::{NavigationItem, Target};
use crate::import::Row;

pub const DEFAULT_CONFIG_VERSION: &str = "2.1.9.0";
pub const DEFAULT_AUTHOR: &str = "System";

/// Who is writing the document, and when.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

impl Provenance {
    #[must_use]
    pub fn now(author: Option<&str>) -> Self {
        Self {
            author: author.unwrap_or(DEFAULT_AUTHOR).to_owned(),
            timestamp: Utc::now(),
        }
    }

    fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// A link is external when it is absolute and does not point at the tenant.
/// Without a tenant marker every absolute link counts as external.
#[must_use]
pub fn is_external(url: &str, tenant_marker: Option<&str>) -> bool {
    if !url.starts_with("http") {
        return false;
    }
    match tenant_marker.map(str::trim) {
        Some(marker) if !marker.is_empty() => !url.contains(marker),
        _ => true,
    }
}

/// Converts spreadsheet rows to navigation items.
///
/// Rows with a blank title are dropped. Missing `id`/`order` fall back to the
/// row's original position, so a dropped row still consumes its number.
#[must_use]
pub fn to_items(rows: &[Row], tenant_marker: Option<&str>) -> Vec<NavigationItem> {
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let title = row.text("title");
        if title.is_empty() {
            tracing::debug!(row = row.position, "skip row without title");
            continue;
        }

        let url = row.text("url");
        let position = row.position as i64;
        let target = if is_external(&url, tenant_marker) {
            Target::NewWindow
        } else {
            Target::SameWindow
        };

        items.push(NavigationItem {
            id: row.integer("id").unwrap_or(position),
            parent_id: row.integer("parentid").unwrap_or(0),
            order: row.integer("order").unwrap_or(position),
            title,
            url,
            target,
        });
    }
    items
}

/// Replaces the `items` of `config`, keeping every other key as loaded.
///
/// A missing document, or one without `items`, is replaced by the default
/// document carrying the new items.
pub fn merge(
    config: Option<Value>,
    items: &[NavigationItem],
    provenance: &Provenance,
) -> serde_json::Result<Value> {
    let items = serde_json::to_value(items)?;
    match config {
        Some(Value::Object(mut map)) if map.contains_key("items") => {
            map.insert("items".to_owned(), items);
            Ok(Value::Object(map))
        }
        Some(other) => {
            tracing::warn!(
                kind = value_kind(&other),
                "loaded navigation config has no items; writing default document"
            );
            Ok(default_document(items, provenance))
        }
        None => {
            tracing::info!("no navigation config found; writing default document");
            Ok(default_document(items, provenance))
        }
    }
}

/// Refreshes `lastModified` and `modifiedBy` on an object document.
pub fn stamp(document: &mut Value, provenance: &Provenance) {
    if let Some(map) = document.as_object_mut() {
        map.insert(
            "lastModified".to_owned(),
            Value::String(provenance.timestamp_string()),
        );
        map.insert(
            "modifiedBy".to_owned(),
            Value::String(provenance.author.clone()),
        );
    }
}

#[must_use]
pub fn default_document(items: Value, provenance: &Provenance) -> Value {
    let mut map = Map::new();
    map.insert("version".to_owned(), json!(DEFAULT_CONFIG_VERSION));
    map.insert("items".to_owned(), items);
    map.insert("theme".to_owned(), default_theme());
    map.insert(
        "sidebar".to_owned(),
        json!({ "isOpen": true, "isPinned": false, "position": "left" }),
    );
    map.insert("searchEnabled".to_owned(), json!(true));
    map.insert("autoSave".to_owned(), json!(true));
    map.insert(
        "lastModified".to_owned(),
        json!(provenance.timestamp_string()),
    );
    map.insert("createdBy".to_owned(), json!(provenance.author));
    map.insert("modifiedBy".to_owned(), json!(provenance.author));
    Value::Object(map)
}

fn default_theme() -> Value {
    json!({
        "primaryColor": "#0078d4",
        "secondaryColor": "#106ebe",
        "backgroundColor": "#ffffff",
        "textColor": "#323130",
        "hoverColor": "#f3f2f1",
        "fontFamily": "Segoe UI, system-ui, sans-serif",
        "fontSize": "14px",
        "borderRadius": "4px",
        "sidebarWidth": "300px",
        "borderEnabled": false,
        "borderColor": "#d2d0ce",
        "paddingTopBottom": "2px",
        "logoUrl": "",
        "logoSize": "40px",
        "siteName": "",
        "siteUrl": "",
        "position": "left",
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Structural problems that do not stop a sync but deserve a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemWarning {
    DuplicateId { id: i64, count: usize },
    UnknownParent { id: i64, parent_id: i64 },
}

impl std::fmt::Display for ItemWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId { id, count } => write!(f, "id {id} is used by {count} items"),
            Self::UnknownParent { id, parent_id } => {
                write!(f, "item {id} points at missing parent {parent_id}")
            }
        }
    }
}

#[must_use]
pub fn check_items(items: &[NavigationItem]) -> Vec<ItemWarning> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for item in items {
        *counts.entry(item.id).or_default() += 1;
    }

    let mut warnings = Vec::new();
    let mut reported = HashSet::new();
    for item in items {
        let count = counts[&item.id];
        if count > 1 && reported.insert(item.id) {
            warnings.push(ItemWarning::DuplicateId { id: item.id, count });
        }
    }
    for item in items {
        if item.parent_id != 0 && !counts.contains_key(&item.parent_id) {
            warnings.push(ItemWarning::UnknownParent {
                id: item.id,
                parent_id: item.parent_id,
            });
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;
    use crate::import::Cell;

    const TENANT: &str = "monarch360demo.sharepoint.com";

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_owned())
    }

    fn provenance() -> Provenance {
        Provenance {
            author: "Tester".to_owned(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    fn item(id: i64, title: &str) -> NavigationItem {
        NavigationItem {
            id,
            title: title.to_owned(),
            url: String::new(),
            parent_id: 0,
            order: id,
            target: Target::SameWindow,
        }
    }

    fn scenario_rows() -> Vec<Row> {
        vec![
            Row::new(
                1,
                [
                    ("title", text("Home")),
                    ("url", text("https://monarch360demo.sharepoint.com/sites/shan")),
                    ("parentId", Cell::Int(0)),
                    ("order", Cell::Int(1)),
                ],
            ),
            Row::new(2, [("title", text("")), ("url", text("x"))]),
            Row::new(
                3,
                [
                    ("title", text("Google")),
                    ("url", text("https://www.google.com")),
                    ("parentId", Cell::Int(0)),
                    ("order", Cell::Int(2)),
                ],
            ),
        ]
    }

    #[test]
    fn external_links_are_detected_against_tenant() {
        assert!(is_external("https://www.google.com", Some(TENANT)));
        assert!(!is_external(
            "https://monarch360demo.sharepoint.com/sites/shan",
            Some(TENANT)
        ));
        assert!(!is_external("", Some(TENANT)));
        assert!(!is_external("/sites/shan/Documents", Some(TENANT)));
        assert!(is_external("http://intranet.local", None));
        assert!(is_external("http://intranet.local", Some("  ")));
    }

    #[test]
    fn scenario_rows_map_to_expected_items() {
        let items = to_items(&scenario_rows(), Some(TENANT));
        assert_eq!(
            items,
            vec![
                NavigationItem {
                    id: 1,
                    title: "Home".to_owned(),
                    url: "https://monarch360demo.sharepoint.com/sites/shan".to_owned(),
                    parent_id: 0,
                    order: 1,
                    target: Target::SameWindow,
                },
                NavigationItem {
                    id: 3,
                    title: "Google".to_owned(),
                    url: "https://www.google.com".to_owned(),
                    parent_id: 0,
                    order: 2,
                    target: Target::NewWindow,
                },
            ]
        );
    }

    #[test]
    fn whitespace_titles_are_dropped() {
        let rows = vec![
            Row::new(1, [("Title", text("   "))]),
            Row::new(2, [("Title", Cell::Empty)]),
            Row::new(3, [("Url", text("https://example.com"))]),
        ];
        assert!(to_items(&rows, Some(TENANT)).is_empty());
    }

    #[test]
    fn bad_numbers_fall_back_to_defaults() {
        let rows = vec![Row::new(
            4,
            [
                ("Title", text(" Docs ")),
                ("Url", text(" /docs ")),
                ("ParentId", text("not a number")),
                ("Order", Cell::Bool(true)),
                ("Id", text("")),
            ],
        )];
        let items = to_items(&rows, Some(TENANT));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Docs");
        assert_eq!(items[0].url, "/docs");
        assert_eq!(items[0].parent_id, 0);
        assert_eq!(items[0].order, 4);
        assert_eq!(items[0].id, 4);
    }

    #[test]
    fn explicit_ids_pass_through_even_when_duplicated() {
        let rows = vec![
            Row::new(1, [("title", text("A")), ("id", Cell::Float(10.0))]),
            Row::new(2, [("title", text("B")), ("id", Cell::Int(10))]),
        ];
        let items = to_items(&rows, None);
        assert_eq!(items[0].id, 10);
        assert_eq!(items[1].id, 10);
        assert_eq!(
            check_items(&items),
            vec![ItemWarning::DuplicateId { id: 10, count: 2 }]
        );
    }

    #[test]
    fn mapping_twice_gives_identical_output() {
        let rows = scenario_rows();
        assert_eq!(to_items(&rows, Some(TENANT)), to_items(&rows, Some(TENANT)));
    }

    #[test]
    fn merge_preserves_unrelated_keys() -> anyhow::Result<()> {
        let config = json!({
            "items": [{ "id": 99, "title": "Old" }],
            "theme": { "primaryColor": "#000" },
        });
        let merged = merge(Some(config), &[item(1, "X")], &provenance())?;
        assert_eq!(
            merged,
            json!({
                "items": [
                    { "id": 1, "title": "X", "url": "", "parentId": 0, "order": 1, "target": "_self" }
                ],
                "theme": { "primaryColor": "#000" },
            })
        );
        Ok(())
    }

    #[test]
    fn merge_keeps_key_order_of_loaded_document() -> anyhow::Result<()> {
        let config: Value =
            serde_json::from_str(r#"{"version":"1.0","theme":{},"items":[],"autoSave":false}"#)?;
        let merged = merge(Some(config), &[], &provenance())?;
        let keys: Vec<&str> = merged
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["version", "theme", "items", "autoSave"]);
        Ok(())
    }

    #[test]
    fn merge_without_config_synthesizes_default_document() -> anyhow::Result<()> {
        let items = [item(1, "Home")];
        let merged = merge(None, &items, &provenance())?;

        assert_eq!(merged["version"], json!(DEFAULT_CONFIG_VERSION));
        assert_eq!(merged["items"], serde_json::to_value(items)?);
        assert_eq!(merged["theme"]["primaryColor"], json!("#0078d4"));
        assert_eq!(merged["sidebar"]["isOpen"], json!(true));
        assert_eq!(merged["searchEnabled"], json!(true));
        assert_eq!(merged["lastModified"], json!("2026-01-02T03:04:05.000Z"));
        assert_eq!(merged["createdBy"], json!("Tester"));
        Ok(())
    }

    #[test]
    fn merge_replaces_documents_without_items() -> anyhow::Result<()> {
        for config in [json!({}), json!({ "theme": {} }), json!([1, 2]), Value::Null] {
            let merged = merge(Some(config), &[item(1, "Home")], &provenance())?;
            assert_eq!(merged["version"], json!(DEFAULT_CONFIG_VERSION));
            assert_eq!(merged["items"][0]["title"], json!("Home"));
        }
        Ok(())
    }

    #[test]
    fn stamp_updates_modification_fields_only() {
        let mut document = json!({ "items": [], "modifiedBy": "Someone", "createdBy": "Someone" });
        stamp(&mut document, &provenance());
        assert_eq!(document["modifiedBy"], json!("Tester"));
        assert_eq!(document["createdBy"], json!("Someone"));
        assert_eq!(document["lastModified"], json!("2026-01-02T03:04:05.000Z"));
    }

    #[test]
    fn unknown_parents_are_reported() {
        let mut child = item(2, "Child");
        child.parent_id = 7;
        let mut nested = item(3, "Nested");
        nested.parent_id = 1;
        let warnings = check_items(&[item(1, "Root"), child, nested]);
        assert_eq!(
            warnings,
            vec![ItemWarning::UnknownParent { id: 2, parent_id: 7 }]
        );
    }
}
