//! Upgrades persisted documents of any known vintage to the current shape.
//!
//! Detection produces a [`DetectedVersion`]; each version has one pure
//! upgrade step that hands its output to the next:
//!
//! - `LegacyList` (bare task array) is wrapped into a single-character
//!   document, then treated as `FlatFields`.
//! - `FlatFields` tasks get a `type` and `data`, absorbing the old top-level
//!   `notes`/`links`/`mainColor`/`subColor` fields.
//! - `Current` is decoded as-is.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::document::Document;
use crate::model::{Character, Stage, TaskType};
use crate::schema::{default_payload, template_type_for_title, DEFAULT_MAIN_COLOR, DEFAULT_SUB_COLOR};

const TASK_LISTS_KEY: &str = "tasksByCharacter";
const LEGACY_TASK_LISTS_KEY: &str = "todosByCharacter";
const LEGACY_FIELDS: [&str; 4] = ["notes", "links", "mainColor", "subColor"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DetectedVersion {
    Empty,
    LegacyList,
    FlatFields,
    Current,
    Foreign,
}

impl DetectedVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::LegacyList => "legacy-list",
            Self::FlatFields => "flat-fields",
            Self::Current => "current",
            Self::Foreign => "foreign",
        }
    }
}

#[derive(Debug)]
pub struct Migration {
    pub document: Document,
    pub version: DetectedVersion,
    /// Raw input that could not be represented, kept so it can be backed up
    /// before the first write replaces it.
    pub unrecognized: Option<String>,
}

impl Migration {
    pub fn changed(&self) -> bool {
        self.version != DetectedVersion::Current
    }
}

/// Migrates a raw persisted string. Never fails: anything unusable yields
/// the default document.
pub fn migrate(raw: Option<&str>) -> Migration {
    let value = match raw.map(serde_json::from_str::<Value>) {
        Some(Ok(value)) => value,
        Some(Err(err)) => {
            tracing::warn!(%err, "persisted document is not valid json; starting empty");
            return Migration {
                document: Document::default(),
                version: DetectedVersion::Empty,
                unrecognized: raw.map(str::to_string),
            };
        }
        None => {
            return Migration {
                document: Document::default(),
                version: DetectedVersion::Empty,
                unrecognized: None,
            }
        }
    };
    let version = detect(&value);
    tracing::debug!(version = version.as_str(), "detected persisted document version");
    match upgrade(version, value) {
        Some(document) => Migration {
            document,
            version,
            unrecognized: None,
        },
        None => {
            tracing::warn!("persisted document has an unrecognized shape; backing it up");
            Migration {
                document: Document::default(),
                version: DetectedVersion::Foreign,
                unrecognized: raw.map(str::to_string),
            }
        }
    }
}

/// Migrates an already-parsed value.
pub fn migrate_value(value: Value) -> Option<Document> {
    upgrade(detect(&value), value)
}

pub fn detect(value: &Value) -> DetectedVersion {
    match value {
        Value::Null => DetectedVersion::Empty,
        Value::Array(_) => DetectedVersion::LegacyList,
        Value::Object(map) => {
            let lists = map
                .get(TASK_LISTS_KEY)
                .or_else(|| map.get(LEGACY_TASK_LISTS_KEY));
            match (map.get("characters"), lists) {
                (Some(Value::Array(characters)), Some(Value::Object(lists))) => {
                    let mut task_ids = HashSet::new();
                    let all_current = characters.iter().all(has_string_id)
                        && lists.values().all(|list| {
                            list.as_array().is_some_and(|tasks| {
                                tasks.iter().all(|task| {
                                    is_normalized(task)
                                        && task["id"]
                                            .as_str()
                                            .is_some_and(|id| !id.is_empty() && task_ids.insert(id))
                                })
                            })
                        });
                    if all_current {
                        DetectedVersion::Current
                    } else {
                        DetectedVersion::FlatFields
                    }
                }
                _ => DetectedVersion::Foreign,
            }
        }
        _ => DetectedVersion::Foreign,
    }
}

fn upgrade(version: DetectedVersion, value: Value) -> Option<Document> {
    match version {
        DetectedVersion::Empty => Some(Document::default()),
        DetectedVersion::LegacyList => {
            let Value::Array(tasks) = value else {
                return None;
            };
            into_document(absorb_legacy_fields(wrap_legacy_list(tasks)))
        }
        DetectedVersion::FlatFields => into_document(absorb_legacy_fields(value)),
        DetectedVersion::Current => into_document(value),
        DetectedVersion::Foreign => None,
    }
}

/// Wraps a bare task array into a document owned by the default character.
/// Tasks without a stage are placed in character design.
pub fn wrap_legacy_list(tasks: Vec<Value>) -> Value {
    let character = Character::default_character();
    let tasks: Vec<Value> = tasks
        .into_iter()
        .map(|mut task| {
            if let Value::Object(fields) = &mut task {
                if non_empty_str(fields, "stage").is_none() {
                    fields.insert(
                        "stage".to_string(),
                        Value::String(Stage::CharaDesign.as_str().to_string()),
                    );
                }
            }
            task
        })
        .collect();
    let mut lists = Map::new();
    lists.insert(character.id.clone(), Value::Array(tasks));
    let mut document = Map::new();
    document.insert(
        "characters".to_string(),
        serde_json::to_value(vec![character]).unwrap_or(Value::Array(Vec::new())),
    );
    document.insert(TASK_LISTS_KEY.to_string(), Value::Object(lists));
    Value::Object(document)
}

/// Gives every task a `type` and `data`, folding the flat legacy fields
/// into the payload and removing them from the task.
pub fn absorb_legacy_fields(mut value: Value) -> Value {
    let Value::Object(document) = &mut value else {
        return value;
    };
    if let Some(lists) = document.remove(LEGACY_TASK_LISTS_KEY) {
        document.entry(TASK_LISTS_KEY).or_insert(lists);
    }
    if let Some(Value::Array(characters)) = document.get_mut("characters") {
        retain_objects(characters, "character");
    }
    let Some(Value::Object(lists)) = document.get_mut(TASK_LISTS_KEY) else {
        return value;
    };
    for list in lists.values_mut() {
        if list.is_null() {
            *list = Value::Array(Vec::new());
        }
        if let Value::Array(tasks) = list {
            retain_objects(tasks, "task");
            for task in tasks.iter_mut() {
                if let Value::Object(fields) = task {
                    normalize_task(fields);
                }
            }
        }
    }
    value
}

fn normalize_task(fields: &mut Map<String, Value>) {
    if is_normalized_fields(fields) {
        return;
    }
    let kind = non_empty_str(fields, "type")
        .map(|name| TaskType::parse(name).unwrap_or_default())
        .or_else(|| {
            fields
                .get("title")
                .and_then(Value::as_str)
                .and_then(template_type_for_title)
        })
        .unwrap_or_default();

    let data = match fields.get("data").filter(|data| !data.is_null()) {
        Some(data) => data.clone(),
        None => legacy_payload(kind, fields),
    };

    for key in LEGACY_FIELDS {
        fields.remove(key);
    }
    fields.insert("type".to_string(), Value::String(kind.as_str().to_string()));
    fields.insert("data".to_string(), data);
}

fn legacy_payload(kind: TaskType, fields: &Map<String, Value>) -> Value {
    let notes = non_empty_str(fields, "notes");
    let links = non_empty_str(fields, "links");
    let main_color = non_empty_str(fields, "mainColor");

    if kind == TaskType::References {
        if let Some(links) = links {
            let mut data = Map::new();
            data.insert("links".to_string(), Value::String(links.to_string()));
            return Value::Object(data);
        }
    }
    if kind == TaskType::Palette && (notes.is_some() || main_color.is_some()) {
        let mut data = Map::new();
        data.insert(
            "mainColor".to_string(),
            Value::String(main_color.unwrap_or(DEFAULT_MAIN_COLOR).to_string()),
        );
        data.insert(
            "subColor".to_string(),
            Value::String(
                non_empty_str(fields, "subColor")
                    .unwrap_or(DEFAULT_SUB_COLOR)
                    .to_string(),
            ),
        );
        data.insert(
            "notes".to_string(),
            Value::String(notes.unwrap_or_default().to_string()),
        );
        return Value::Object(data);
    }

    let mut payload = default_payload(kind);
    if let Some(notes) = notes {
        payload.set_notes(notes.to_string());
    }
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

fn into_document(value: Value) -> Option<Document> {
    match serde_json::from_value::<Document>(value) {
        Ok(mut document) => {
            document.enforce_invariants();
            Some(document)
        }
        Err(err) => {
            tracing::warn!(%err, "document did not decode after migration");
            None
        }
    }
}

fn retain_objects(entries: &mut Vec<Value>, what: &str) {
    let before = entries.len();
    entries.retain(Value::is_object);
    if entries.len() != before {
        tracing::warn!(dropped = before - entries.len(), what, "skipped non-object entries");
    }
}

fn has_string_id(entry: &Value) -> bool {
    entry
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty())
}

fn is_normalized(task: &Value) -> bool {
    task.as_object().is_some_and(is_normalized_fields)
}

fn is_normalized_fields(fields: &Map<String, Value>) -> bool {
    non_empty_str(fields, "type").is_some() && fields.get("data").is_some_and(|data| !data.is_null())
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PaletteData, Payload};
    use serde_json::json;

    fn migrate_json(value: Value) -> Migration {
        migrate(Some(&value.to_string()))
    }

    #[test]
    fn missing_or_broken_input_yields_default_document() {
        let missing = migrate(None);
        assert_eq!(missing.version, DetectedVersion::Empty);
        assert_eq!(missing.document, Document::default());

        let broken = migrate(Some("{not json"));
        assert_eq!(broken.version, DetectedVersion::Empty);
        assert_eq!(broken.document, Document::default());
        assert_eq!(broken.unrecognized.as_deref(), Some("{not json"));
    }

    #[test]
    fn bare_list_is_wrapped_and_normalized() {
        let migration = migrate_json(json!([{"id": "t1", "title": "世界観・コンセプト設定"}]));
        assert_eq!(migration.version, DetectedVersion::LegacyList);
        let doc = migration.document;
        assert_eq!(doc.characters.len(), 1);
        let tasks = doc.tasks(&doc.characters[0].id);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskType::Concept);
        assert_eq!(tasks[0].stage, Stage::CharaDesign);
        assert_eq!(tasks[0].data, default_payload(TaskType::Concept));
    }

    #[test]
    fn bare_list_keeps_existing_stage() {
        let doc = migrate_json(json!([
            {"id": "a", "title": "Rig", "stage": "live2d", "completed": true}
        ]))
        .document;
        let task = &doc.tasks("default")[0];
        assert_eq!(task.stage, Stage::Live2D);
        assert!(task.completed);
        assert_eq!(task.kind, TaskType::Generic);
    }

    #[test]
    fn palette_legacy_fields_are_absorbed() {
        let value = absorb_legacy_fields(json!({
            "characters": [{"id": "c1", "name": "Mio", "color": "#ffffff"}],
            "tasksByCharacter": {"c1": [
                {"id": "t1", "title": "X", "type": "palette", "notes": "memo", "mainColor": "#111111"}
            ]}
        }));
        let task = &value["tasksByCharacter"]["c1"][0];
        assert_eq!(
            task["data"],
            json!({"mainColor": "#111111", "subColor": "#9ed4ff", "notes": "memo"})
        );
        assert!(task.get("notes").is_none());
        assert!(task.get("mainColor").is_none());

        let doc = migrate_value(value).expect("document");
        assert_eq!(
            doc.tasks("c1")[0].data,
            Payload::Palette(PaletteData {
                main_color: "#111111".to_string(),
                sub_color: "#9ed4ff".to_string(),
                notes: "memo".to_string(),
            })
        );
    }

    #[test]
    fn references_links_and_plain_notes_are_absorbed() {
        let doc = migrate_json(json!({
            "characters": [{"id": "c1", "name": "Mio", "color": "#ffffff"}],
            "todosByCharacter": {"c1": [
                {"id": "r", "title": "参考資料・インスピレーション収集", "links": "https://a\nhttps://b"},
                {"id": "l", "title": "線画作成", "notes": "thin pen"},
                {"id": "g", "title": "Stream setup", "notes": "obs"},
                {"id": "p", "title": "カラーパレット決定"}
            ]}
        }))
        .document;
        let tasks = doc.tasks("c1");
        assert_eq!(tasks[0].kind, TaskType::References);
        assert_eq!(tasks[0].data.link_list(), vec!["https://a", "https://b"]);
        assert_eq!(tasks[1].kind, TaskType::Lineart);
        assert_eq!(tasks[1].data.notes(), Some("thin pen"));
        assert_eq!(tasks[1].data.items().len(), 2);
        assert_eq!(tasks[2].kind, TaskType::Generic);
        assert_eq!(tasks[2].data.notes(), Some("obs"));
        assert_eq!(tasks[3].kind, TaskType::Palette);
        assert_eq!(tasks[3].data, default_payload(TaskType::Palette));
    }

    #[test]
    fn normalized_tasks_are_left_alone() {
        let mut fields = json!({
            "id": "t", "title": "ラフスケッチ", "type": "generic",
            "data": {"notes": "mine"}, "notes": "stale"
        })
        .as_object()
        .cloned()
        .expect("object");
        let before = fields.clone();
        normalize_task(&mut fields);
        assert_eq!(fields, before);
    }

    #[test]
    fn migration_is_idempotent() {
        let once = migrate_json(json!([
            {"id": "a", "title": "カラーパレット決定", "notes": "pastel"},
            {"id": "b", "title": "髪・服の物理演算", "completed": true, "createdAt": 5}
        ]))
        .document;
        let encoded = serde_json::to_string(&once).expect("encode");
        let twice = migrate(Some(&encoded));
        assert_eq!(twice.version, DetectedVersion::Current);
        assert!(!twice.changed());
        assert_eq!(twice.document, once);
    }

    #[test]
    fn foreign_shapes_are_preserved_for_backup() {
        let raw = json!({"version": 9, "payload": []}).to_string();
        let migration = migrate(Some(&raw));
        assert_eq!(migration.version, DetectedVersion::Foreign);
        assert_eq!(migration.document, Document::default());
        assert_eq!(migration.unrecognized.as_deref(), Some(raw.as_str()));
    }

    #[test]
    fn character_without_id_keeps_the_document() {
        let migration = migrate_json(json!({
            "characters": [{"name": "no id"}],
            "tasksByCharacter": {}
        }));
        assert_eq!(migration.version, DetectedVersion::FlatFields);
        assert!(migration.unrecognized.is_none());
        let doc = migration.document;
        assert_eq!(doc.characters.len(), 1);
        assert_eq!(doc.characters[0].name, "no id");
        assert_ne!(doc.characters[0].id, "");
        assert!(doc.tasks_by_character.contains_key(&doc.characters[0].id));
    }

    #[test]
    fn legacy_list_with_numeric_ids_is_kept() {
        let migration = migrate_json(json!([
            {"id": 1700000000000_i64, "title": "世界観・コンセプト設定", "completed": false},
            {"id": 1700000000001_i64, "title": "ラフスケッチ", "completed": true}
        ]));
        assert_eq!(migration.version, DetectedVersion::LegacyList);
        let tasks = migration.document.tasks("default").to_vec();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "1700000000000");
        assert_eq!(tasks[0].kind, TaskType::Concept);
        assert_eq!(tasks[1].id, "1700000000001");
        assert_eq!(tasks[1].kind, TaskType::Rough);
        assert!(tasks[1].completed);

        let encoded = serde_json::to_string(&migration.document).expect("encode");
        assert_eq!(migrate(Some(&encoded)).version, DetectedVersion::Current);
    }

    #[test]
    fn null_fields_do_not_discard_other_tasks() {
        let migration = migrate_json(json!({
            "characters": [{"id": "c1", "name": "Mio"}, {"id": "c2", "name": "Rin"}],
            "tasksByCharacter": {
                "c1": [
                    {"id": "a", "title": "A", "type": "generic", "data": {"notes": ""}, "completed": null},
                    {"id": "b", "title": null, "type": "generic", "data": {"notes": "kept"}}
                ],
                "c2": [
                    {"id": 5, "title": "R", "type": "generic", "data": {"notes": ""}},
                    "garbage"
                ]
            }
        }));
        assert!(migration.unrecognized.is_none());
        assert_ne!(migration.version, DetectedVersion::Foreign);
        let doc = migration.document;
        let first = doc.tasks("c1");
        assert_eq!(first.len(), 2);
        assert!(!first[0].completed);
        assert_eq!(first[1].title, "");
        assert_eq!(first[1].data.notes(), Some("kept"));
        let second = doc.tasks("c2");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "5");
    }

    #[test]
    fn duplicate_task_ids_are_repaired_and_saved() {
        let migration = migrate_json(json!({
            "characters": [{"id": "c1", "name": "Mio"}],
            "tasksByCharacter": {"c1": [
                {"id": "x", "title": "A", "type": "generic", "data": {"notes": ""}},
                {"id": "x", "title": "B", "type": "generic", "data": {"notes": ""}}
            ]}
        }));
        assert!(migration.changed());
        let tasks = migration.document.tasks("c1");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "x");
        assert_ne!(tasks[1].id, "x");
        assert_eq!(tasks[1].title, "B");
    }

    #[test]
    fn null_lists_and_orphans_are_repaired() {
        let doc = migrate_json(json!({
            "characters": [{"id": "c1", "name": "Mio"}, {"id": "c2", "name": "Rin"}],
            "tasksByCharacter": {"c1": null, "ghost": []}
        }))
        .document;
        assert_eq!(doc.tasks_by_character.len(), 2);
        assert!(doc.tasks_by_character.contains_key("c2"));
        assert!(!doc.tasks_by_character.contains_key("ghost"));
        assert_eq!(doc.characters[0].color, "#ff9ec7");
    }
}
