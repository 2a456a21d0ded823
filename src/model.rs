use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::{default_payload, DEFAULT_MAIN_COLOR, DEFAULT_SUB_COLOR};

pub const DEFAULT_CHARACTER_COLOR: &str = "#ff9ec7";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    #[serde(rename = "chara-design")]
    CharaDesign,
    #[serde(rename = "illustration")]
    Illustration,
    #[serde(rename = "live2d")]
    Live2D,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::CharaDesign, Stage::Illustration, Stage::Live2D];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharaDesign => "chara-design",
            Self::Illustration => "illustration",
            Self::Live2D => "live2d",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::CharaDesign => "キャラデザ",
            Self::Illustration => "立ち絵",
            Self::Live2D => "Live2D",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Generic,
    Concept,
    References,
    Palette,
    Expressions,
    Outfit,
    Checklist,
    Rough,
    Lineart,
    Coloring,
    Parts,
    Cubism,
    Face,
    Physics,
    Motion,
    Export,
}

impl TaskType {
    pub const ALL: [TaskType; 16] = [
        TaskType::Generic,
        TaskType::Concept,
        TaskType::References,
        TaskType::Palette,
        TaskType::Expressions,
        TaskType::Outfit,
        TaskType::Checklist,
        TaskType::Rough,
        TaskType::Lineart,
        TaskType::Coloring,
        TaskType::Parts,
        TaskType::Cubism,
        TaskType::Face,
        TaskType::Physics,
        TaskType::Motion,
        TaskType::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Concept => "concept",
            Self::References => "references",
            Self::Palette => "palette",
            Self::Expressions => "expressions",
            Self::Outfit => "outfit",
            Self::Checklist => "checklist",
            Self::Rough => "rough",
            Self::Lineart => "lineart",
            Self::Coloring => "coloring",
            Self::Parts => "parts",
            Self::Cubism => "cubism",
            Self::Face => "face",
            Self::Physics => "physics",
            Self::Motion => "motion",
            Self::Export => "export",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn shape(&self) -> PayloadShape {
        match self {
            Self::Generic | Self::Concept => PayloadShape::Notes,
            Self::References => PayloadShape::Links,
            Self::Palette => PayloadShape::Palette,
            Self::Physics => PayloadShape::Physics,
            Self::Expressions
            | Self::Outfit
            | Self::Checklist
            | Self::Rough
            | Self::Lineart
            | Self::Coloring
            | Self::Parts
            | Self::Cubism
            | Self::Face
            | Self::Motion
            | Self::Export => PayloadShape::Checklist,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadShape {
    Notes,
    Links,
    Palette,
    Checklist,
    Physics,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesData {
    pub notes: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksData {
    pub links: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaletteData {
    pub main_color: String,
    pub sub_color: String,
    pub notes: String,
}

impl Default for PaletteData {
    fn default() -> Self {
        Self {
            main_color: DEFAULT_MAIN_COLOR.to_string(),
            sub_color: DEFAULT_SUB_COLOR.to_string(),
            notes: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecklistItem {
    pub name: String,
    pub checked: bool,
}

impl ChecklistItem {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            checked: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecklistData {
    pub items: Vec<ChecklistItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsParam {
    pub name: String,
    #[serde(deserialize_with = "deserialize_percent")]
    pub value: u8,
}

impl PhysicsParam {
    pub fn new(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value: clamp_percent(value),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsData {
    pub params: Vec<PhysicsParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Type-specific task payload. The variant is always the one
/// `TaskType::shape` names for the owning task.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Notes(NotesData),
    Links(LinksData),
    Palette(PaletteData),
    Checklist(ChecklistData),
    Physics(PhysicsData),
}

impl Payload {
    pub fn shape(&self) -> PayloadShape {
        match self {
            Self::Notes(_) => PayloadShape::Notes,
            Self::Links(_) => PayloadShape::Links,
            Self::Palette(_) => PayloadShape::Palette,
            Self::Checklist(_) => PayloadShape::Checklist,
            Self::Physics(_) => PayloadShape::Physics,
        }
    }

    /// Reads a stored payload as the shape required by `kind`. Missing
    /// fields take shape defaults; a payload that cannot be read at all
    /// falls back to the registry default for `kind`.
    pub fn from_value(kind: TaskType, value: Value) -> Self {
        if !value.is_object() {
            return default_payload(kind);
        }
        let decoded = match kind.shape() {
            PayloadShape::Notes => serde_json::from_value(value).map(Self::Notes),
            PayloadShape::Links => serde_json::from_value(value).map(Self::Links),
            PayloadShape::Palette => serde_json::from_value(value).map(Self::Palette),
            PayloadShape::Checklist => serde_json::from_value(value).map(Self::Checklist),
            PayloadShape::Physics => serde_json::from_value(value).map(Self::Physics),
        };
        decoded.unwrap_or_else(|err| {
            tracing::debug!(kind = kind.as_str(), %err, "payload reset to default");
            default_payload(kind)
        })
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            Self::Notes(data) => Some(data.notes.as_str()),
            Self::Palette(data) => Some(data.notes.as_str()),
            Self::Links(data) => data.notes.as_deref(),
            Self::Checklist(data) => data.notes.as_deref(),
            Self::Physics(data) => data.notes.as_deref(),
        }
    }

    pub fn set_notes(&mut self, notes: String) {
        match self {
            Self::Notes(data) => data.notes = notes,
            Self::Palette(data) => data.notes = notes,
            Self::Links(data) => data.notes = Some(notes),
            Self::Checklist(data) => data.notes = Some(notes),
            Self::Physics(data) => data.notes = Some(notes),
        }
    }

    /// Non-blank lines of a references payload, trimmed.
    pub fn link_list(&self) -> Vec<&str> {
        match self {
            Self::Links(data) => data
                .links
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_links(&mut self, links: String) -> bool {
        match self {
            Self::Links(data) => {
                data.links = links;
                true
            }
            _ => false,
        }
    }

    pub fn set_colors(&mut self, main: Option<String>, sub: Option<String>) -> bool {
        match self {
            Self::Palette(data) => {
                if let Some(main) = main {
                    data.main_color = main;
                }
                if let Some(sub) = sub {
                    data.sub_color = sub;
                }
                true
            }
            _ => false,
        }
    }

    pub fn items(&self) -> &[ChecklistItem] {
        match self {
            Self::Checklist(data) => &data.items,
            _ => &[],
        }
    }

    pub fn toggle_item(&mut self, index: usize) -> bool {
        match self {
            Self::Checklist(data) => match data.items.get_mut(index) {
                Some(item) => {
                    item.checked = !item.checked;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    pub fn add_item(&mut self, name: &str) -> bool {
        match self {
            Self::Checklist(data) => {
                data.items.push(ChecklistItem::new(name));
                true
            }
            _ => false,
        }
    }

    pub fn rename_item(&mut self, index: usize, name: &str) -> bool {
        match self {
            Self::Checklist(data) => match data.items.get_mut(index) {
                Some(item) => {
                    item.name = name.to_string();
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    pub fn remove_item(&mut self, index: usize) -> bool {
        match self {
            Self::Checklist(data) if index < data.items.len() => {
                data.items.remove(index);
                true
            }
            _ => false,
        }
    }

    pub fn set_param(&mut self, index: usize, value: i64) -> bool {
        match self {
            Self::Physics(data) => match data.params.get_mut(index) {
                Some(param) => {
                    param.value = clamp_percent(value);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CharacterRecord")]
pub struct Character {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl Character {
    pub fn new(name: String, color: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            color,
        }
    }

    pub fn default_character() -> Self {
        Self {
            id: "default".to_string(),
            name: "新規VTuber".to_string(),
            color: DEFAULT_CHARACTER_COLOR.to_string(),
        }
    }
}

/// Stored form of a character. A missing id gets a fresh one and a missing
/// or blank color falls back to the default.
#[derive(Deserialize)]
struct CharacterRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    color: Option<Value>,
}

impl From<CharacterRecord> for Character {
    fn from(record: CharacterRecord) -> Self {
        Self {
            id: lenient_id(record.id),
            name: lenient_string(record.name).unwrap_or_default(),
            color: lenient_string(record.color)
                .filter(|color| !color.is_empty())
                .unwrap_or_else(|| DEFAULT_CHARACTER_COLOR.to_string()),
        }
    }
}

/// Strings pass through and numbers are rendered; anything else is absent.
fn lenient_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn lenient_id(value: Option<Value>) -> String {
    lenient_string(value)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "TaskRecord", rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub stage: Stage,
    #[serde(rename = "type")]
    pub kind: TaskType,
    pub completed: bool,
    pub created_at: i64,
    pub data: Payload,
}

impl Task {
    pub fn new(title: String, stage: Stage, kind: TaskType, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            stage,
            kind,
            completed: false,
            created_at,
            data: default_payload(kind),
        }
    }
}

/// Stored form of a task, read leniently: ids may be numbers, `null` or
/// mistyped fields take their defaults, unknown stages and types fall back
/// to their defaults and the payload is coerced to the type's shape.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: Option<Value>,
    #[serde(default)]
    stage: Option<Value>,
    #[serde(default, rename = "type")]
    kind: Option<Value>,
    #[serde(default)]
    completed: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        let kind = record
            .kind
            .as_ref()
            .and_then(Value::as_str)
            .and_then(TaskType::parse)
            .unwrap_or_default();
        let stage = record
            .stage
            .as_ref()
            .and_then(Value::as_str)
            .and_then(Stage::parse)
            .unwrap_or_default();
        let data = match record.data {
            Some(value) if !value.is_null() => Payload::from_value(kind, value),
            _ => default_payload(kind),
        };
        let created_at = record.created_at.and_then(|value| {
            value
                .as_i64()
                .or_else(|| value.as_f64().map(|millis| millis.round() as i64))
        });
        Self {
            id: lenient_id(record.id),
            title: lenient_string(record.title).unwrap_or_default(),
            stage,
            kind,
            completed: record
                .completed
                .and_then(|value| value.as_bool())
                .unwrap_or(false),
            created_at: created_at.unwrap_or(0),
            data,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CharacterChanges {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub stage: Option<Stage>,
    pub completed: Option<bool>,
    pub data: Option<Payload>,
}

pub fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

fn deserialize_percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.is_nan() {
        return Ok(0);
    }
    Ok(clamp_percent(value.round() as i64))
}
