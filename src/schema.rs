//! Task type registry: default payloads per type and the canonical
//! production template.

use crate::model::{
    ChecklistData, ChecklistItem, LinksData, NotesData, PaletteData, Payload, PhysicsData,
    PhysicsParam, Stage, TaskType,
};

pub const DEFAULT_MAIN_COLOR: &str = "#ff9ec7";
pub const DEFAULT_SUB_COLOR: &str = "#9ed4ff";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemplateEntry {
    pub title: &'static str,
    pub stage: Stage,
    pub kind: TaskType,
}

const fn entry(stage: Stage, title: &'static str, kind: TaskType) -> TemplateEntry {
    TemplateEntry { title, stage, kind }
}

/// Recommended full production checklist, in display order.
pub const TEMPLATE: [TemplateEntry; 16] = [
    entry(Stage::CharaDesign, "世界観・コンセプト設定", TaskType::Concept),
    entry(Stage::CharaDesign, "参考資料・インスピレーション収集", TaskType::References),
    entry(Stage::CharaDesign, "カラーパレット決定", TaskType::Palette),
    entry(Stage::CharaDesign, "髪型・表情デザイン", TaskType::Expressions),
    entry(Stage::CharaDesign, "衣装デザイン", TaskType::Outfit),
    entry(Stage::CharaDesign, "デザイン確定", TaskType::Checklist),
    entry(Stage::Illustration, "ラフスケッチ", TaskType::Rough),
    entry(Stage::Illustration, "線画作成", TaskType::Lineart),
    entry(Stage::Illustration, "着色・仕上げ", TaskType::Coloring),
    entry(Stage::Illustration, "パーツ別レイヤー分け", TaskType::Parts),
    entry(Stage::Illustration, "差分表情作成", TaskType::Expressions),
    entry(Stage::Live2D, "Cubismセットアップ", TaskType::Cubism),
    entry(Stage::Live2D, "顔パーツ設定", TaskType::Face),
    entry(Stage::Live2D, "髪・服の物理演算", TaskType::Physics),
    entry(Stage::Live2D, "表情モーション作成", TaskType::Motion),
    entry(Stage::Live2D, "最終調整・出力", TaskType::Export),
];

/// Exact-title lookup into the template.
pub fn template_type_for_title(title: &str) -> Option<TaskType> {
    TEMPLATE
        .iter()
        .find(|entry| entry.title == title)
        .map(|entry| entry.kind)
}

/// Builds a fresh default payload for `kind`. Every call returns newly
/// allocated item lists.
pub fn default_payload(kind: TaskType) -> Payload {
    match kind {
        TaskType::Generic | TaskType::Concept => Payload::Notes(NotesData::default()),
        TaskType::References => Payload::Links(LinksData::default()),
        TaskType::Palette => Payload::Palette(PaletteData::default()),
        TaskType::Expressions => checklist(&["通常", "喜び", "怒り", "悲しみ", "驚き", "困惑"], false),
        TaskType::Outfit => checklist(&["トップス", "ボトムス", "靴", "アクセサリー", "髪飾り"], false),
        TaskType::Checklist => checklist(&["チェック項目"], false),
        TaskType::Rough => checklist(&["ポーズ決定", "アタリ作成"], true),
        TaskType::Lineart => checklist(&["主線", "副線"], true),
        TaskType::Coloring => checklist(&["ベース塗り", "影つけ", "ハイライト"], true),
        TaskType::Parts => checklist(
            &["顔ベース", "目", "眉", "口", "前髪", "後ろ髪", "体", "服"],
            false,
        ),
        TaskType::Cubism => checklist(&["モデル新規作成", "テクスチャ読込", "メッシュ自動生成"], false),
        TaskType::Face => checklist(&["目の開閉", "眉の動き", "口の形"], false),
        TaskType::Physics => Payload::Physics(PhysicsData {
            params: vec![PhysicsParam::new("髪揺れ", 50), PhysicsParam::new("服揺れ", 50)],
            notes: None,
        }),
        TaskType::Motion => checklist(&["まばたき", "笑顔", "困り顔"], false),
        TaskType::Export => checklist(&["moc3書き出し", "動作確認", "プレビュー動画作成"], false),
    }
}

fn checklist(names: &[&str], with_notes: bool) -> Payload {
    Payload::Checklist(ChecklistData {
        items: names.iter().map(|name| ChecklistItem::new(name)).collect(),
        notes: with_notes.then(String::new),
    })
}
