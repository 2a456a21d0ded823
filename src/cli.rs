use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "vtodo",
    version,
    about = "Track VTuber production tasks per character"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Directory holding vtodo.db (defaults to $VTODO_HOME or ~/.vtodo)"
    )]
    pub data_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "ID",
        help = "Act on this character instead of the selected one"
    )]
    pub character: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Character(CharacterCommand),
    #[command(subcommand)]
    Task(TaskCommand),
    /// Show done/total counts overall and per stage
    Stats,
    /// Print the stored document as JSON
    Export,
    /// Replace the document with a JSON file (older formats are upgraded)
    Import(ImportArgs),
}

#[derive(Subcommand, Debug)]
pub enum CharacterCommand {
    Add(CharacterAdd),
    List,
    Rename(CharacterRename),
    Recolor(CharacterRecolor),
    Select(CharacterTarget),
    Remove(CharacterTarget),
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    Add(TaskAdd),
    List(TaskList),
    Show(TaskTarget),
    Update(TaskUpdate),
    Done(TaskTarget),
    Undo(TaskTarget),
    Toggle(TaskTarget),
    Remove(TaskTarget),
    Move(TaskMove),
    #[command(name = "clear-completed")]
    ClearCompleted,
    /// Add the template tasks this character is missing
    Template,
    Notes(TaskText),
    Links(TaskText),
    Palette(TaskPalette),
    #[command(name = "item-add")]
    ItemAdd(ItemAdd),
    #[command(name = "item-check")]
    ItemCheck(ItemTarget),
    #[command(name = "item-rename")]
    ItemRename(ItemRename),
    #[command(name = "item-remove")]
    ItemRemove(ItemTarget),
    Param(ParamSet),
}

#[derive(Args, Debug)]
pub struct CharacterAdd {
    pub name: String,
    #[arg(long, value_name = "HEX")]
    pub color: Option<String>,
}

#[derive(Args, Debug)]
pub struct CharacterRename {
    pub id: String,
    pub name: String,
}

#[derive(Args, Debug)]
pub struct CharacterRecolor {
    pub id: String,
    pub color: String,
}

#[derive(Args, Debug)]
pub struct CharacterTarget {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct TaskAdd {
    pub title: String,
    #[arg(long, value_enum, default_value_t = StageArg::CharaDesign)]
    pub stage: StageArg,
}

#[derive(Args, Debug)]
pub struct TaskList {
    #[arg(long, value_enum, default_value_t = StatusFilterArg::All)]
    pub status: StatusFilterArg,
    #[arg(long, value_enum, default_value_t = StageFilterArg::All)]
    pub stage: StageFilterArg,
}

#[derive(Args, Debug)]
pub struct TaskTarget {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct TaskUpdate {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, value_enum)]
    pub stage: Option<StageArg>,
}

#[derive(Args, Debug)]
pub struct TaskMove {
    #[arg(help = "Current position (1-based)")]
    pub from: usize,
    #[arg(help = "New position (1-based, clamped to the end)")]
    pub to: usize,
}

#[derive(Args, Debug)]
pub struct TaskText {
    pub id: String,
    pub text: String,
}

#[derive(Args, Debug)]
pub struct TaskPalette {
    pub id: String,
    #[arg(long, value_name = "HEX")]
    pub main: Option<String>,
    #[arg(long, value_name = "HEX")]
    pub sub: Option<String>,
}

#[derive(Args, Debug)]
pub struct ItemAdd {
    pub id: String,
    pub name: String,
}

#[derive(Args, Debug)]
pub struct ItemTarget {
    pub id: String,
    #[arg(help = "Item position (1-based)")]
    pub index: usize,
}

#[derive(Args, Debug)]
pub struct ItemRename {
    pub id: String,
    pub index: usize,
    pub name: String,
}

#[derive(Args, Debug)]
pub struct ParamSet {
    pub id: String,
    pub index: usize,
    #[arg(allow_negative_numbers = true, help = "0-100, clamped")]
    pub value: i64,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub path: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StageArg {
    CharaDesign,
    Illustration,
    Live2d,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StageFilterArg {
    All,
    CharaDesign,
    Illustration,
    Live2d,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StatusFilterArg {
    All,
    Active,
    Done,
}
