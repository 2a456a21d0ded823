mod cli;
mod document;
mod entities;
mod error;
mod migrate;
mod model;
mod reconcile;
mod schema;
mod storage;
mod store;
mod util;
mod view;

use std::fs;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    CharacterAdd, CharacterCommand, CharacterRecolor, CharacterRename, CharacterTarget, Cli,
    Command, ImportArgs, ItemAdd, ItemRename, ItemTarget, ParamSet, StageArg, StageFilterArg,
    StatusFilterArg, TaskAdd, TaskCommand, TaskList, TaskMove, TaskPalette, TaskTarget, TaskText,
    TaskUpdate,
};
use crate::error::AppError;
use crate::model::{CharacterChanges, Payload, Stage, TaskChanges, DEFAULT_CHARACTER_COLOR};
use crate::reconcile::TemplateOutcome;
use crate::storage::SqliteStorage;
use crate::util::{format_character_list, format_stats, format_task_detail, format_task_list};
use crate::view::{StageFilter, StatusFilter, TaskFilter};

type AppStore = store::Store<SqliteStorage>;

const LOG_ENV: &str = "VTODO_LOG";

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), AppError> {
    let Cli {
        data_dir,
        character,
        command,
    } = Cli::parse();

    let data_dir = storage::resolve_data_dir(data_dir)?;
    let db_path = storage::resolve_db_path(&data_dir);
    storage::ensure_parent_dir(&db_path)?;
    let mut lock = storage::open_lock(&db_path)?;
    let _guard = lock.write()?;

    let storage = SqliteStorage::open(&db_path).await?;
    let store = AppStore::open(storage).await;
    if let Some(id) = character {
        if !store.focus(&id).await {
            return Err(AppError::NotFound(format!("character id {id}")));
        }
    }

    match command {
        Command::Character(command) => handle_character(&store, command).await,
        Command::Task(command) => handle_task(&store, command).await,
        Command::Stats => handle_stats(&store).await,
        Command::Export => handle_export(&store).await,
        Command::Import(args) => handle_import(&store, args).await,
    }
}

async fn handle_character(store: &AppStore, command: CharacterCommand) -> Result<(), AppError> {
    match command {
        CharacterCommand::Add(args) => handle_character_add(store, args).await,
        CharacterCommand::List => handle_character_list(store).await,
        CharacterCommand::Rename(args) => handle_character_rename(store, args).await,
        CharacterCommand::Recolor(args) => handle_character_recolor(store, args).await,
        CharacterCommand::Select(args) => handle_character_select(store, args).await,
        CharacterCommand::Remove(args) => handle_character_remove(store, args).await,
    }
}

async fn handle_task(store: &AppStore, command: TaskCommand) -> Result<(), AppError> {
    match command {
        TaskCommand::Add(args) => handle_task_add(store, args).await,
        TaskCommand::List(args) => handle_task_list(store, args).await,
        TaskCommand::Show(args) => handle_task_show(store, args).await,
        TaskCommand::Update(args) => handle_task_update(store, args).await,
        TaskCommand::Done(args) => handle_task_status(store, args, true).await,
        TaskCommand::Undo(args) => handle_task_status(store, args, false).await,
        TaskCommand::Toggle(args) => handle_task_toggle(store, args).await,
        TaskCommand::Remove(args) => handle_task_remove(store, args).await,
        TaskCommand::Move(args) => handle_task_move(store, args).await,
        TaskCommand::ClearCompleted => handle_task_clear_completed(store).await,
        TaskCommand::Template => handle_task_template(store).await,
        TaskCommand::Notes(args) => handle_task_notes(store, args).await,
        TaskCommand::Links(args) => handle_task_links(store, args).await,
        TaskCommand::Palette(args) => handle_task_palette(store, args).await,
        TaskCommand::ItemAdd(args) => handle_item_add(store, args).await,
        TaskCommand::ItemCheck(args) => handle_item_check(store, args).await,
        TaskCommand::ItemRename(args) => handle_item_rename(store, args).await,
        TaskCommand::ItemRemove(args) => handle_item_remove(store, args).await,
        TaskCommand::Param(args) => handle_param(store, args).await,
    }
}

async fn handle_character_add(store: &AppStore, args: CharacterAdd) -> Result<(), AppError> {
    require_non_empty("character name", &args.name)?;
    let color = args
        .color
        .unwrap_or_else(|| DEFAULT_CHARACTER_COLOR.to_string());
    require_non_empty("character color", &color)?;
    let character = store.add_character(args.name.trim().to_string(), color).await;
    println!("Created character ID: {}: {}", character.id, character.name);
    Ok(())
}

async fn handle_character_list(store: &AppStore) -> Result<(), AppError> {
    let document = store.snapshot().await;
    let active = store.active_character().await;
    println!("{}", format_character_list(&document.characters, &active.id));
    Ok(())
}

async fn handle_character_rename(store: &AppStore, args: CharacterRename) -> Result<(), AppError> {
    require_non_empty("character name", &args.name)?;
    let character = store
        .update_character(
            &args.id,
            CharacterChanges {
                name: Some(args.name),
                ..Default::default()
            },
        )
        .await
        .ok_or_else(|| AppError::NotFound(format!("character id {}", args.id)))?;
    println!("Updated character ID: {}: {}", character.id, character.name);
    Ok(())
}

async fn handle_character_recolor(
    store: &AppStore,
    args: CharacterRecolor,
) -> Result<(), AppError> {
    require_non_empty("character color", &args.color)?;
    let character = store
        .update_character(
            &args.id,
            CharacterChanges {
                color: Some(args.color),
                ..Default::default()
            },
        )
        .await
        .ok_or_else(|| AppError::NotFound(format!("character id {}", args.id)))?;
    println!("Updated character ID: {}: {}", character.id, character.color);
    Ok(())
}

async fn handle_character_select(store: &AppStore, args: CharacterTarget) -> Result<(), AppError> {
    if !store.select_character(&args.id).await {
        return Err(AppError::NotFound(format!("character id {}", args.id)));
    }
    let character = store.active_character().await;
    println!("Selected character ID: {}: {}", character.id, character.name);
    Ok(())
}

async fn handle_character_remove(store: &AppStore, args: CharacterTarget) -> Result<(), AppError> {
    let document = store.snapshot().await;
    if document.character(&args.id).is_none() {
        return Err(AppError::NotFound(format!("character id {}", args.id)));
    }
    if !store.delete_character(&args.id).await {
        return Err(AppError::InvalidInput(
            "cannot remove the last character".to_string(),
        ));
    }
    println!("Character ID: {} removed.", args.id);
    Ok(())
}

async fn handle_task_add(store: &AppStore, args: TaskAdd) -> Result<(), AppError> {
    require_non_empty("task title", &args.title)?;
    let task = store
        .add_task(&args.title, stage_from_arg(args.stage))
        .await
        .ok_or_else(|| AppError::InvalidInput("task title cannot be empty".to_string()))?;
    println!("Created task ID: {}: {}", task.id, task.title);
    Ok(())
}

async fn handle_task_list(store: &AppStore, args: TaskList) -> Result<(), AppError> {
    let filter = TaskFilter {
        status: status_filter_from_arg(args.status),
        stage: stage_filter_from_arg(args.stage),
    };
    let tasks = store.filtered_tasks(filter).await;
    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }
    println!("{}", format_task_list(&tasks));
    Ok(())
}

async fn handle_task_show(store: &AppStore, args: TaskTarget) -> Result<(), AppError> {
    let task = store
        .find_task(&args.id)
        .await
        .ok_or_else(|| task_not_found(&args.id))?;
    println!("{}", format_task_detail(&task));
    Ok(())
}

async fn handle_task_update(store: &AppStore, args: TaskUpdate) -> Result<(), AppError> {
    if args.title.is_none() && args.stage.is_none() {
        return Err(AppError::InvalidInput(
            "task update requires --title or --stage".to_string(),
        ));
    }
    if let Some(title) = args.title.as_deref() {
        require_non_empty("task title", title)?;
    }
    let changes = TaskChanges {
        title: args.title,
        stage: args.stage.map(stage_from_arg),
        ..Default::default()
    };
    let task = store
        .update_task(&args.id, changes)
        .await
        .ok_or_else(|| task_not_found(&args.id))?;
    println!("Updated task ID: {}: {}", task.id, task.title);
    Ok(())
}

async fn handle_task_status(
    store: &AppStore,
    args: TaskTarget,
    completed: bool,
) -> Result<(), AppError> {
    let changes = TaskChanges {
        completed: Some(completed),
        ..Default::default()
    };
    let task = store
        .update_task(&args.id, changes)
        .await
        .ok_or_else(|| task_not_found(&args.id))?;
    println!("Task ID: {} marked {}.", task.id, status_label(task.completed));
    Ok(())
}

async fn handle_task_toggle(store: &AppStore, args: TaskTarget) -> Result<(), AppError> {
    let task = store
        .toggle_task(&args.id)
        .await
        .ok_or_else(|| task_not_found(&args.id))?;
    println!("Task ID: {} marked {}.", task.id, status_label(task.completed));
    Ok(())
}

async fn handle_task_remove(store: &AppStore, args: TaskTarget) -> Result<(), AppError> {
    if !store.delete_task(&args.id).await {
        return Err(task_not_found(&args.id));
    }
    println!("Task ID: {} removed.", args.id);
    Ok(())
}

async fn handle_task_move(store: &AppStore, args: TaskMove) -> Result<(), AppError> {
    let total = store.tasks().await.len();
    if args.from == 0 || args.from > total {
        return Err(AppError::InvalidInput(format!(
            "position {} is out of range (1-{total})",
            args.from
        )));
    }
    if args.to == 0 {
        return Err(AppError::InvalidInput("positions start at 1".to_string()));
    }
    let to = args.to.min(total);
    if store.reorder_task(args.from - 1, to - 1).await {
        println!("Moved task from position {} to {}.", args.from, to);
    } else {
        println!("Task order unchanged.");
    }
    Ok(())
}

async fn handle_task_clear_completed(store: &AppStore) -> Result<(), AppError> {
    let removed = store.clear_completed().await;
    println!("Removed {removed} completed task(s).");
    Ok(())
}

async fn handle_task_template(store: &AppStore) -> Result<(), AppError> {
    match store.add_template_tasks().await {
        TemplateOutcome::AllPresent => println!("All template tasks are already present."),
        TemplateOutcome::Added {
            added,
            partial: true,
        } => println!("Added {added} missing template task(s)."),
        TemplateOutcome::Added {
            added,
            partial: false,
        } => println!("Added {added} template tasks."),
    }
    Ok(())
}

async fn handle_task_notes(store: &AppStore, args: TaskText) -> Result<(), AppError> {
    let TaskText { id, text } = args;
    let task = edit_task_payload(store, &id, "notes", |data| {
        data.set_notes(text);
        true
    })
    .await?;
    println!("Updated notes for task ID: {}.", task.id);
    Ok(())
}

async fn handle_task_links(store: &AppStore, args: TaskText) -> Result<(), AppError> {
    let TaskText { id, text } = args;
    let task = edit_task_payload(store, &id, "links", |data| data.set_links(text)).await?;
    println!(
        "Updated links for task ID: {} ({} link(s)).",
        task.id,
        task.data.link_list().len()
    );
    Ok(())
}

async fn handle_task_palette(store: &AppStore, args: TaskPalette) -> Result<(), AppError> {
    if args.main.is_none() && args.sub.is_none() {
        return Err(AppError::InvalidInput(
            "task palette requires --main or --sub".to_string(),
        ));
    }
    let TaskPalette { id, main, sub } = args;
    let task = edit_task_payload(store, &id, "palette", |data| data.set_colors(main, sub)).await?;
    if let Payload::Palette(palette) = &task.data {
        println!(
            "Updated palette for task ID: {}: {} / {}",
            task.id, palette.main_color, palette.sub_color
        );
    }
    Ok(())
}

async fn handle_item_add(store: &AppStore, args: ItemAdd) -> Result<(), AppError> {
    require_non_empty("item name", &args.name)?;
    let name = args.name.trim().to_string();
    let task = edit_task_payload(store, &args.id, "checklist", |data| data.add_item(&name)).await?;
    println!(
        "Added item {}: {} to task ID: {}.",
        task.data.items().len(),
        name,
        task.id
    );
    Ok(())
}

async fn handle_item_check(store: &AppStore, args: ItemTarget) -> Result<(), AppError> {
    let index = zero_based(args.index)?;
    let label = format!("checklist item {}", args.index);
    let task = edit_task_payload(store, &args.id, &label, |data| data.toggle_item(index)).await?;
    if let Some(item) = task.data.items().get(index) {
        println!(
            "Item {}: {} marked {}.",
            args.index,
            item.name,
            status_label(item.checked)
        );
    }
    Ok(())
}

async fn handle_item_rename(store: &AppStore, args: ItemRename) -> Result<(), AppError> {
    require_non_empty("item name", &args.name)?;
    let index = zero_based(args.index)?;
    let name = args.name.trim().to_string();
    let label = format!("checklist item {}", args.index);
    let task =
        edit_task_payload(store, &args.id, &label, |data| data.rename_item(index, &name)).await?;
    println!("Renamed item {} of task ID: {} to {}.", args.index, task.id, name);
    Ok(())
}

async fn handle_item_remove(store: &AppStore, args: ItemTarget) -> Result<(), AppError> {
    let index = zero_based(args.index)?;
    let label = format!("checklist item {}", args.index);
    let task = edit_task_payload(store, &args.id, &label, |data| data.remove_item(index)).await?;
    println!("Removed item {} from task ID: {}.", args.index, task.id);
    Ok(())
}

async fn handle_param(store: &AppStore, args: ParamSet) -> Result<(), AppError> {
    let index = zero_based(args.index)?;
    let label = format!("physics parameter {}", args.index);
    let task = edit_task_payload(store, &args.id, &label, |data| {
        data.set_param(index, args.value)
    })
    .await?;
    if let Payload::Physics(physics) = &task.data {
        if let Some(param) = physics.params.get(index) {
            println!("Set {} to {}%.", param.name, param.value);
        }
    }
    Ok(())
}

async fn handle_stats(store: &AppStore) -> Result<(), AppError> {
    let character = store.active_character().await;
    let stats = store.stats().await;
    println!("{}", format_stats(&character, &stats));
    Ok(())
}

async fn handle_export(store: &AppStore) -> Result<(), AppError> {
    let document = store.snapshot().await;
    println!("{}", serde_json::to_string_pretty(document.as_ref())?);
    Ok(())
}

async fn handle_import(store: &AppStore, args: ImportArgs) -> Result<(), AppError> {
    let raw = fs::read_to_string(&args.path)?;
    let value: Value = serde_json::from_str(&raw)?;
    let document = migrate::migrate_value(value).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "unrecognized document format in {}",
            args.path.display()
        ))
    })?;
    let characters = document.characters.len();
    let tasks: usize = document.tasks_by_character.values().map(Vec::len).sum();
    store.replace_document(document).await;
    println!("Imported {characters} character(s) and {tasks} task(s).");
    Ok(())
}

/// Runs a payload edit, telling a missing task apart from a payload that
/// lacks what `label` names.
async fn edit_task_payload<F>(
    store: &AppStore,
    id: &str,
    label: &str,
    edit: F,
) -> Result<crate::model::Task, AppError>
where
    F: FnOnce(&mut Payload) -> bool,
{
    if store.find_task(id).await.is_none() {
        return Err(task_not_found(id));
    }
    store
        .edit_payload(id, edit)
        .await
        .ok_or_else(|| AppError::InvalidInput(format!("task id {id} has no {label}")))
}

fn task_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("task id {id}"))
}

fn zero_based(position: usize) -> Result<usize, AppError> {
    position
        .checked_sub(1)
        .ok_or_else(|| AppError::InvalidInput("positions start at 1".to_string()))
}

fn status_label(completed: bool) -> &'static str {
    if completed {
        "done"
    } else {
        "active"
    }
}

fn stage_from_arg(arg: StageArg) -> Stage {
    match arg {
        StageArg::CharaDesign => Stage::CharaDesign,
        StageArg::Illustration => Stage::Illustration,
        StageArg::Live2d => Stage::Live2D,
    }
}

fn stage_filter_from_arg(arg: StageFilterArg) -> StageFilter {
    match arg {
        StageFilterArg::All => StageFilter::All,
        StageFilterArg::CharaDesign => StageFilter::Only(Stage::CharaDesign),
        StageFilterArg::Illustration => StageFilter::Only(Stage::Illustration),
        StageFilterArg::Live2d => StageFilter::Only(Stage::Live2D),
    }
}

fn status_filter_from_arg(arg: StatusFilterArg) -> StatusFilter {
    match arg {
        StatusFilterArg::All => StatusFilter::All,
        StatusFilterArg::Active => StatusFilter::Active,
        StatusFilterArg::Done => StatusFilter::Done,
    }
}

fn require_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}
