use chrono::DateTime;

use crate::model::{Character, Payload, Task};
use crate::view::{Progress, Stats};

fn has_text(value: Option<&str>) -> bool {
    value.map(|text| !text.trim().is_empty()).unwrap_or(false)
}

pub fn format_datetime(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(dt) if millis > 0 => dt.format("%Y-%m-%d %H:%M").to_string(),
        _ => "-".to_string(),
    }
}

fn checkbox(checked: bool) -> &'static str {
    if checked {
        "x"
    } else {
        " "
    }
}

fn format_progress(progress: Progress) -> String {
    format!("{}/{}", progress.done, progress.total)
}

pub fn format_task_detail(task: &Task) -> String {
    let mut output = String::new();
    output.push_str(&format!("Task ID: {}\n", task.id));
    output.push_str(&format!("Title: {}\n", task.title));
    output.push_str(&format!("Stage: {}\n", task.stage.label()));
    output.push_str(&format!("Type: {}\n", task.kind.as_str()));
    output.push_str(&format!(
        "Status: {}\n",
        if task.completed { "done" } else { "active" }
    ));
    output.push_str(&format!("Created: {}\n", format_datetime(task.created_at)));
    output.push('\n');
    output.push_str(&format_payload(&task.data));
    output.trim_end().to_string()
}

fn format_payload(payload: &Payload) -> String {
    let mut output = String::new();
    match payload {
        Payload::Notes(_) => {}
        Payload::Links(_) => {
            let links = payload.link_list();
            if links.is_empty() {
                output.push_str("Links: (none)\n");
            } else {
                output.push_str("Links:\n");
                for link in links {
                    output.push_str(&format!("- {link}\n"));
                }
            }
        }
        Payload::Palette(data) => {
            output.push_str(&format!("Main color: {}\n", data.main_color));
            output.push_str(&format!("Sub color: {}\n", data.sub_color));
        }
        Payload::Checklist(data) => {
            if data.items.is_empty() {
                output.push_str("Items: (none)\n");
            } else {
                output.push_str("Items:\n");
                for (idx, item) in data.items.iter().enumerate() {
                    output.push_str(&format!(
                        "{}. [{}] {}\n",
                        idx + 1,
                        checkbox(item.checked),
                        item.name
                    ));
                }
            }
        }
        Payload::Physics(data) => {
            output.push_str("Params:\n");
            for (idx, param) in data.params.iter().enumerate() {
                output.push_str(&format!("{}. {} {}%\n", idx + 1, param.name, param.value));
            }
        }
    }
    if has_text(payload.notes()) {
        output.push_str(&format!("Notes: {}\n", payload.notes().unwrap_or("")));
    }
    output
}

pub fn format_task_list(tasks: &[(usize, Task)]) -> String {
    let mut output = format!(
        "{:<4} {:<4} {:<14} {:<12} {:<30} {}\n",
        "#", "DONE", "STAGE", "TYPE", "TITLE", "ID"
    );
    for (position, task) in tasks {
        output.push_str(&format!(
            "{:<4} {:<4} {:<14} {:<12} {:<30} {}\n",
            position,
            format!("[{}]", checkbox(task.completed)),
            task.stage.as_str(),
            task.kind.as_str(),
            task.title,
            task.id
        ));
    }
    output.trim_end().to_string()
}

pub fn format_character_list(characters: &[Character], active_id: &str) -> String {
    let mut output = format!("{:<2} {:<38} {:<9} {}\n", "", "ID", "COLOR", "NAME");
    for character in characters {
        let marker = if character.id == active_id { "*" } else { "" };
        output.push_str(&format!(
            "{:<2} {:<38} {:<9} {}\n",
            marker, character.id, character.color, character.name
        ));
    }
    output.trim_end().to_string()
}

pub fn format_stats(character: &Character, stats: &Stats) -> String {
    let mut output = String::new();
    output.push_str(&format!("Character: {}\n", character.name));
    output.push_str(&format!("All: {}\n", format_progress(stats.all)));
    for (stage, progress) in &stats.by_stage {
        output.push_str(&format!("{}: {}\n", stage.label(), format_progress(*progress)));
    }
    output.trim_end().to_string()
}
