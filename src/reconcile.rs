use std::collections::HashSet;

use crate::model::Task;
use crate::schema::TEMPLATE;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TemplateOutcome {
    AllPresent,
    /// `partial` is set when some template tasks already existed.
    Added { added: usize, partial: bool },
}

fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// New tasks for every template entry whose title (trimmed, case-insensitive)
/// is not already in `existing`, in template order.
pub fn missing_template_tasks(existing: &[Task], created_at: i64) -> Vec<Task> {
    let titles: HashSet<String> = existing
        .iter()
        .map(|task| normalize_title(&task.title))
        .collect();
    TEMPLATE
        .iter()
        .filter(|entry| !titles.contains(&normalize_title(entry.title)))
        .map(|entry| Task::new(entry.title.to_string(), entry.stage, entry.kind, created_at))
        .collect()
}

pub fn outcome(added: usize) -> TemplateOutcome {
    if added == 0 {
        TemplateOutcome::AllPresent
    } else {
        TemplateOutcome::Added {
            added,
            partial: added < TEMPLATE.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Stage, TaskType};
    use crate::schema::default_payload;

    #[test]
    fn empty_list_gets_the_whole_template() {
        let tasks = missing_template_tasks(&[], 100);
        assert_eq!(tasks.len(), 16);
        for (task, entry) in tasks.iter().zip(TEMPLATE.iter()) {
            assert_eq!(task.title, entry.title);
            assert_eq!(task.stage, entry.stage);
            assert_eq!(task.kind, entry.kind);
            assert_eq!(task.data, default_payload(entry.kind));
            assert!(!task.completed);
            assert_eq!(task.created_at, 100);
        }
        assert_eq!(outcome(tasks.len()), TemplateOutcome::Added { added: 16, partial: false });
    }

    #[test]
    fn complete_list_gets_nothing() {
        let existing = missing_template_tasks(&[], 0);
        assert!(missing_template_tasks(&existing, 1).is_empty());
        assert_eq!(outcome(0), TemplateOutcome::AllPresent);
    }

    #[test]
    fn titles_match_trimmed_and_case_insensitive() {
        let existing = vec![
            Task::new("  cubismセットアップ ".to_string(), Stage::Live2D, TaskType::Generic, 0),
            Task::new("線画作成".to_string(), Stage::CharaDesign, TaskType::Generic, 0),
        ];
        let missing = missing_template_tasks(&existing, 0);
        assert_eq!(missing.len(), 14);
        assert!(missing.iter().all(|task| task.title != "Cubismセットアップ"));
        assert!(missing.iter().all(|task| task.title != "線画作成"));
        assert_eq!(
            outcome(missing.len()),
            TemplateOutcome::Added { added: 14, partial: true }
        );
    }

    #[test]
    fn new_tasks_get_distinct_ids() {
        let tasks = missing_template_tasks(&[], 0);
        let ids: HashSet<_> = tasks.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids.len(), tasks.len());
    }
}
