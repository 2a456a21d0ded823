use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Character, CharacterChanges, Stage, Task, TaskChanges, TaskType};

/// Characters in display order plus one ordered task list per character.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub characters: Vec<Character>,
    #[serde(alias = "todosByCharacter")]
    pub tasks_by_character: BTreeMap<String, Vec<Task>>,
}

impl Default for Document {
    fn default() -> Self {
        let character = Character::default_character();
        let mut tasks_by_character = BTreeMap::new();
        tasks_by_character.insert(character.id.clone(), Vec::new());
        Self {
            characters: vec![character],
            tasks_by_character,
        }
    }
}

impl Document {
    /// Restores the structural invariants: at least one character, unique
    /// character ids, exactly one task list per character and unique task
    /// ids. Duplicate task ids are replaced, never dropped.
    pub fn enforce_invariants(&mut self) {
        let mut seen = HashSet::new();
        self.characters
            .retain(|character| !character.id.is_empty() && seen.insert(character.id.clone()));
        if self.characters.is_empty() {
            let orphaned = std::mem::take(&mut self.tasks_by_character);
            *self = Self::default();
            if orphaned.len() == 1 {
                if let Some((_, tasks)) = orphaned.into_iter().next() {
                    self.tasks_by_character
                        .insert(self.characters[0].id.clone(), tasks);
                }
            }
        }
        let ids: HashSet<&str> = self.characters.iter().map(|c| c.id.as_str()).collect();
        self.tasks_by_character.retain(|id, _| ids.contains(id.as_str()));
        for character in &self.characters {
            self.tasks_by_character
                .entry(character.id.clone())
                .or_default();
        }
        let mut seen = HashSet::new();
        for task in self.tasks_by_character.values_mut().flatten() {
            if !seen.insert(task.id.clone()) {
                let fresh = Uuid::new_v4().to_string();
                tracing::debug!(duplicate = %task.id, %fresh, "reassigned duplicate task id");
                task.id = fresh.clone();
                seen.insert(fresh);
            }
        }
    }

    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|character| character.id == id)
    }

    pub fn tasks(&self, character_id: &str) -> &[Task] {
        self.tasks_by_character
            .get(character_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_task(&self, character_id: &str, task_id: &str) -> Option<&Task> {
        self.tasks(character_id).iter().find(|task| task.id == task_id)
    }

    pub fn push_character(&mut self, character: Character) {
        self.tasks_by_character
            .insert(character.id.clone(), Vec::new());
        self.characters.push(character);
    }

    pub fn update_character(&mut self, id: &str, changes: CharacterChanges) -> bool {
        let Some(character) = self.characters.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        let mut changed = false;
        if let Some(name) = changes.name.filter(|name| !name.trim().is_empty()) {
            changed |= character.name != name;
            character.name = name;
        }
        if let Some(color) = changes.color {
            changed |= character.color != color;
            character.color = color;
        }
        changed
    }

    /// Removes a character and its task list. Refused for the last one.
    pub fn remove_character(&mut self, id: &str) -> bool {
        if self.characters.len() <= 1 {
            return false;
        }
        let before = self.characters.len();
        self.characters.retain(|character| character.id != id);
        if self.characters.len() == before {
            return false;
        }
        self.tasks_by_character.remove(id);
        true
    }

    /// Prepends a generic task. Blank titles are ignored.
    pub fn add_task(
        &mut self,
        character_id: &str,
        title: &str,
        stage: Stage,
        created_at: i64,
    ) -> Option<Task> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        let list = self.tasks_by_character.get_mut(character_id)?;
        let task = Task::new(title.to_string(), stage, TaskType::Generic, created_at);
        list.insert(0, task.clone());
        Some(task)
    }

    pub fn prepend_tasks(&mut self, character_id: &str, tasks: Vec<Task>) -> bool {
        if tasks.is_empty() {
            return false;
        }
        let Some(list) = self.tasks_by_character.get_mut(character_id) else {
            return false;
        };
        list.splice(0..0, tasks);
        true
    }

    pub fn update_task(
        &mut self,
        character_id: &str,
        task_id: &str,
        changes: TaskChanges,
    ) -> Option<Task> {
        let task = self
            .tasks_by_character
            .get_mut(character_id)?
            .iter_mut()
            .find(|task| task.id == task_id)?;
        if let Some(title) = changes.title {
            let title = title.trim();
            if !title.is_empty() {
                task.title = title.to_string();
            }
        }
        if let Some(stage) = changes.stage {
            task.stage = stage;
        }
        if let Some(completed) = changes.completed {
            task.completed = completed;
        }
        if let Some(data) = changes.data {
            if data.shape() == task.kind.shape() {
                task.data = data;
            } else {
                tracing::debug!(task = task_id, kind = task.kind.as_str(), "payload shape mismatch ignored");
            }
        }
        Some(task.clone())
    }

    pub fn remove_task(&mut self, character_id: &str, task_id: &str) -> bool {
        let Some(list) = self.tasks_by_character.get_mut(character_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|task| task.id != task_id);
        list.len() != before
    }

    /// Moves the task at `from` to `to`, shifting the tasks in between.
    /// An out-of-range `from` is ignored; `to` is clamped to the last index.
    pub fn move_task(&mut self, character_id: &str, from: usize, to: usize) -> bool {
        let Some(list) = self.tasks_by_character.get_mut(character_id) else {
            return false;
        };
        if from >= list.len() {
            return false;
        }
        let to = to.min(list.len() - 1);
        if from == to {
            return false;
        }
        let moving = list.remove(from);
        list.insert(to, moving);
        true
    }

    pub fn clear_completed(&mut self, character_id: &str) -> usize {
        let Some(list) = self.tasks_by_character.get_mut(character_id) else {
            return 0;
        };
        let before = list.len();
        list.retain(|task| !task.completed);
        before - list.len()
    }
}
