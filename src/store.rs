use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::document::Document;
use crate::migrate::migrate;
use crate::model::{Character, CharacterChanges, Payload, Stage, Task, TaskChanges};
use crate::reconcile::{missing_template_tasks, outcome, TemplateOutcome};
use crate::storage::{Storage, ACTIVE_KEY, DOCUMENT_KEY, UNRECOGNIZED_KEY};
use crate::view::{Stats, TaskFilter};

/// Owns the canonical document. Every mutation builds a new snapshot from
/// the current one, swaps it in and saves it while still holding the lock,
/// so there is exactly one writer and saves land in mutation order.
pub struct Store<S: Storage> {
    storage: S,
    state: Mutex<State>,
}

struct State {
    document: Arc<Document>,
    active_id: String,
}

impl<S: Storage> Store<S> {
    /// Hydrates from storage through the migration engine. Never fails;
    /// unreadable storage starts from the default document. The migrated
    /// document is written back only when the stored one was read and any
    /// unrecognized input was backed up first.
    pub async fn open(storage: S) -> Self {
        let (raw, mut may_overwrite) = match storage.load(DOCUMENT_KEY).await {
            Ok(raw) => (raw, true),
            Err(err) => {
                tracing::warn!(%err, "failed to read persisted document");
                (None, false)
            }
        };
        let migration = migrate(raw.as_deref());
        if let Some(unrecognized) = migration.unrecognized.as_deref() {
            if let Err(err) = storage.save(UNRECOGNIZED_KEY, unrecognized).await {
                tracing::warn!(%err, "failed to back up unrecognized document; leaving it in place");
                may_overwrite = false;
            }
        }

        let stored_active = storage.load(ACTIVE_KEY).await.ok().flatten();
        let changed = migration.changed();
        let version = migration.version;
        let document = migration.document;
        let active_id = stored_active
            .filter(|id| document.character(id).is_some())
            .unwrap_or_else(|| document.characters[0].id.clone());

        let store = Self {
            storage,
            state: Mutex::new(State {
                document: Arc::new(document),
                active_id,
            }),
        };
        if changed && may_overwrite {
            tracing::info!(from = version.as_str(), "writing migrated document");
            let state = store.state.lock().await;
            store.persist(&state.document).await;
        }
        store
    }

    pub async fn snapshot(&self) -> Arc<Document> {
        Arc::clone(&self.state.lock().await.document)
    }

    pub async fn active_character(&self) -> Character {
        let state = self.state.lock().await;
        state
            .document
            .character(&state.active_id)
            .unwrap_or(&state.document.characters[0])
            .clone()
    }

    pub async fn tasks(&self) -> Vec<Task> {
        let state = self.state.lock().await;
        state.document.tasks(&state.active_id).to_vec()
    }

    /// Matching tasks of the active character with their 1-based positions.
    pub async fn filtered_tasks(&self, filter: TaskFilter) -> Vec<(usize, Task)> {
        let state = self.state.lock().await;
        filter
            .apply(state.document.tasks(&state.active_id))
            .into_iter()
            .map(|(position, task)| (position, task.clone()))
            .collect()
    }

    pub async fn find_task(&self, id: &str) -> Option<Task> {
        let state = self.state.lock().await;
        state.document.find_task(&state.active_id, id).cloned()
    }

    pub async fn stats(&self) -> Stats {
        let state = self.state.lock().await;
        Stats::of(state.document.tasks(&state.active_id))
    }

    /// Switches the active character for this session only.
    pub async fn focus(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.document.character(id).is_none() {
            return false;
        }
        state.active_id = id.to_string();
        true
    }

    /// Switches the active character and remembers the choice.
    pub async fn select_character(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.document.character(id).is_none() {
            return false;
        }
        state.active_id = id.to_string();
        self.persist_active(id).await;
        true
    }

    pub async fn add_character(&self, name: String, color: String) -> Character {
        let mut state = self.state.lock().await;
        let character = Character::new(name, color);
        let mut next = (*state.document).clone();
        next.push_character(character.clone());
        state.document = Arc::new(next);
        state.active_id = character.id.clone();
        self.persist(&state.document).await;
        self.persist_active(&character.id).await;
        character
    }

    pub async fn update_character(&self, id: &str, changes: CharacterChanges) -> Option<Character> {
        let mut state = self.state.lock().await;
        let mut next = (*state.document).clone();
        if !next.update_character(id, changes) {
            return state.document.character(id).cloned();
        }
        let updated = next.character(id).cloned();
        state.document = Arc::new(next);
        self.persist(&state.document).await;
        updated
    }

    /// Refused when `id` is the only character. Deleting the active
    /// character moves the selection to the first remaining one.
    pub async fn delete_character(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let mut next = (*state.document).clone();
        if !next.remove_character(id) {
            return false;
        }
        state.document = Arc::new(next);
        self.persist(&state.document).await;
        if state.active_id == id {
            state.active_id = state.document.characters[0].id.clone();
            self.persist_active(&state.active_id).await;
        }
        true
    }

    pub async fn add_task(&self, title: &str, stage: Stage) -> Option<Task> {
        self.commit(|doc, active| doc.add_task(active, title, stage, now_millis()))
            .await
    }

    pub async fn add_template_tasks(&self) -> TemplateOutcome {
        let added = self
            .commit(|doc, active| {
                let missing = missing_template_tasks(doc.tasks(active), now_millis());
                let count = missing.len();
                doc.prepend_tasks(active, missing).then_some(count)
            })
            .await
            .unwrap_or(0);
        outcome(added)
    }

    pub async fn update_task(&self, id: &str, changes: TaskChanges) -> Option<Task> {
        self.commit(|doc, active| doc.update_task(active, id, changes))
            .await
    }

    pub async fn toggle_task(&self, id: &str) -> Option<Task> {
        self.commit(|doc, active| {
            let completed = doc.find_task(active, id)?.completed;
            doc.update_task(
                active,
                id,
                TaskChanges {
                    completed: Some(!completed),
                    ..Default::default()
                },
            )
        })
        .await
    }

    /// Applies `edit` to a copy of the task's payload and stores the result.
    /// Returns `None` when the task is missing or `edit` declines.
    pub async fn edit_payload<F>(&self, id: &str, edit: F) -> Option<Task>
    where
        F: FnOnce(&mut Payload) -> bool,
    {
        self.commit(|doc, active| {
            let mut data = doc.find_task(active, id)?.data.clone();
            if !edit(&mut data) {
                return None;
            }
            doc.update_task(
                active,
                id,
                TaskChanges {
                    data: Some(data),
                    ..Default::default()
                },
            )
        })
        .await
    }

    pub async fn delete_task(&self, id: &str) -> bool {
        self.commit(|doc, active| doc.remove_task(active, id).then_some(()))
            .await
            .is_some()
    }

    pub async fn reorder_task(&self, from: usize, to: usize) -> bool {
        self.commit(|doc, active| doc.move_task(active, from, to).then_some(()))
            .await
            .is_some()
    }

    pub async fn clear_completed(&self) -> usize {
        self.commit(|doc, active| {
            let removed = doc.clear_completed(active);
            (removed > 0).then_some(removed)
        })
        .await
        .unwrap_or(0)
    }

    /// Replaces the whole document, e.g. from an imported file.
    pub async fn replace_document(&self, document: Document) {
        let mut state = self.state.lock().await;
        if document.character(&state.active_id).is_none() {
            state.active_id = document.characters[0].id.clone();
            self.persist_active(&state.active_id).await;
        }
        state.document = Arc::new(document);
        self.persist(&state.document).await;
    }

    /// Runs `apply` against a copy of the current document for the active
    /// character. `None` means nothing changed: the old snapshot stays and
    /// nothing is saved.
    async fn commit<T, F>(&self, apply: F) -> Option<T>
    where
        F: FnOnce(&mut Document, &str) -> Option<T>,
    {
        let mut state = self.state.lock().await;
        let mut next = (*state.document).clone();
        let result = apply(&mut next, &state.active_id)?;
        state.document = Arc::new(next);
        self.persist(&state.document).await;
        Some(result)
    }

    async fn persist(&self, document: &Document) {
        let raw = match serde_json::to_string(document) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(%err, "failed to encode document");
                return;
            }
        };
        if let Err(err) = self.storage.save(DOCUMENT_KEY, &raw).await {
            tracing::warn!(%err, "failed to save document; keeping in-memory state");
        }
    }

    async fn persist_active(&self, id: &str) {
        if let Err(err) = self.storage.save(ACTIVE_KEY, id).await {
            tracing::warn!(%err, "failed to save active character");
        }
    }

    #[cfg(test)]
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskType;
    use crate::schema::TEMPLATE;
    use crate::storage::memory::MemoryStorage;
    use crate::view::{StageFilter, StatusFilter};
    use serde_json::json;

    async fn empty_store() -> Store<MemoryStorage> {
        Store::open(MemoryStorage::default()).await
    }

    async fn titles(store: &Store<MemoryStorage>) -> Vec<String> {
        store.tasks().await.into_iter().map(|task| task.title).collect()
    }

    async fn store_with(titles: &[&str]) -> Store<MemoryStorage> {
        let store = empty_store().await;
        for title in titles.iter().rev() {
            store
                .add_task(title, Stage::CharaDesign)
                .await
                .expect("add task");
        }
        store
    }

    fn saved_document(store: &Store<MemoryStorage>) -> Document {
        let raw = store.storage().get(DOCUMENT_KEY).expect("saved document");
        serde_json::from_str(&raw).expect("decode saved document")
    }

    #[tokio::test]
    async fn open_on_empty_storage_writes_default_document() {
        let store = empty_store().await;
        assert_eq!(*store.snapshot().await, Document::default());
        assert_eq!(saved_document(&store), Document::default());
        assert_eq!(store.active_character().await.id, "default");
    }

    #[tokio::test]
    async fn open_migrates_legacy_list_and_saves_current_shape() {
        let raw = json!([{"id": "t1", "title": "世界観・コンセプト設定"}]).to_string();
        let store = Store::open(MemoryStorage::with_entry(DOCUMENT_KEY, &raw)).await;
        let tasks = store.tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskType::Concept);
        assert_eq!(saved_document(&store), *store.snapshot().await);
    }

    #[tokio::test]
    async fn open_backs_up_foreign_documents() {
        let raw = json!({"schema": "v9"}).to_string();
        let store = Store::open(MemoryStorage::with_entry(DOCUMENT_KEY, &raw)).await;
        assert_eq!(store.storage().get(UNRECOGNIZED_KEY), Some(raw));
        assert_eq!(*store.snapshot().await, Document::default());
    }

    #[tokio::test]
    async fn open_does_not_overwrite_a_document_it_could_not_read() {
        let raw = json!([{"id": "t1", "title": "keep me"}]).to_string();
        let storage = MemoryStorage::with_entry(DOCUMENT_KEY, &raw);
        storage.fail_reads(true);
        let store = Store::open(storage).await;
        assert_eq!(*store.snapshot().await, Document::default());
        assert_eq!(store.storage().writes(), 0);
        assert_eq!(store.storage().get(DOCUMENT_KEY), Some(raw));
    }

    #[tokio::test]
    async fn open_keeps_unrecognized_document_when_backup_fails() {
        let raw = json!({"schema": "v9"}).to_string();
        let storage = MemoryStorage::with_entry(DOCUMENT_KEY, &raw);
        storage.fail_writes_to(UNRECOGNIZED_KEY);
        let store = Store::open(storage).await;
        assert_eq!(*store.snapshot().await, Document::default());
        assert_eq!(store.storage().get(UNRECOGNIZED_KEY), None);
        assert_eq!(store.storage().get(DOCUMENT_KEY), Some(raw));
    }

    #[tokio::test]
    async fn open_of_current_document_does_not_rewrite() {
        let raw = serde_json::to_string(&Document::default()).expect("encode");
        let store = Store::open(MemoryStorage::with_entry(DOCUMENT_KEY, &raw)).await;
        assert_eq!(store.storage().writes(), 0);
    }

    #[tokio::test]
    async fn open_restores_active_selection() {
        let first = empty_store().await;
        let second = first.add_character("Rin".to_string(), "#b3d4ff".to_string()).await;
        let raw = first.storage().get(DOCUMENT_KEY).expect("document");
        let storage = MemoryStorage::with_entry(DOCUMENT_KEY, &raw);
        storage.save(ACTIVE_KEY, &second.id).await.expect("save active");
        let reopened = Store::open(storage).await;
        assert_eq!(reopened.active_character().await.id, second.id);
    }

    #[tokio::test]
    async fn deleting_only_character_is_refused() {
        let store = empty_store().await;
        assert!(!store.delete_character("default").await);
        assert_eq!(store.snapshot().await.characters.len(), 1);
    }

    #[tokio::test]
    async fn deleting_active_character_moves_selection_to_first() {
        let store = empty_store().await;
        let rin = store
            .add_character("Rin".to_string(), "#b3d4ff".to_string())
            .await;
        store.add_task("Rin task", Stage::Live2D).await.expect("add");
        assert_eq!(store.active_character().await.id, rin.id);

        assert!(store.delete_character(&rin.id).await);
        let doc = store.snapshot().await;
        assert_eq!(doc.characters.len(), 1);
        assert!(!doc.tasks_by_character.contains_key(&rin.id));
        assert_eq!(store.active_character().await.id, "default");
        assert_eq!(store.storage().get(ACTIVE_KEY).as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn update_character_merges_and_ignores_unknown_ids() {
        let store = empty_store().await;
        let updated = store
            .update_character(
                "default",
                CharacterChanges {
                    name: Some("Mio".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("character");
        assert_eq!(updated.name, "Mio");
        assert_eq!(updated.color, "#ff9ec7");
        assert!(store
            .update_character("ghost", CharacterChanges::default())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn blank_title_leaves_tasks_unchanged() {
        let store = store_with(&["A"]).await;
        let writes = store.storage().writes();
        assert!(store.add_task("   ", Stage::Live2D).await.is_none());
        assert_eq!(titles(&store).await, vec!["A"]);
        assert_eq!(store.storage().writes(), writes);
    }

    #[tokio::test]
    async fn snapshots_are_not_mutated_by_later_changes() {
        let store = store_with(&["A"]).await;
        let before = store.snapshot().await;
        store.add_task("B", Stage::CharaDesign).await.expect("add");
        assert_eq!(before.tasks("default").len(), 1);
        assert_eq!(store.snapshot().await.tasks("default").len(), 2);
    }

    #[tokio::test]
    async fn reorder_moves_first_to_third() {
        let store = store_with(&["A", "B", "C", "D"]).await;
        assert!(store.reorder_task(0, 2).await);
        assert_eq!(titles(&store).await, vec!["B", "C", "A", "D"]);
        assert_eq!(saved_document(&store), *store.snapshot().await);
    }

    #[tokio::test]
    async fn clear_completed_keeps_incomplete_tasks() {
        let store = store_with(&["done", "open"]).await;
        let done_id = store.tasks().await[0].id.clone();
        store.toggle_task(&done_id).await.expect("toggle");
        assert_eq!(store.clear_completed().await, 1);
        assert_eq!(titles(&store).await, vec!["open"]);
        assert_eq!(store.clear_completed().await, 0);
    }

    #[tokio::test]
    async fn template_reports_all_present_after_full_insert() {
        let store = store_with(&["線画作成"]).await;
        assert_eq!(
            store.add_template_tasks().await,
            TemplateOutcome::Added {
                added: TEMPLATE.len() - 1,
                partial: true
            }
        );
        let tasks = store.tasks().await;
        assert_eq!(tasks.len(), TEMPLATE.len());
        assert_eq!(tasks[0].title, TEMPLATE[0].title);
        assert_eq!(tasks.last().map(|task| task.title.as_str()), Some("線画作成"));
        assert_eq!(store.add_template_tasks().await, TemplateOutcome::AllPresent);
    }

    #[tokio::test]
    async fn edit_payload_applies_to_active_task() {
        let store = empty_store().await;
        store.add_template_tasks().await;
        let physics = store
            .tasks()
            .await
            .into_iter()
            .find(|task| task.kind == TaskType::Physics)
            .expect("physics task");
        let updated = store
            .edit_payload(&physics.id, |data| data.set_param(0, 180))
            .await
            .expect("edited");
        let Payload::Physics(data) = updated.data else {
            panic!("expected physics payload");
        };
        assert_eq!(data.params[0].value, 100);
        assert!(store
            .edit_payload(&physics.id, |data| data.toggle_item(0))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn filtered_tasks_do_not_change_stored_order() {
        let store = store_with(&["A", "B", "C"]).await;
        let b = store.tasks().await[1].id.clone();
        store.toggle_task(&b).await.expect("toggle");
        let done = store
            .filtered_tasks(TaskFilter {
                status: StatusFilter::Done,
                stage: StageFilter::Only(Stage::CharaDesign),
            })
            .await;
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, 2);
        assert_eq!(titles(&store).await, vec!["A", "B", "C"]);
        assert_eq!(store.stats().await.all.done, 1);
    }

    #[tokio::test]
    async fn storage_failures_are_swallowed() {
        let store = store_with(&["A"]).await;
        store.storage().fail_writes(true);
        store.add_task("B", Stage::Illustration).await.expect("add");
        assert_eq!(titles(&store).await, vec!["B", "A"]);
        let persisted = saved_document(&store);
        assert_eq!(persisted.tasks("default").len(), 1);
    }

    #[tokio::test]
    async fn tasks_are_scoped_to_the_active_character() {
        let store = store_with(&["default task"]).await;
        let rin = store
            .add_character("Rin".to_string(), "#b3d4ff".to_string())
            .await;
        assert!(store.tasks().await.is_empty());
        let default_task = store.snapshot().await.tasks("default")[0].id.clone();
        assert!(!store.delete_task(&default_task).await);
        assert!(store.select_character("default").await);
        assert!(store.delete_task(&default_task).await);
        assert!(!store.select_character("ghost").await);
        assert!(store.focus(&rin.id).await);
        assert_eq!(store.storage().get(ACTIVE_KEY).as_deref(), Some("default"));
    }
}
