use crate::model::{Stage, Task};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Done,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StageFilter {
    #[default]
    All,
    Only(Stage),
}

/// Read-only display filter; both predicates must hold.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskFilter {
    pub status: StatusFilter,
    pub stage: StageFilter,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Done => task.completed,
        };
        let stage_ok = match self.stage {
            StageFilter::All => true,
            StageFilter::Only(stage) => task.stage == stage,
        };
        status_ok && stage_ok
    }

    /// Matching tasks with their 1-based position in the stored order.
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<(usize, &'a Task)> {
        tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| self.matches(task))
            .map(|(idx, task)| (idx + 1, task))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Stats {
    pub all: Progress,
    pub by_stage: Vec<(Stage, Progress)>,
}

impl Stats {
    pub fn of(tasks: &[Task]) -> Self {
        let progress = |predicate: &dyn Fn(&Task) -> bool| {
            let matching = tasks.iter().filter(|task| predicate(task));
            let (done, total) = matching.fold((0, 0), |(done, total), task| {
                (done + usize::from(task.completed), total + 1)
            });
            Progress { done, total }
        };
        Self {
            all: progress(&|_: &Task| true),
            by_stage: Stage::ALL
                .into_iter()
                .map(|stage| (stage, progress(&|task: &Task| task.stage == stage)))
                .collect(),
        }
    }

    pub fn stage(&self, stage: Stage) -> Progress {
        self.by_stage
            .iter()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, progress)| *progress)
            .unwrap_or_default()
    }
}
