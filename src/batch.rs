use std::fs;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::compositor::{ComposeJob, Compositor};
use crate::config::MergeConfig;
use crate::grouping::Grouping;
use crate::observer::{BatchEvent, BatchObserver};
use crate::pairing::resolve_pair;

/// One group handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTask {
    pub subject: String,
    pub group_key: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Merged { output: PathBuf },
    AlreadyExists { output: PathBuf },
    Unresolved { reason: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub merged: usize,
    pub already_existed: usize,
    pub unresolved: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Merged { .. } => self.merged += 1,
            TaskOutcome::AlreadyExists { .. } => self.already_existed += 1,
            TaskOutcome::Unresolved { .. } => self.unresolved += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.merged + self.already_existed + self.unresolved + self.failed
    }
}

/// Flattens the grouping into tasks, dropping empty groups.
pub fn plan_tasks(grouping: &Grouping) -> Vec<MergeTask> {
    grouping
        .iter()
        .filter(|(_, _, paths)| !paths.is_empty())
        .map(|(subject, group_key, paths)| MergeTask {
            subject: subject.to_owned(),
            group_key: group_key.to_owned(),
            paths: paths.to_vec(),
        })
        .collect()
}

pub fn worker_count() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Merges every group on a pool scoped to this call.
///
/// Tasks finish in any order; a failed or panicking task is reported and
/// counted but never stops its siblings.
pub fn run_batch(
    grouping: &Grouping,
    config: &MergeConfig,
    compositor: &dyn Compositor,
    observer: &dyn BatchObserver,
) -> Result<BatchSummary> {
    let tasks = plan_tasks(grouping);
    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output folder {}",
            config.output_dir.display()
        )
    })?;

    let workers = worker_count();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("vstack-merge-{index}"))
        .build()
        .context("failed to build merge worker pool")?;
    debug!(workers, tasks = tasks.len(), "dispatching merge tasks");

    observer.notify(BatchEvent::BatchStarted { tasks: tasks.len() });

    let outcomes = pool.install(|| {
        tasks
            .par_iter()
            .map(|task| {
                let outcome = run_isolated(task, config, compositor);
                observer.notify(BatchEvent::TaskFinished {
                    subject: task.subject.clone(),
                    group_key: task.group_key.clone(),
                    outcome: outcome.clone(),
                });
                outcome
            })
            .collect::<Vec<_>>()
    });

    let mut summary = BatchSummary::default();
    for outcome in &outcomes {
        summary.record(outcome);
    }
    observer.notify(BatchEvent::BatchFinished { summary });
    Ok(summary)
}

fn run_isolated(task: &MergeTask, config: &MergeConfig, compositor: &dyn Compositor) -> TaskOutcome {
    panic::catch_unwind(AssertUnwindSafe(|| run_task(task, config, compositor))).unwrap_or_else(
        |payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|message| (*message).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            TaskOutcome::Failed {
                message: format!("worker panicked: {message}"),
            }
        },
    )
}

/// Resolves, checks for an existing output, then composes one group.
pub fn run_task(task: &MergeTask, config: &MergeConfig, compositor: &dyn Compositor) -> TaskOutcome {
    let pair = match resolve_pair(&task.paths, &config.top_marker, &config.bottom_marker) {
        Ok(pair) => pair,
        Err(error) => {
            return TaskOutcome::Unresolved {
                reason: error.to_string(),
            }
        }
    };

    let output = config.output_path(&task.subject, &task.group_key);
    if output.exists() {
        return TaskOutcome::AlreadyExists { output };
    }

    let job = ComposeJob {
        top: &pair.top,
        bottom: &pair.bottom,
        output: &output,
    };
    match compositor.compose(&job) {
        Ok(()) => TaskOutcome::Merged { output },
        Err(error) => {
            // Absent before compose, so anything here now is a partial write.
            if output.exists() {
                if let Err(remove_error) = fs::remove_file(&output) {
                    warn!(
                        output = %output.display(),
                        %remove_error,
                        "failed to remove partial output"
                    );
                }
            }
            TaskOutcome::Failed {
                message: format!("{error:#}"),
            }
        }
    }
}
