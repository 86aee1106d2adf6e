//! Structured run events.
//!
//! Every component reports through [`BatchObserver`] instead of printing, so the
//! console front-end, tests and quiet runs all see the same event stream.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, info, warn};

use crate::batch::{BatchSummary, TaskOutcome};
use crate::classify::{ClassifyError, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// A scanned file was excluded from grouping.
    Rejected {
        base_name: String,
        reason: ClassifyError,
    },
    /// More than one token carried a marker; the first was kept.
    AmbiguousToken {
        base_name: String,
        kind: TokenKind,
        chosen: String,
        matches: usize,
    },
    /// Cage-aware grouping is on but the name has no cage token.
    MissingCageToken { base_name: String },
    /// One line of the operator-facing grouping summary.
    GroupSummary {
        subject: String,
        group_key: String,
        members: Vec<String>,
    },
    BatchStarted { tasks: usize },
    TaskFinished {
        subject: String,
        group_key: String,
        outcome: TaskOutcome,
    },
    BatchFinished { summary: BatchSummary },
}

pub trait BatchObserver: Send + Sync {
    fn notify(&self, event: BatchEvent);
}

/// Discards everything.
pub struct NullObserver;

impl BatchObserver for NullObserver {
    fn notify(&self, _event: BatchEvent) {}
}

/// Keeps every event in arrival order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<BatchEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BatchEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn outcomes(&self) -> Vec<(String, String, TaskOutcome)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BatchEvent::TaskFinished {
                    subject,
                    group_key,
                    outcome,
                } => Some((subject, group_key, outcome)),
                _ => None,
            })
            .collect()
    }
}

impl BatchObserver for RecordingObserver {
    fn notify(&self, event: BatchEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Terminal front-end: summary on stdout, diagnostics through `tracing`,
/// and a progress bar on stderr while the batch runs.
pub struct ConsoleObserver {
    progress: ProgressBar,
    last_subject: Mutex<Option<String>>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self {
            progress: ProgressBar::hidden(),
            last_subject: Mutex::new(None),
        }
    }

    fn log(&self, emit: impl FnOnce()) {
        if self.progress.is_hidden() {
            emit();
        } else {
            self.progress.suspend(emit);
        }
    }

    fn print_group(&self, subject: &str, group_key: &str, members: &[String]) {
        let mut last = match self.last_subject.lock() {
            Ok(last) => last,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_deref() != Some(subject) {
            println!("Subject {subject}:");
            *last = Some(subject.to_owned());
        }
        println!("    {group_key}");
        println!("        [{}]", members.join(", "));
    }
}

impl BatchObserver for ConsoleObserver {
    fn notify(&self, event: BatchEvent) {
        match event {
            BatchEvent::Rejected { base_name, reason } => {
                self.log(|| warn!("Skipping {base_name}: {reason}."));
            }
            BatchEvent::AmbiguousToken {
                base_name,
                kind,
                chosen,
                matches,
            } => {
                self.log(|| {
                    warn!("{base_name}: {matches} {kind} tokens found, using '{chosen}'")
                });
            }
            BatchEvent::MissingCageToken { base_name } => {
                self.log(|| warn!("{base_name}: no cage token found, grouping without cage"));
            }
            BatchEvent::GroupSummary {
                subject,
                group_key,
                members,
            } => self.print_group(&subject, &group_key, &members),
            BatchEvent::BatchStarted { tasks } => {
                info!("Merging videos ({tasks} groups)...");
                self.progress.set_length(tasks as u64);
                self.progress.set_style(progress_style());
                self.progress.set_draw_target(ProgressDrawTarget::stderr());
            }
            BatchEvent::TaskFinished {
                subject,
                group_key,
                outcome,
            } => {
                self.log(|| match &outcome {
                    TaskOutcome::Merged { output } => {
                        debug!("Merged {subject} {group_key} into {}", output.display())
                    }
                    TaskOutcome::AlreadyExists { output } => info!(
                        "Skipping {subject} {group_key}: {} already exists.",
                        output.display()
                    ),
                    TaskOutcome::Unresolved { reason } => {
                        warn!("Skipping {subject} {group_key}: {reason}")
                    }
                    TaskOutcome::Failed { message } => {
                        warn!("Failed {subject} {group_key}: {message}")
                    }
                });
                self.progress.inc(1);
            }
            BatchEvent::BatchFinished { summary } => {
                self.progress.finish_and_clear();
                info!(
                    merged = summary.merged,
                    already_existed = summary.already_existed,
                    unresolved = summary.unresolved,
                    failed = summary.failed,
                    "batch finished"
                );
            }
        }
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}<{eta_precise}]")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}
