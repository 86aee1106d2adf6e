use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::classify::ClassifiedFile;
use crate::config::MergeConfig;
use crate::observer::{BatchEvent, BatchObserver};

/// subject id -> group key -> member paths (scan order).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    subjects: BTreeMap<String, BTreeMap<String, Vec<PathBuf>>>,
}

impl Grouping {
    /// Folds classified files into groups keyed by subject and side-aware trial.
    pub fn build(
        files: &[ClassifiedFile],
        config: &MergeConfig,
        observer: &dyn BatchObserver,
    ) -> Self {
        let mut grouping = Self::default();
        for file in files {
            let key = group_key(file, config, observer);
            grouping.insert(&file.subject_id, key, file.path.clone());
        }
        grouping
    }

    fn insert(&mut self, subject: &str, group_key: String, path: PathBuf) {
        self.subjects
            .entry(subject.to_owned())
            .or_default()
            .entry(group_key)
            .or_default()
            .push(path);
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn group_count(&self) -> usize {
        self.subjects.values().map(BTreeMap::len).sum()
    }

    pub fn members(&self, subject: &str, group_key: &str) -> Option<&[PathBuf]> {
        self.subjects
            .get(subject)
            .and_then(|groups| groups.get(group_key))
            .map(Vec::as_slice)
    }

    /// Every (subject, group key, members) triple, subjects then keys in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[PathBuf])> {
        self.subjects.iter().flat_map(|(subject, groups)| {
            groups
                .iter()
                .map(move |(key, paths)| (subject.as_str(), key.as_str(), paths.as_slice()))
        })
    }

    /// Emits one summary event per group for the operator to check.
    pub fn report_summary(&self, observer: &dyn BatchObserver) {
        for (subject, group_key, paths) in self.iter() {
            observer.notify(BatchEvent::GroupSummary {
                subject: subject.to_owned(),
                group_key: group_key.to_owned(),
                members: paths.iter().map(|path| base_name(path)).collect(),
            });
        }
    }
}

/// Trial id, plus side suffix (and cage suffix when cage-aware) for sided files.
pub fn group_key(
    file: &ClassifiedFile,
    config: &MergeConfig,
    observer: &dyn BatchObserver,
) -> String {
    let Some(side_suffix) = file.side.suffix() else {
        return file.trial_id.clone();
    };

    let mut key = format!("{}{side_suffix}", file.trial_id);
    if config.cage_marker.is_some() {
        match &file.cage_id {
            Some(cage) => {
                key.push('_');
                key.push_str(cage);
            }
            None => observer.notify(BatchEvent::MissingCageToken {
                base_name: file.base_name.clone(),
            }),
        }
    }
    key
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
