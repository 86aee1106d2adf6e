use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::MergeConfig;
use crate::observer::{BatchEvent, BatchObserver};
use crate::scan::RawFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("no subject token found")]
    NoSubjectToken,
    #[error("no trial token found")]
    NoTrialToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Subject,
    Trial,
    Cage,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Subject => "subject",
            Self::Trial => "trial",
            Self::Cage => "cage",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    None,
    Left,
    Right,
}

impl Side {
    /// Appended to the trial id to keep left and right recordings apart.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Left => Some("_left"),
            Self::Right => Some("_right"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    pub path: PathBuf,
    pub base_name: String,
    pub subject_id: String,
    pub trial_id: String,
    pub side: Side,
    pub cage_id: Option<String>,
}

/// Extracts subject, trial, side and (when configured) cage from a file name.
///
/// Ambiguous names keep the first matching token and report the ambiguity;
/// names without a subject or trial token are rejected, never panicked on.
pub fn classify(
    file: &RawFile,
    config: &MergeConfig,
    observer: &dyn BatchObserver,
) -> Result<ClassifiedFile, ClassifyError> {
    let base_name = file.base_name.as_str();
    let tokens = base_name.split(config.split_char.as_str()).collect::<Vec<_>>();

    let subject_id = pick_token(
        base_name,
        &tokens,
        &config.subject_marker,
        None,
        TokenKind::Subject,
        observer,
    )
    .ok_or(ClassifyError::NoSubjectToken)?;

    let trial_id = pick_token(
        base_name,
        &tokens,
        &config.trial_marker,
        Some(&config.input_extension),
        TokenKind::Trial,
        observer,
    )
    .ok_or(ClassifyError::NoTrialToken)?;

    let cage_id = config.cage_marker.as_deref().and_then(|marker| {
        pick_token(
            base_name,
            &tokens,
            marker,
            Some(&config.input_extension),
            TokenKind::Cage,
            observer,
        )
    });

    Ok(ClassifiedFile {
        path: file.path.clone(),
        base_name: base_name.to_owned(),
        subject_id,
        trial_id,
        side: detect_side(base_name, &config.right_marker, &config.left_marker),
        cage_id,
    })
}

/// Classifies every file, reporting rejections and dropping them.
pub fn classify_all(
    files: &[RawFile],
    config: &MergeConfig,
    observer: &dyn BatchObserver,
) -> Vec<ClassifiedFile> {
    files
        .iter()
        .filter_map(|file| match classify(file, config, observer) {
            Ok(classified) => Some(classified),
            Err(reason) => {
                observer.notify(BatchEvent::Rejected {
                    base_name: file.base_name.clone(),
                    reason,
                });
                None
            }
        })
        .collect()
}

/// Right wins over left when a name carries both markers.
pub fn detect_side(base_name: &str, right_marker: &str, left_marker: &str) -> Side {
    if !right_marker.is_empty() && base_name.contains(right_marker) {
        Side::Right
    } else if !left_marker.is_empty() && base_name.contains(left_marker) {
        Side::Left
    } else {
        Side::None
    }
}

fn pick_token(
    base_name: &str,
    tokens: &[&str],
    marker: &str,
    strip: Option<&str>,
    kind: TokenKind,
    observer: &dyn BatchObserver,
) -> Option<String> {
    let matches = tokens
        .iter()
        .filter(|token| token.contains(marker))
        .map(|token| match strip {
            Some(extension) if !extension.is_empty() => token.replace(extension, ""),
            _ => (*token).to_owned(),
        })
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>();

    let chosen = matches.first()?.clone();
    if matches.len() > 1 {
        observer.notify(BatchEvent::AmbiguousToken {
            base_name: base_name.to_owned(),
            kind,
            chosen: chosen.clone(),
            matches: matches.len(),
        });
    }
    Some(chosen)
}
