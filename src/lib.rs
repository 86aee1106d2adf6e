//! Batch stacking of paired-view trial recordings.
//!
//! Files are scanned, classified by subject/trial/side from their names,
//! grouped, and every group holding exactly one top and one bottom view is
//! composited into a single stacked, slowed-down video.

pub mod batch;
pub mod classify;
pub mod compositor;
pub mod config;
pub mod confirm;
pub mod grouping;
pub mod observer;
pub mod pairing;
pub mod probe;
pub mod scan;

use anyhow::Result;

use crate::classify::classify_all;
use crate::config::MergeConfig;
use crate::grouping::Grouping;
use crate::observer::BatchObserver;
use crate::scan::scan_videos;

/// Validates the configuration, then scans, classifies and groups.
///
/// Nothing touches the filesystem if validation fails.
pub fn collect_groups(config: &MergeConfig, observer: &dyn BatchObserver) -> Result<Grouping> {
    config.validate()?;
    let files = scan_videos(&config.input_dir, &config.input_extension)?;
    tracing::info!("Found {} videos.", files.len());
    let classified = classify_all(&files, config, observer);
    Ok(Grouping::build(&classified, config, observer))
}
