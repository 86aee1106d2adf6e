use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{count} {noun} found - top: {top_view}, bottom: {bottom_view}",
    noun = video_noun(.count),
    top_view = describe(.top),
    bottom_view = describe(.bottom)
)]
pub struct PairError {
    pub count: usize,
    pub top: Option<PathBuf>,
    pub bottom: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPair {
    pub top: PathBuf,
    pub bottom: PathBuf,
}

/// Picks the top and bottom view out of a group.
///
/// A path is matched against each marker as a plain substring, and a later
/// match overwrites an earlier one. An empty marker means "whichever member
/// the other marker did not pick". Only groups of exactly two distinct,
/// fully assigned members resolve.
pub fn resolve_pair(
    paths: &[PathBuf],
    top_marker: &str,
    bottom_marker: &str,
) -> Result<ResolvedPair, PairError> {
    let mut top = last_match(paths, top_marker);
    let mut bottom = last_match(paths, bottom_marker);

    if top_marker.is_empty() {
        top = other_member(paths, bottom.as_deref());
    }
    if bottom_marker.is_empty() {
        bottom = other_member(paths, top.as_deref());
    }

    match (top, bottom) {
        (Some(top), Some(bottom)) if paths.len() == 2 && top != bottom => {
            Ok(ResolvedPair { top, bottom })
        }
        (top, bottom) => Err(PairError {
            count: paths.len(),
            top,
            bottom,
        }),
    }
}

fn last_match(paths: &[PathBuf], marker: &str) -> Option<PathBuf> {
    if marker.is_empty() {
        return None;
    }
    paths
        .iter()
        .rev()
        .find(|path| path.to_string_lossy().contains(marker))
        .cloned()
}

fn other_member(paths: &[PathBuf], taken: Option<&Path>) -> Option<PathBuf> {
    let taken = taken?;
    paths.iter().find(|path| path.as_path() != taken).cloned()
}

fn video_noun(count: &usize) -> &'static str {
    if *count == 1 {
        "video"
    } else {
        "videos"
    }
}

fn describe(path: &Option<PathBuf>) -> String {
    path.as_deref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "none".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP: &str = "SIDEVIEW";
    const BOTTOM: &str = "VENTRALVIEW";

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn resolves_regardless_of_order() {
        let a = "Mouse1_Run1_SIDEVIEW.avi";
        let b = "Mouse1_Run1_VENTRALVIEW.avi";
        let expected = ResolvedPair {
            top: PathBuf::from(a),
            bottom: PathBuf::from(b),
        };

        assert_eq!(resolve_pair(&paths(&[a, b]), TOP, BOTTOM), Ok(expected.clone()));
        assert_eq!(resolve_pair(&paths(&[b, a]), TOP, BOTTOM), Ok(expected));
    }

    #[test]
    fn wrong_member_count_is_unresolved() {
        let single = paths(&["Mouse2_Run1_SIDEVIEW.avi"]);
        let error = resolve_pair(&single, TOP, BOTTOM).expect_err("one file cannot pair");
        assert_eq!(error.count, 1);
        assert!(error.to_string().starts_with("1 video found"), "{error}");

        let triple = paths(&[
            "Mouse1_Run1_SIDEVIEW.avi",
            "Mouse1_Run1_VENTRALVIEW.avi",
            "Mouse1_Run1_SIDEVIEW_copy.avi",
        ]);
        let error = resolve_pair(&triple, TOP, BOTTOM).expect_err("three files cannot pair");
        assert!(error.to_string().starts_with("3 videos found"), "{error}");

        let error = resolve_pair(&[], TOP, BOTTOM).expect_err("empty group cannot pair");
        assert_eq!(error.to_string(), "0 videos found - top: none, bottom: none");
    }

    #[test]
    fn one_missing_marker_is_unresolved() {
        let group = paths(&["Mouse1_Run1_SIDEVIEW.avi", "Mouse1_Run1_other.avi"]);
        let error = resolve_pair(&group, TOP, BOTTOM).expect_err("bottom is missing");
        assert_eq!(error.top, Some(PathBuf::from("Mouse1_Run1_SIDEVIEW.avi")));
        assert_eq!(error.bottom, None);
        assert_eq!(
            error.to_string(),
            "2 videos found - top: Mouse1_Run1_SIDEVIEW.avi, bottom: none"
        );
    }

    #[test]
    fn later_match_overwrites_earlier_one() {
        let group = paths(&["a_SIDEVIEW.avi", "b_SIDEVIEW.avi"]);
        let error = resolve_pair(&group, TOP, BOTTOM).expect_err("no bottom view");
        assert_eq!(error.top, Some(PathBuf::from("b_SIDEVIEW.avi")));
    }

    #[test]
    fn same_file_matching_both_markers_is_unresolved() {
        let group = paths(&["x_SIDEVIEW_VENTRALVIEW.avi", "y_other.avi"]);
        assert!(resolve_pair(&group, TOP, BOTTOM).is_err());
    }

    #[test]
    fn empty_marker_takes_the_other_member() {
        let a = "Mouse1_Run1_SIDEVIEW.avi";
        let b = "Mouse1_Run1_cam2.avi";

        let pair = resolve_pair(&paths(&[b, a]), TOP, "").expect("bottom falls back");
        assert_eq!(pair.top, PathBuf::from(a));
        assert_eq!(pair.bottom, PathBuf::from(b));

        let pair = resolve_pair(&paths(&[a, b]), "", "cam2").expect("top falls back");
        assert_eq!(pair.top, PathBuf::from(a));
        assert_eq!(pair.bottom, PathBuf::from(b));
    }

    #[test]
    fn matches_against_the_full_path() {
        let group = vec![
            PathBuf::from("/data/SIDEVIEW/Mouse1_Run1_a.avi"),
            PathBuf::from("/data/VENTRALVIEW/Mouse1_Run1_b.avi"),
        ];
        let pair = resolve_pair(&group, TOP, BOTTOM).expect("directory names count");
        assert_eq!(pair.top, group[0]);
    }
}
