//! Primary title (main feature) selection.

use tracing::info;

use crate::disc::TitleCandidate;
use crate::error::{MediaError, MediaResult};

/// Default minimum duration for the main feature: one hour.
pub const DEFAULT_MIN_TITLE_SECS: u64 = 3600;

/// Candidates within this many seconds of the longest are considered a tie.
pub const TIE_DELTA_SECS: u64 = 10;

/// Deterministically pick the primary title from a candidate list.
///
/// The candidate with the maximum duration wins; candidates within
/// [`TIE_DELTA_SECS`] of it tie-break by larger aggregate stream size. If no
/// candidate reaches `min_duration_secs` the source has no main feature
/// (a menu loop or extras-only disc) and selection fails deterministically.
pub fn select_primary_title(
    candidates: &[TitleCandidate],
    min_duration_secs: u64,
) -> MediaResult<&TitleCandidate> {
    let eligible: Vec<&TitleCandidate> = candidates
        .iter()
        .filter(|c| c.duration_seconds >= min_duration_secs)
        .collect();

    let longest = eligible
        .iter()
        .map(|c| c.duration_seconds)
        .max()
        .ok_or(MediaError::NoMainTitle {
            minimum_minutes: min_duration_secs / 60,
        })?;

    let winner = eligible
        .into_iter()
        .filter(|c| longest - c.duration_seconds <= TIE_DELTA_SECS)
        .max_by_key(|c| c.stream_size_bytes)
        .ok_or(MediaError::NoMainTitle {
            minimum_minutes: min_duration_secs / 60,
        })?;

    info!(
        playlist = %winner.playlist_id,
        duration_seconds = winner.duration_seconds,
        "Selected primary title"
    );
    Ok(winner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn candidate(id: &str, duration_seconds: u64, stream_size_bytes: u64) -> TitleCandidate {
        TitleCandidate {
            playlist_id: id.to_string(),
            playlist_path: PathBuf::from(format!("{id}.mpls")),
            duration_seconds,
            stream_size_bytes,
            segment_count: 1,
        }
    }

    #[test]
    fn test_longest_duration_wins() {
        let candidates = vec![
            candidate("00000", 5 * 60, 100),
            candidate("00001", 95 * 60, 100),
            candidate("00002", 12 * 60, 100),
        ];

        let winner = select_primary_title(&candidates, 60 * 60).unwrap();
        assert_eq!(winner.playlist_id, "00001");
        assert_eq!(winner.duration_seconds, 95 * 60);
    }

    #[test]
    fn test_near_tie_breaks_by_stream_size() {
        let candidates = vec![
            candidate("00001", 7200, 10_000),
            // 5 seconds shorter, but a much larger payload
            candidate("00002", 7195, 50_000),
        ];

        let winner = select_primary_title(&candidates, 3600).unwrap();
        assert_eq!(winner.playlist_id, "00002");
    }

    #[test]
    fn test_clear_gap_ignores_stream_size() {
        let candidates = vec![
            candidate("00001", 7200, 10),
            // bigger but well outside the tie window
            candidate("00002", 7100, 50_000),
        ];

        let winner = select_primary_title(&candidates, 3600).unwrap();
        assert_eq!(winner.playlist_id, "00001");
    }

    #[test]
    fn test_duration_floor_guards_menu_loops() {
        let candidates = vec![
            candidate("00000", 300, 100),
            candidate("00001", 1800, 100),
        ];

        let err = select_primary_title(&candidates, 3600).unwrap_err();
        match err {
            MediaError::NoMainTitle { minimum_minutes } => assert_eq!(minimum_minutes, 60),
            other => panic!("unexpected error: {other:?}"),
        }
        // selection failure is an analysis failure: never retried
        assert!(MediaError::NoMainTitle { minimum_minutes: 60 }.is_analysis_failure());
    }

    #[test]
    fn test_empty_candidate_list() {
        assert!(select_primary_title(&[], 3600).is_err());
    }
}
