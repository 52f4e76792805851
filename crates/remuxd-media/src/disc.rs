//! BDMV source validation and title candidate discovery.
//!
//! A disc source is a directory holding a `BDMV` tree: playlists
//! (`PLAYLIST/*.mpls`) reference stream segments (`STREAM/*.m2ts`). Each
//! playlist is a title candidate; its duration comes straight out of the
//! playlist binary (PlayItem IN/OUT timestamps at 45 kHz), its weight from
//! the sizes of the stream segments it references.
//!
//! Everything here is a pure filesystem read; validation has no side
//! effects and is safe to re-run on every scan.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Playlist timestamps are expressed in 45 kHz ticks.
const TICKS_PER_SECOND: u64 = 45_000;

/// One playlist inside a source, a candidate for the primary title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleCandidate {
    /// Playlist file stem, e.g. `00001`
    pub playlist_id: String,
    /// Full path of the playlist file
    pub playlist_path: PathBuf,
    /// Declared playback duration in seconds
    pub duration_seconds: u64,
    /// Total size of the referenced stream segments in bytes
    pub stream_size_bytes: u64,
    /// Number of stream segments the playlist stitches together
    pub segment_count: usize,
}

impl TitleCandidate {
    /// Numeric playlist id for FFmpeg's `-playlist` option.
    pub fn playlist_number(&self) -> u32 {
        self.playlist_id.parse().unwrap_or(0)
    }
}

/// Validated view of a disc source directory.
#[derive(Debug, Clone)]
pub struct DiscLayout {
    /// The source directory (the one containing `BDMV`)
    pub root: PathBuf,
    /// Title candidates, longest first
    pub candidates: Vec<TitleCandidate>,
    /// Size of every stream segment in the source, in bytes
    pub total_stream_bytes: u64,
}

/// Inspect a candidate source directory.
///
/// A source is valid iff it carries the `BDMV/PLAYLIST` and `BDMV/STREAM`
/// structure, at least one playlist parses, and at least one playlist has a
/// non-zero declared duration.
pub fn inspect_source(dir: &Path) -> MediaResult<DiscLayout> {
    let bdmv = dir.join("BDMV");
    if !bdmv.is_dir() {
        return Err(MediaError::invalid_source(format!(
            "missing BDMV directory under {}",
            dir.display()
        )));
    }

    let playlist_dir = bdmv.join("PLAYLIST");
    let stream_dir = bdmv.join("STREAM");
    for (name, path) in [("PLAYLIST", &playlist_dir), ("STREAM", &stream_dir)] {
        if !path.is_dir() {
            return Err(MediaError::invalid_source(format!(
                "missing BDMV/{name} directory"
            )));
        }
    }

    let playlist_files = files_with_extension(&playlist_dir, "mpls")?;
    if playlist_files.is_empty() {
        return Err(MediaError::invalid_source("no playlist files (.mpls) found"));
    }

    let stream_sizes = stream_segment_sizes(&stream_dir)?;
    if stream_sizes.is_empty() {
        return Err(MediaError::invalid_source("no stream files (.m2ts) found"));
    }
    let total_stream_bytes = stream_sizes.iter().map(|(_, size)| size).sum();

    let mut candidates = Vec::new();
    for playlist_path in playlist_files {
        let summary = match fs::read(&playlist_path)
            .map_err(MediaError::from)
            .and_then(|bytes| parse_playlist(&playlist_path, &bytes))
        {
            Ok(summary) => summary,
            Err(e) => {
                // one broken playlist does not invalidate the disc
                warn!(playlist = %playlist_path.display(), "Skipping playlist: {e}");
                continue;
            }
        };

        if summary.duration_seconds == 0 {
            debug!(playlist = %playlist_path.display(), "Zero-duration playlist skipped");
            continue;
        }

        let stream_size_bytes = summary
            .clip_ids
            .iter()
            .map(|clip| {
                stream_sizes
                    .iter()
                    .find(|(name, _)| name == clip)
                    .map(|(_, size)| *size)
                    .unwrap_or(0)
            })
            .sum();

        let playlist_id = playlist_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        candidates.push(TitleCandidate {
            playlist_id,
            playlist_path,
            duration_seconds: summary.duration_seconds,
            stream_size_bytes,
            segment_count: summary.clip_ids.len(),
        });
    }

    if candidates.is_empty() {
        return Err(MediaError::invalid_source(
            "no playlist with a non-zero declared duration",
        ));
    }

    candidates.sort_by(|a, b| {
        b.duration_seconds
            .cmp(&a.duration_seconds)
            .then(b.stream_size_bytes.cmp(&a.stream_size_bytes))
    });

    debug!(
        source = %dir.display(),
        candidates = candidates.len(),
        "Valid disc source"
    );

    Ok(DiscLayout {
        root: dir.to_path_buf(),
        candidates,
        total_stream_bytes,
    })
}

/// Cheap validity check for the scanner.
pub fn is_valid_source(dir: &Path) -> bool {
    inspect_source(dir).is_ok()
}

fn files_with_extension(dir: &Path, extension: &str) -> MediaResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn stream_segment_sizes(stream_dir: &Path) -> MediaResult<Vec<(String, u64)>> {
    let mut sizes = Vec::new();
    for path in files_with_extension(stream_dir, "m2ts")? {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let size = fs::metadata(&path)?.len();
        sizes.push((stem, size));
    }
    Ok(sizes)
}

#[derive(Debug)]
struct PlaylistSummary {
    duration_seconds: u64,
    clip_ids: Vec<String>,
}

/// Parse the parts of an MPLS playlist this system needs: the PlayItem list
/// with its IN/OUT timestamps and referenced clip names.
///
/// Layout: `MPLS` magic and version, a 32-bit offset to the playlist section
/// at byte 8; the section holds a PlayItem count at +6 and PlayItems at +10,
/// each a 16-bit length followed by clip name (5 bytes), codec id (4 bytes),
/// flags (2), STC id (1) and the 45 kHz IN/OUT timestamps.
fn parse_playlist(path: &Path, bytes: &[u8]) -> MediaResult<PlaylistSummary> {
    let parse_err = |message: &str| MediaError::PlaylistParse {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    if bytes.len() < 12 || &bytes[0..4] != b"MPLS" {
        return Err(parse_err("missing MPLS magic"));
    }

    let playlist_start = read_u32(bytes, 8).ok_or_else(|| parse_err("truncated header"))? as usize;
    let item_count =
        read_u16(bytes, playlist_start + 6).ok_or_else(|| parse_err("truncated playlist section"))?;

    let mut offset = playlist_start + 10;
    let mut duration_ticks = 0u64;
    let mut clip_ids = Vec::with_capacity(item_count as usize);

    for _ in 0..item_count {
        let item_len =
            read_u16(bytes, offset).ok_or_else(|| parse_err("truncated PlayItem length"))? as usize;
        let body = offset + 2;
        if body + item_len > bytes.len() || item_len < 20 {
            return Err(parse_err("PlayItem overruns file"));
        }

        let clip = std::str::from_utf8(&bytes[body..body + 5])
            .map_err(|_| parse_err("non-ASCII clip name"))?
            .to_string();

        let in_time = read_u32(bytes, body + 12).ok_or_else(|| parse_err("missing IN time"))?;
        let out_time = read_u32(bytes, body + 16).ok_or_else(|| parse_err("missing OUT time"))?;
        if out_time > in_time {
            duration_ticks += (out_time - in_time) as u64;
        }

        clip_ids.push(clip);
        offset = body + item_len;
    }

    Ok(PlaylistSummary {
        duration_seconds: duration_ticks / TICKS_PER_SECOND,
        clip_ids,
    })
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let slice = bytes.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
