//! Output promotion across filesystems.
//!
//! The staging directory and the final library folder may live on different
//! volumes; promotion tries a fast rename first and falls back to
//! copy-verify-delete when the rename fails with EXDEV.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Promote a finished output from staging to its final destination.
///
/// If the destination already exists the file gets a timestamp suffix
/// instead of overwriting. Returns the path the file actually landed at.
/// The source is only removed once the destination verifiably holds the
/// full content, so a failed promotion never loses the output.
pub async fn promote_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !fs::try_exists(src).await? {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }

    let dst = unique_destination(dst).await?;

    if let Some(parent) = dst.parent() {
        if !fs::try_exists(parent).await? {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, &dst).await {
        Ok(()) => Ok(dst),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                "Cross-device promotion, falling back to copy+verify: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_verify_delete(src, &dst).await?;
            Ok(dst)
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Pick a non-clobbering destination path.
async fn unique_destination(dst: &Path) -> MediaResult<PathBuf> {
    if !fs::try_exists(dst).await? {
        return Ok(dst.to_path_buf());
    }

    let stem = dst
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let extension = dst
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let suffix = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let renamed = dst.with_file_name(format!("{stem}_{suffix}{extension}"));

    warn!("Destination exists, promoting as {}", renamed.display());
    Ok(renamed)
}

/// Check if an IO error is EXDEV (cross-device link).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

/// Copy to a temp file beside the destination, verify the byte count,
/// promote with an atomic rename, then delete the source.
async fn copy_verify_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let expected = fs::metadata(src).await?.len();
    let tmp_dst = dst.with_extension("partial");

    let copied = match fs::copy(src, &tmp_dst).await {
        Ok(copied) => copied,
        Err(e) => {
            let _ = fs::remove_file(&tmp_dst).await;
            return Err(MediaError::from(e));
        }
    };

    if copied != expected {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(MediaError::CopyVerification {
            expected,
            found: copied,
        });
    }

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(MediaError::from(e));
    }

    // destination is safe; source removal failure is only worth a warning
    if let Err(e) = fs::remove_file(src).await {
        warn!(
            "Failed to remove staged file after promotion: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_promote_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("Movie.mkv");
        let dst = dir.path().join("processed/Movie.mkv");

        fs::write(&src, b"remuxed content").await.unwrap();

        let landed = promote_file(&src, &dst).await.unwrap();
        assert_eq!(landed, dst);
        assert!(!src.exists(), "staged file should be gone");
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "remuxed content");
    }

    #[tokio::test]
    async fn test_promote_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("Movie.mkv");
        let dst = dir.path().join("Movie_out.mkv");

        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();

        let landed = promote_file(&src, &dst).await.unwrap();
        assert_ne!(landed, dst);
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "old");
        assert_eq!(fs::read_to_string(&landed).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_promote_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = promote_file(dir.path().join("absent.mkv"), dir.path().join("x.mkv"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_copy_verify_delete_path() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.mkv");
        let dst = dir.path().join("b.mkv");
        fs::write(&src, b"payload").await.unwrap();

        copy_verify_delete(&src, &dst).await.unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "payload");
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
