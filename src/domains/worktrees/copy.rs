use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopySummary {
    pub copied: usize,
    pub skipped: usize,
}

/// Copies `files` (relative to `source`) into the same relative locations
/// under `destination`. Files that vanished since listing are skipped.
pub async fn copy_relative_files(
    source: &Path,
    destination: &Path,
    files: &[PathBuf],
) -> io::Result<CopySummary> {
    let mut summary = CopySummary::default();

    for relative in files {
        if !is_contained(relative) {
            log::warn!(
                "[WorktreeCopy] Refusing to copy path outside the checkout: {}",
                relative.display()
            );
            summary.skipped += 1;
            continue;
        }

        let from = source.join(relative);
        let to = destination.join(relative);
        let metadata = match tokio::fs::symlink_metadata(&from).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("[WorktreeCopy] {} disappeared before copy", from.display());
                summary.skipped += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        if metadata.is_dir() {
            summary.skipped += 1;
            continue;
        }

        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if metadata.file_type().is_symlink() {
            copy_symlink(&from, &to).await?;
        } else {
            tokio::fs::copy(&from, &to).await?;
        }
        summary.copied += 1;
    }

    log::debug!(
        "[WorktreeCopy] Copied {} files into {} ({} skipped)",
        summary.copied,
        destination.display(),
        summary.skipped
    );
    Ok(summary)
}

fn is_contained(relative: &Path) -> bool {
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(unix)]
async fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = tokio::fs::read_link(from).await?;
    if tokio::fs::symlink_metadata(to).await.is_ok() {
        tokio::fs::remove_file(to).await?;
    }
    tokio::fs::symlink(target, to).await
}

#[cfg(not(unix))]
async fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    tokio::fs::copy(from, to).await.map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn copies_nested_files_and_skips_missing_ones() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        std::fs::create_dir_all(source.path().join("config/local")).unwrap();
        std::fs::write(source.path().join(".env"), "TOKEN=1").unwrap();
        std::fs::write(source.path().join("config/local/db.yml"), "db: dev").unwrap();

        let files = vec![
            PathBuf::from(".env"),
            PathBuf::from("config/local/db.yml"),
            PathBuf::from("gone.log"),
        ];
        let summary = copy_relative_files(source.path(), destination.path(), &files)
            .await
            .unwrap();

        assert_eq!(summary, CopySummary { copied: 2, skipped: 1 });
        assert_eq!(
            std::fs::read_to_string(destination.path().join("config/local/db.yml")).unwrap(),
            "db: dev"
        );
    }

    #[tokio::test]
    async fn refuses_paths_escaping_the_checkout() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        let summary = copy_relative_files(
            source.path(),
            destination.path(),
            &[PathBuf::from("../outside"), PathBuf::from("/etc/passwd")],
        )
        .await
        .unwrap();
        assert_eq!(summary, CopySummary { copied: 0, skipped: 2 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn preserves_symlinks() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        std::fs::write(source.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink("real.txt", source.path().join("link.txt")).unwrap();

        copy_relative_files(source.path(), destination.path(), &[PathBuf::from("link.txt")])
            .await
            .unwrap();

        let target = std::fs::read_link(destination.path().join("link.txt")).unwrap();
        assert_eq!(target, PathBuf::from("real.txt"));
    }
}
