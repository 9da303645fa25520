//! File routing: move a scan into the folder named after its label.
//!
//! `<source>/<label>/` is created on demand and the scan keeps its file
//! name. Paths are joined with [`Path::join`], never with literal separators.
//!
//! Re-running with the same label lands in the same folder. Routing the same
//! source path twice in one run fails the second time, because the file has
//! already moved.

use crate::error::ImageError;
use crate::pipeline::label::Label;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Move `image` into `<source_dir>/<label>/` and return its new path.
///
/// An existing folder (including one created concurrently) is reused. An
/// existing file with the same name at the destination is never overwritten.
pub fn route_image(
    source_dir: &Path,
    label: &Label,
    image: &Path,
) -> Result<PathBuf, ImageError> {
    let target_dir = source_dir.join(label);
    let route_err = |detail: String| ImageError::Route {
        path: image.to_path_buf(),
        target: target_dir.clone(),
        detail,
    };

    ensure_folder(&target_dir).map_err(|e| route_err(format!("create folder: {e}")))?;

    let file_name = image
        .file_name()
        .ok_or_else(|| route_err("source has no file name".to_string()))?;
    let destination = target_dir.join(file_name);

    if destination.exists() {
        return Err(route_err(format!("{} already exists", destination.display())));
    }

    move_file(image, &destination).map_err(|e| route_err(format!("move: {e}")))?;
    debug!("Moved {} → {}", image.display(), destination.display());

    Ok(destination)
}

/// Create `dir` unless it already exists as a folder.
fn ensure_folder(dir: &Path) -> io::Result<()> {
    match std::fs::create_dir(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// `rename`, falling back to copy + remove when source and target sit on
/// different filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.is_file() {
                return Err(rename_err);
            }
            copy_then_remove(from, to, |from, to| std::fs::copy(from, to))
        }
    }
}

/// Copy `from` to `to` with `copy`, then delete `from`.
///
/// On any failure `to` is removed again, so a half-written copy never blocks
/// a later run with "already exists" and exactly one copy survives.
fn copy_then_remove(
    from: &Path,
    to: &Path,
    copy: impl FnOnce(&Path, &Path) -> io::Result<u64>,
) -> io::Result<()> {
    if let Err(e) = copy(from, to) {
        let _ = std::fs::remove_file(to);
        return Err(e);
    }
    if let Err(e) = std::fs::remove_file(from) {
        let _ = std::fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn label(s: &str) -> Label {
        Label::new(s).unwrap()
    }

    #[test]
    fn creates_folder_and_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("scan1.png");
        fs::write(&img, b"pixels").unwrap();

        let dest = route_image(dir.path(), &label("Jane Doe"), &img).unwrap();

        assert_eq!(dest, dir.path().join("Jane Doe").join("scan1.png"));
        assert!(dir.path().join("Jane Doe").is_dir());
        assert!(!img.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"pixels");
    }

    #[test]
    fn reuses_existing_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Jane Doe")).unwrap();
        fs::write(dir.path().join("Jane Doe").join("old.png"), b"o").unwrap();
        let img = dir.path().join("new.png");
        fs::write(&img, b"n").unwrap();

        route_image(dir.path(), &label("Jane Doe"), &img).unwrap();

        let count = fs::read_dir(dir.path().join("Jane Doe")).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn second_move_of_same_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("scan.png");
        fs::write(&img, b"x").unwrap();

        route_image(dir.path(), &label("Jane Doe"), &img).unwrap();
        let err = route_image(dir.path(), &label("Jane Doe"), &img).unwrap_err();
        assert!(matches!(err, ImageError::Route { .. }), "got {err:?}");
    }

    #[test]
    fn refuses_to_overwrite_destination() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Jane Doe")).unwrap();
        fs::write(dir.path().join("Jane Doe").join("scan.png"), b"first").unwrap();
        let img = dir.path().join("scan.png");
        fs::write(&img, b"second").unwrap();

        let err = route_image(dir.path(), &label("Jane Doe"), &img).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(img.exists());
        assert_eq!(
            fs::read(dir.path().join("Jane Doe").join("scan.png")).unwrap(),
            b"first"
        );
    }

    #[test]
    fn file_in_place_of_folder_is_route_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Jane Doe"), b"not a folder").unwrap();
        let img = dir.path().join("scan.png");
        fs::write(&img, b"x").unwrap();

        let err = route_image(dir.path(), &label("Jane Doe"), &img).unwrap_err();
        assert!(err.to_string().contains("create folder"), "got {err}");
        assert!(img.exists());
    }

    #[test]
    fn failed_copy_leaves_no_partial_destination() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("scan.png");
        let to = dir.path().join("scan-copy.png");
        fs::write(&from, b"pixels").unwrap();

        let err = copy_then_remove(&from, &to, |_, to| {
            fs::write(to, b"pix")?;
            Err(io::Error::other("disk full"))
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "disk full");
        assert!(!to.exists());
        assert_eq!(fs::read(&from).unwrap(), b"pixels");
    }

    #[test]
    fn copy_fallback_moves_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("scan.png");
        let to = dir.path().join("scan-copy.png");
        fs::write(&from, b"pixels").unwrap();

        copy_then_remove(&from, &to, |from, to| fs::copy(from, to)).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"pixels");
    }
}
