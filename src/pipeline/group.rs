//! Prefix grouping: bucket routed scans by the first letter of their folder.
//!
//! Runs only after routing has finished; the folder tree it lists must no
//! longer be changing. Each non-empty folder directly under the root
//! contributes its files to the bucket keyed by the upper-cased first
//! character of the folder name. Empty folders contribute no key.
//!
//! Folder and file names are sorted before grouping, so listing the same
//! tree twice yields the same mapping.

use crate::error::ScanRouteError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Prefix letter → files to upload through that letter's form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderGroup(BTreeMap<char, Vec<PathBuf>>);

impl FolderGroup {
    pub fn get(&self, prefix: char) -> Option<&[PathBuf]> {
        self.0.get(&prefix).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &[PathBuf])> {
        self.0.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn prefixes(&self) -> impl Iterator<Item = char> + '_ {
        self.0.keys().copied()
    }

    /// Number of prefix groups.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of files across all groups.
    pub fn file_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    fn push(&mut self, prefix: char, file: PathBuf) {
        self.0.entry(prefix).or_default().push(file);
    }
}

/// Upper-cased first character of a folder name.
///
/// Names that are not valid UTF-8 are read lossily; only the first
/// character matters here.
pub fn folder_prefix(name: &OsStr) -> Option<char> {
    name.to_string_lossy()
        .chars()
        .next()
        .and_then(|c| c.to_uppercase().next())
}

/// Names of the folders directly under `root`, sorted.
///
/// Names are kept as raw `OsString`s so they can be joined back onto `root`
/// even when they are not valid UTF-8.
pub fn list_folder_names(root: &Path) -> Result<Vec<OsString>, ScanRouteError> {
    let entries = std::fs::read_dir(root).map_err(|e| ScanRouteError::ListingFailed {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScanRouteError::ListingFailed {
            path: root.to_path_buf(),
            source: e,
        })?;
        if entry.path().is_dir() {
            names.push(entry.file_name());
        }
    }
    names.sort();
    Ok(names)
}

/// Group the files of the named folders under `root` by folder prefix.
///
/// Names that are not folders are ignored, as are folders that cannot be
/// read (logged) and folders without regular files.
pub fn group_by_prefix<S: AsRef<OsStr>>(folder_names: &[S], root: &Path) -> FolderGroup {
    let mut groups = FolderGroup::default();

    for name in folder_names {
        let name = name.as_ref();
        let folder = root.join(name);
        if !folder.is_dir() {
            continue;
        }
        let Some(prefix) = folder_prefix(name) else {
            continue;
        };

        let files = match regular_files(&folder) {
            Ok(files) => files,
            Err(e) => {
                warn!("Skipping unreadable folder {}: {}", folder.display(), e);
                continue;
            }
        };
        if files.is_empty() {
            debug!("Folder {} is empty; no group entry", folder.display());
            continue;
        }

        for file in files {
            groups.push(prefix, file);
        }
    }

    groups
}

/// List `root` and group everything in it; see [`group_by_prefix`].
pub fn group_folder(root: &Path) -> Result<FolderGroup, ScanRouteError> {
    let names = list_folder_names(root)?;
    let groups = group_by_prefix(&names, root);
    debug!(
        "Grouped {} files from {} folders into {} prefixes",
        groups.file_count(),
        names.len(),
        groups.len()
    );
    Ok(groups)
}

/// Absolute paths of the regular files directly inside `folder`, sorted.
fn regular_files(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let folder = std::path::absolute(folder)?;
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&folder)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: PathBuf) {
        fs::write(path, b"x").unwrap();
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let jane = dir.path().join("Jane Doe");
        let john = dir.path().join("John Ray");
        fs::create_dir(&jane).unwrap();
        fs::create_dir(&john).unwrap();
        touch(jane.join("1.png"));
        touch(jane.join("2.png"));
        touch(john.join("3.png"));
        dir
    }

    #[test]
    fn same_letter_folders_share_a_group() {
        let dir = tree();
        let groups = group_folder(dir.path()).unwrap();

        assert_eq!(groups.len(), 1);
        let j = groups.get('J').unwrap();
        assert_eq!(j.len(), 3);
        for name in ["1.png", "2.png", "3.png"] {
            assert_eq!(
                j.iter().filter(|p| p.ends_with(name)).count(),
                1,
                "{name} must appear exactly once"
            );
        }
        assert!(j.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn empty_folder_contributes_no_key() {
        let dir = tree();
        fs::create_dir(dir.path().join("Zed Empty")).unwrap();
        let groups = group_folder(dir.path()).unwrap();
        assert!(groups.get('Z').is_none());
        assert_eq!(groups.prefixes().collect::<Vec<_>>(), vec!['J']);
    }

    #[test]
    fn lowercase_folder_maps_to_uppercase_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("anna lee");
        fs::create_dir(&f).unwrap();
        touch(f.join("a.png"));
        let groups = group_folder(dir.path()).unwrap();
        assert_eq!(groups.get('A').map(<[PathBuf]>::len), Some(1));
    }

    #[test]
    fn loose_files_and_nested_folders_are_ignored() {
        let dir = tree();
        touch(dir.path().join("unrouted.png"));
        fs::create_dir(dir.path().join("Jane Doe").join("nested")).unwrap();

        let groups = group_folder(dir.path()).unwrap();
        assert_eq!(groups.file_count(), 3);
    }

    #[test]
    fn grouping_twice_is_identical() {
        let dir = tree();
        let first = group_folder(dir.path()).unwrap();
        let second = group_folder(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn explicit_names_that_are_not_folders_are_skipped() {
        let dir = tree();
        let groups = group_by_prefix(&["Jane Doe", "Missing Person", ""], dir.path());
        assert_eq!(groups.file_count(), 2);
    }

    // Linux filesystems accept arbitrary bytes in names; APFS does not.
    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_folder_keeps_its_files() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join(OsStr::from_bytes(b"J\xffane Doe"));
        fs::create_dir(&folder).unwrap();
        touch(folder.join("a.png"));

        let groups = group_folder(dir.path()).unwrap();
        let j = groups.get('J').unwrap();
        assert_eq!(j.len(), 1);
        assert!(j[0].is_file());
    }

    #[test]
    fn prefix_of_empty_name_is_none() {
        assert_eq!(folder_prefix(OsStr::new("")), None);
        assert_eq!(folder_prefix(OsStr::new("émile Zola")), Some('É'));
    }

    #[test]
    fn serialises_as_plain_map() {
        let dir = tree();
        let groups = group_folder(dir.path()).unwrap();
        let json = serde_json::to_value(&groups).unwrap();
        assert_eq!(json["J"].as_array().unwrap().len(), 3);
    }
}
