//! Executable lookup on a search path

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Find an executable named `name`
///
/// Names containing a path separator are checked as given. Otherwise every
/// directory of `search_path` (or `$PATH` when `None`) is tried in order.
pub fn find_executable(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var: OsString = match search_path {
        Some(path) => path.to_os_string(),
        None => env::var_os("PATH")?,
    };

    env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidate_names(name).into_iter().map(move |file| dir.join(file)))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(windows)]
fn candidate_names(name: &str) -> Vec<String> {
    if Path::new(name).extension().is_some() {
        return vec![name.to_string()];
    }
    let exts = env::var("PATHEXT").unwrap_or_else(|_| ".EXE;.CMD;.BAT;.COM".to_string());
    std::iter::once(name.to_string())
        .chain(exts.split(';').filter(|e| !e.is_empty()).map(|ext| format!("{}{}", name, ext)))
        .collect()
}

#[cfg(not(windows))]
fn candidate_names(name: &str) -> Vec<String> {
    vec![name.to_string()]
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_finds_executable_in_search_path() {
        let temp = TempDir::new().unwrap();
        let expected = write_file(temp.path(), "mytool", 0o755);

        let found = find_executable("mytool", Some(temp.path().as_os_str()));
        assert_eq!(found, Some(expected));
    }

    #[test]
    fn test_skips_non_executable() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "plain", 0o644);

        assert!(find_executable("plain", Some(temp.path().as_os_str())).is_none());
    }

    #[test]
    fn test_first_directory_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let expected = write_file(first.path(), "dup", 0o755);
        write_file(second.path(), "dup", 0o755);

        let path = env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(find_executable("dup", Some(&path)), Some(expected));
    }

    #[test]
    fn test_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = write_file(temp.path(), "direct", 0o755);

        let found = find_executable(path.to_str().unwrap(), Some(OsStr::new("")));
        assert_eq!(found, Some(path));
    }

    #[test]
    fn test_missing() {
        let temp = TempDir::new().unwrap();
        assert!(find_executable("nope", Some(temp.path().as_os_str())).is_none());
        assert!(find_executable("", None).is_none());
    }
}
