use std::path::{Component, Path, PathBuf};

/// Returned instead of an empty path when source and target are the same directory.
pub const CURRENT_DIR: &str = "./";

/// Compute the path of `to` as seen from the directory containing `from_file`.
///
/// When `to_is_dir` is false the final component of `to` is treated as a file
/// name: the common-prefix stripping happens on its parent directory and the
/// name is appended to the result. Purely lexical; relative inputs are anchored
/// at the process working directory.
///
/// ```
/// use envroot_fs::pathmath::relative;
/// use std::path::Path;
///
/// assert_eq!(
///     relative(Path::new("/usr/share/something/a-file.pth"), Path::new("/usr/share/another-place/src/Directory"), true),
///     Path::new("../another-place/src/Directory"),
/// );
/// assert_eq!(relative(Path::new("/usr/share/a-file.pth"), Path::new("/usr/share/"), true), Path::new("./"));
/// ```
pub fn relative(from_file: &Path, to: &Path, to_is_dir: bool) -> PathBuf {
    let anchor = from_file.parent().unwrap_or_else(|| Path::new(""));
    let (target_dir, file_name) = if to_is_dir {
        (to, None)
    } else {
        (to.parent().unwrap_or_else(|| Path::new("")), to.file_name())
    };

    let source = normalize(anchor);
    let dest = normalize(target_dir);
    let source_parts: Vec<Component<'_>> = source.components().collect();
    let dest_parts: Vec<Component<'_>> = dest.components().collect();

    // Different drive prefixes cannot be bridged with "..".
    if source_parts.first() != dest_parts.first() {
        let mut out = dest.clone();
        if let Some(name) = file_name {
            out.push(name);
        }
        return out;
    }

    let common = source_parts
        .iter()
        .zip(&dest_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..source_parts.len() {
        out.push("..");
    }
    for part in &dest_parts[common..] {
        out.push(part.as_os_str());
    }
    if let Some(name) = file_name {
        out.push(name);
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(CURRENT_DIR)
    } else {
        out
    }
}

/// Make `path` absolute and collapse `.`/`..` components without touching disk.
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // ".." at the root stays at the root.
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True when `path` is absolute and already in normalized form.
///
/// Lines in path-list files that fail this test are left alone by relocation:
/// they are either relative already or not plain paths.
pub fn is_normalized_absolute(path: &Path) -> bool {
    path.is_absolute() && normalize(path).as_os_str() == path.as_os_str()
}
