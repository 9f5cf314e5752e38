use crate::CoreError;
use envroot_fs::EnvironmentLayout;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Read-only summary of a built environment.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentInfo {
    pub layout: EnvironmentLayout,
    /// Contents of the original-prefix record.
    pub original_prefix: String,
    pub include_global_packages: bool,
    pub launcher: Option<PathBuf>,
    pub activation_helper: bool,
    /// Path-list and link-record files in `site-packages`.
    pub path_files: Vec<PathBuf>,
}

pub fn inspect_environment(root: &Path) -> Result<EnvironmentInfo, CoreError> {
    let layout = EnvironmentLayout::discover(root)?;
    let original_prefix = fs::read_to_string(layout.orig_prefix_file())?
        .trim()
        .to_owned();
    let include_global_packages = !layout.site_marker_file().exists();
    let launcher = Some(layout.generic_launcher()).filter(|p| p.is_file());
    let activation_helper = layout.activate_this_file().is_file();

    let mut path_files = Vec::new();
    let site = layout.site_packages_dir();
    if site.is_dir() {
        for entry in fs::read_dir(&site)? {
            let path = entry?.path();
            if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("pth" | "egg-link")
            ) {
                path_files.push(path);
            }
        }
    }
    path_files.sort();

    Ok(EnvironmentInfo {
        layout,
        original_prefix,
        include_global_packages,
        launcher,
        activation_helper,
        path_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use envroot_fs::PlatformFamily;

    #[test]
    fn reads_prefix_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let layout = EnvironmentLayout::new(dir.path(), PlatformFamily::Posix, "2.6");
        fs::create_dir_all(layout.site_packages_dir()).unwrap();
        fs::write(layout.orig_prefix_file(), "/usr").unwrap();
        fs::write(layout.site_marker_file(), "").unwrap();
        fs::write(layout.site_packages_dir().join("b.pth"), "").unwrap();
        fs::write(layout.site_packages_dir().join("a.egg-link"), "").unwrap();
        fs::write(layout.site_packages_dir().join("module.py"), "").unwrap();

        let info = inspect_environment(dir.path()).unwrap();
        assert_eq!(info.original_prefix, "/usr");
        assert!(!info.include_global_packages);
        assert!(info.launcher.is_none());
        assert!(!info.activation_helper);
        let names: Vec<_> = info
            .path_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.egg-link", "b.pth"]);
    }

    #[test]
    fn plain_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            inspect_environment(dir.path()),
            Err(CoreError::Fs(envroot_fs::FsError::UnknownLayout(_)))
        ));
    }
}
