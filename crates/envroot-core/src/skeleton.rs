//! The minimal standard-library subset an environment needs before its own
//! `site` module can take over import resolution.

use envroot_fs::layout::SITE_PACKAGES_DIR;
use envroot_fs::PlatformFamily;
use envroot_runtime::DonorInstallation;
use std::path::{Path, PathBuf};

const REQUIRED_MODULES: [&str; 22] = [
    "os",
    "posix",
    "posixpath",
    "ntpath",
    "genericpath",
    "fnmatch",
    "locale",
    "encodings",
    "codecs",
    "stat",
    "UserDict",
    "readline",
    "copy_reg",
    "types",
    "re",
    "sre",
    "sre_parse",
    "sre_constants",
    "sre_compile",
    "lib-dynload",
    "config",
    "zlib",
];

/// Bootstrap module names for an interpreter of the given `(major, minor)` version.
pub fn required_modules(version: (u32, u32)) -> Vec<&'static str> {
    let mut modules = REQUIRED_MODULES.to_vec();
    if version == (2, 6) {
        modules.extend(["warnings", "linecache", "_abcoll", "abc"]);
    }
    if version <= (2, 3) {
        modules.extend(["sets", "__future__"]);
    }
    modules
}

/// Whether the donor's stdlib entry `file_name` belongs in the skeleton.
///
/// Entries are matched by stem, so `os.py`, `os.pyc` and an `encodings`
/// package all qualify.
pub fn is_bootstrap_entry(file_name: &str, modules: &[&str]) -> bool {
    if file_name == SITE_PACKAGES_DIR {
        return false;
    }
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    modules.contains(&stem)
}

/// Donor directories the skeleton is drawn from, first the stdlib itself.
pub fn stdlib_roots(donor: &DonorInstallation) -> Vec<PathBuf> {
    let stdlib = donor.stdlib_dir.clone();
    let mut roots = vec![stdlib.clone()];
    if donor.family() == PlatformFamily::Windows {
        if let Some(parent) = stdlib.parent() {
            roots.push(parent.join("DLLs"));
        }
    } else if donor.is_darwin() {
        roots.push(stdlib.join(SITE_PACKAGES_DIR));
    }
    roots
}

/// Where the donor keeps platform-specific modules when `exec_prefix` differs
/// from `prefix`.
pub fn exec_prefix_library(donor: &DonorInstallation) -> PathBuf {
    match donor.family() {
        PlatformFamily::Windows => donor.exec_prefix.join("lib"),
        PlatformFamily::Alternate => donor.exec_prefix.join("Lib"),
        PlatformFamily::Posix => donor.exec_prefix.join("lib").join(donor.py_version()),
    }
}
