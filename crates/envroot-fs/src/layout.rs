use crate::pathmath::normalize;
use crate::FsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const ORIG_PREFIX_FILE: &str = "orig-prefix.txt";
pub const SITE_MARKER_FILE: &str = "no-global-site-packages.txt";
pub const SHIM_FILE: &str = "site.py";
pub const SITE_PACKAGES_DIR: &str = "site-packages";
pub const ACTIVATE_THIS_FILE: &str = "activate_this.py";

/// Host platform family of a donor interpreter.
///
/// Resolved once from the donor's reported platform string; every
/// family-dependent constant comes from the table behind [`PlatformFamily::table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Posix,
    Windows,
    Alternate,
}

/// An activation artifact: the file written into the executable directory and
/// the template blob it is rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationFile {
    pub file_name: &'static str,
    pub template: &'static str,
}

#[derive(Debug)]
struct FamilyTable {
    lib_dir: &'static str,
    include_dir: &'static str,
    bin_dir: &'static str,
    versioned_dirs: bool,
    case_insensitive: bool,
    expected_exe: &'static str,
    exe_suffix: &'static str,
    activation: &'static [ActivationFile],
}

const SHELL_ACTIVATION: &[ActivationFile] = &[
    ActivationFile {
        file_name: "activate",
        template: "activate.sh",
    },
    ActivationFile {
        file_name: ACTIVATE_THIS_FILE,
        template: "activate_this.py",
    },
];

const BATCH_ACTIVATION: &[ActivationFile] = &[
    ActivationFile {
        file_name: "activate.bat",
        template: "activate.bat",
    },
    ActivationFile {
        file_name: "deactivate.bat",
        template: "deactivate.bat",
    },
    ActivationFile {
        file_name: ACTIVATE_THIS_FILE,
        template: "activate_this.py",
    },
];

const POSIX: FamilyTable = FamilyTable {
    lib_dir: "lib",
    include_dir: "include",
    bin_dir: "bin",
    versioned_dirs: true,
    case_insensitive: false,
    expected_exe: "python",
    exe_suffix: "",
    activation: SHELL_ACTIVATION,
};

const WINDOWS: FamilyTable = FamilyTable {
    lib_dir: "Lib",
    include_dir: "Include",
    bin_dir: "Scripts",
    versioned_dirs: false,
    case_insensitive: true,
    expected_exe: "python",
    exe_suffix: ".exe",
    activation: BATCH_ACTIVATION,
};

const ALTERNATE: FamilyTable = FamilyTable {
    lib_dir: "Lib",
    include_dir: "Include",
    bin_dir: "bin",
    versioned_dirs: false,
    case_insensitive: false,
    expected_exe: "jython",
    exe_suffix: "",
    activation: SHELL_ACTIVATION,
};

impl PlatformFamily {
    /// Classify a `sys.platform`-style string.
    pub fn from_platform(platform: &str) -> Self {
        if platform == "win32" {
            Self::Windows
        } else if platform.starts_with("java") {
            Self::Alternate
        } else {
            Self::Posix
        }
    }

    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    fn table(self) -> &'static FamilyTable {
        match self {
            Self::Posix => &POSIX,
            Self::Windows => &WINDOWS,
            Self::Alternate => &ALTERNATE,
        }
    }

    /// Generic interpreter name every environment is expected to provide.
    #[inline]
    pub fn expected_exe(self) -> &'static str {
        self.table().expected_exe
    }

    #[inline]
    pub fn exe_suffix(self) -> &'static str {
        self.table().exe_suffix
    }

    #[inline]
    pub fn bin_dir_name(self) -> &'static str {
        self.table().bin_dir
    }

    #[inline]
    pub fn activation_files(self) -> &'static [ActivationFile] {
        self.table().activation
    }

    /// Fold case where the family's filesystems are case-insensitive.
    pub fn normcase(self, value: &str) -> String {
        if self.table().case_insensitive {
            value.to_lowercase()
        } else {
            value.to_owned()
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Posix => "posix",
            Self::Windows => "windows",
            Self::Alternate => "alternate",
        };
        f.write_str(s)
    }
}

/// Canonical directory scheme of one environment.
///
/// Derived from the root, the platform family and the interpreter version; it
/// is recomputed on every build and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentLayout {
    root: PathBuf,
    family: PlatformFamily,
    version: String,
    library_dir: PathBuf,
    include_dir: PathBuf,
    executable_dir: PathBuf,
}

impl EnvironmentLayout {
    /// `version` is the `X.Y` interpreter version; it only shows up in the
    /// directory names of versioned families.
    pub fn new(root: impl AsRef<Path>, family: PlatformFamily, version: &str) -> Self {
        let root = normalize(root.as_ref());
        let table = family.table();
        let (library_dir, include_dir) = if table.versioned_dirs {
            let versioned = format!("python{version}");
            (
                root.join(table.lib_dir).join(&versioned),
                root.join(table.include_dir).join(&versioned),
            )
        } else {
            (root.join(table.lib_dir), root.join(table.include_dir))
        };
        let executable_dir = root.join(table.bin_dir);
        Self {
            root,
            family,
            version: version.to_owned(),
            library_dir,
            include_dir,
            executable_dir,
        }
    }

    /// Reconstruct the layout of an existing environment from what is on disk.
    ///
    /// The library directory is recognized by its `orig-prefix.txt` record.
    /// Unversioned layouts report an empty version.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self, FsError> {
        let root = normalize(root.as_ref());

        let posix_lib = root.join(POSIX.lib_dir);
        if posix_lib.is_dir() {
            let mut versions = Vec::new();
            for entry in fs::read_dir(&posix_lib).map_err(FsError::at(&posix_lib))? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(version) = name.strip_prefix("python") {
                    if entry.path().join(ORIG_PREFIX_FILE).is_file() {
                        versions.push(version.to_owned());
                    }
                }
            }
            if let Some(version) = versions.into_iter().max_by_key(|v| version_key(v)) {
                return Ok(Self::new(&root, PlatformFamily::Posix, &version));
            }
        }

        if root.join(WINDOWS.lib_dir).join(ORIG_PREFIX_FILE).is_file() {
            let family = if root.join(WINDOWS.bin_dir).is_dir() {
                PlatformFamily::Windows
            } else {
                PlatformFamily::Alternate
            };
            return Ok(Self::new(&root, family, ""));
        }

        Err(FsError::UnknownLayout(root))
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn family(&self) -> PlatformFamily {
        self.family
    }

    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline]
    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    #[inline]
    pub fn include_dir(&self) -> &Path {
        &self.include_dir
    }

    #[inline]
    pub fn executable_dir(&self) -> &Path {
        &self.executable_dir
    }

    #[inline]
    pub fn site_packages_dir(&self) -> PathBuf {
        self.library_dir.join(SITE_PACKAGES_DIR)
    }

    #[inline]
    pub fn orig_prefix_file(&self) -> PathBuf {
        self.library_dir.join(ORIG_PREFIX_FILE)
    }

    #[inline]
    pub fn site_marker_file(&self) -> PathBuf {
        self.library_dir.join(SITE_MARKER_FILE)
    }

    #[inline]
    pub fn shim_file(&self) -> PathBuf {
        self.library_dir.join(SHIM_FILE)
    }

    #[inline]
    pub fn distutils_dir(&self) -> PathBuf {
        self.library_dir.join("distutils")
    }

    #[inline]
    pub fn activate_this_file(&self) -> PathBuf {
        self.executable_dir.join(ACTIVATE_THIS_FILE)
    }

    /// The generic launcher name inside the executable directory.
    pub fn generic_launcher(&self) -> PathBuf {
        self.executable_dir.join(format!(
            "{}{}",
            self.family.expected_exe(),
            self.family.exe_suffix()
        ))
    }

    /// Directory name of the executable dir, as substituted into activation templates.
    pub fn executable_dir_name(&self) -> &str {
        self.family.bin_dir_name()
    }

    /// Base name of the root, as substituted into activation templates.
    pub fn root_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Case-normalized string form of the root for prefix comparisons.
    pub fn normalized_root(&self) -> String {
        self.family.normcase(&self.root.to_string_lossy())
    }

    /// Whether `path` lies at or below the root, using the family's case rules.
    pub fn contains(&self, path: &Path) -> bool {
        let candidate = normalize(path);
        let root: Vec<String> = self
            .root
            .components()
            .map(|c| self.family.normcase(&c.as_os_str().to_string_lossy()))
            .collect();
        let parts: Vec<String> = candidate
            .components()
            .map(|c| self.family.normcase(&c.as_os_str().to_string_lossy()))
            .collect();
        parts.len() >= root.len() && parts[..root.len()] == root[..]
    }
}

/// Numeric `(major, minor)` of an `X.Y` version; unparsable parts count as 0.
fn version_key(version: &str) -> (u32, u32) {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}
