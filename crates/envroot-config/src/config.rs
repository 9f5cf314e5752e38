use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "ENVROOT_CONFIG";

const DEFAULT_INTERPRETER: &str = "python3";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvrootConfig {
    /// Donor interpreter: a bare name looked up on `PATH`, or a path.
    #[serde(default)]
    pub python: Option<String>,
    /// Directory whose files override the built-in templates by name.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
    /// Where a bundled installer payload is searched for.
    #[serde(default)]
    pub installer_search_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub build: BuildSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    #[serde(default = "default_true")]
    pub include_global_packages: bool,
    #[serde(default = "default_true")]
    pub symlink: bool,
    #[serde(default = "default_true")]
    pub install_setuptools: bool,
    #[serde(default)]
    pub unzip_setuptools: bool,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            include_global_packages: true,
            symlink: true,
            install_setuptools: true,
            unzip_setuptools: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl EnvrootConfig {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        if config.python.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyInterpreter);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Resolve the config file: `explicit`, else `$ENVROOT_CONFIG`, else
    /// `~/.config/envroot/config.toml` when it exists, else built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }
        if let Some(path) = default_config_path().filter(|p| p.is_file()) {
            debug!("using config file {}", path.display());
            return Self::load(&path);
        }
        Ok(Self::default())
    }

    pub fn interpreter(&self) -> &str {
        self.python.as_deref().unwrap_or(DEFAULT_INTERPRETER)
    }
}

fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/envroot/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EnvrootConfig::parse("").unwrap();
        assert_eq!(config, EnvrootConfig::default());
        assert_eq!(config.interpreter(), "python3");
        assert!(config.build.include_global_packages);
        assert!(config.build.symlink);
        assert!(!config.build.unzip_setuptools);
    }

    #[test]
    fn full_config_parses() {
        let config = EnvrootConfig::parse(
            r#"
python = "/opt/python2.6/bin/python2.6"
templates_dir = "/etc/envroot/templates"
installer_search_dirs = [".", "/usr/share/envroot"]

[build]
include_global_packages = false
symlink = false
install_setuptools = false
unzip_setuptools = true
"#,
        )
        .unwrap();
        assert_eq!(config.interpreter(), "/opt/python2.6/bin/python2.6");
        assert_eq!(config.installer_search_dirs.len(), 2);
        assert!(!config.build.include_global_packages);
        assert!(!config.build.symlink);
        assert!(config.build.unzip_setuptools);
    }

    #[test]
    fn partial_build_section_keeps_other_defaults() {
        let config = EnvrootConfig::parse("[build]\nunzip_setuptools = true\n").unwrap();
        assert!(config.build.include_global_packages);
        assert!(config.build.install_setuptools);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            EnvrootConfig::parse("pyhton = \"python\"\n"),
            Err(ConfigError::ParseToml(_))
        ));
    }

    #[test]
    fn empty_interpreter_is_rejected() {
        assert!(matches!(
            EnvrootConfig::parse("python = \"  \"\n"),
            Err(ConfigError::EmptyInterpreter)
        ));
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("envroot.toml");
        fs::write(&path, "python = \"python2.5\"\n").unwrap();
        let config = EnvrootConfig::discover(Some(&path)).unwrap();
        assert_eq!(config.interpreter(), "python2.5");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EnvrootConfig::discover(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
