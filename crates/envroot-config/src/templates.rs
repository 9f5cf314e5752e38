use crate::ConfigError;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const SITE_SHIM: &str = "site.py";
pub const ACTIVATE_SH: &str = "activate.sh";
pub const ACTIVATE_BAT: &str = "activate.bat";
pub const DEACTIVATE_BAT: &str = "deactivate.bat";
pub const ACTIVATE_THIS: &str = "activate_this.py";
pub const DISTUTILS_INIT: &str = "distutils-init.py";
pub const DISTUTILS_CFG: &str = "distutils.cfg";
pub const INSTALLER_BOOTSTRAP: &str = "ez_setup.py";

const BUILTIN: [(&str, &str); 8] = [
    (SITE_SHIM, include_str!("../templates/site.py")),
    (ACTIVATE_SH, include_str!("../templates/activate.sh")),
    (ACTIVATE_BAT, include_str!("../templates/activate.bat")),
    (DEACTIVATE_BAT, include_str!("../templates/deactivate.bat")),
    (ACTIVATE_THIS, include_str!("../templates/activate_this.py")),
    (DISTUTILS_INIT, include_str!("../templates/distutils-init.py")),
    (DISTUTILS_CFG, include_str!("../templates/distutils.cfg")),
    (INSTALLER_BOOTSTRAP, include_str!("../templates/ez_setup.py")),
];

/// Named text blobs the builder writes into environments.
///
/// Starts from the compiled-in defaults; an override directory may replace
/// any of them by file name. Names outside the built-in set are rejected.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    entries: BTreeMap<&'static str, Cow<'static, str>>,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateStore {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(name, body)| (*name, Cow::Borrowed(*body)))
                .collect(),
        }
    }

    /// Replace built-ins with same-named files found in `dir`.
    pub fn with_override_dir(mut self, dir: &Path) -> Result<Self, ConfigError> {
        for (name, body) in &mut self.entries {
            let candidate = dir.join(name);
            if !candidate.is_file() {
                continue;
            }
            debug!("template {name} overridden by {}", candidate.display());
            let content =
                fs::read_to_string(&candidate).map_err(|source| ConfigError::TemplateRead {
                    path: candidate.clone(),
                    source,
                })?;
            *body = Cow::Owned(content);
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&str, ConfigError> {
        self.entries
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| ConfigError::UnknownTemplate(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Render `name` with the activation placeholders filled in.
    pub fn render(&self, name: &str, values: &Placeholders<'_>) -> Result<String, ConfigError> {
        Ok(values.substitute(self.get(name)?))
    }
}

/// Values for the placeholders in activation templates.
#[derive(Debug, Clone, Copy)]
pub struct Placeholders<'a> {
    /// Absolute environment root.
    pub root: &'a str,
    /// Base name of the root, used in the prompt.
    pub name: &'a str,
    /// Executable directory name relative to the root.
    pub bin_name: &'a str,
}

impl Placeholders<'_> {
    pub const ROOT: &'static str = "__VIRTUAL_ENV__";
    pub const NAME: &'static str = "__VIRTUAL_NAME__";
    pub const BIN_NAME: &'static str = "__BIN_NAME__";

    pub fn substitute(&self, body: &str) -> String {
        body.replace(Self::ROOT, self.root)
            .replace(Self::NAME, self.name)
            .replace(Self::BIN_NAME, self.bin_name)
    }
}
