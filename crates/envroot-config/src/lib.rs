//! Configuration and bootstrap templates for envroot.
//!
//! `EnvrootConfig` is the optional TOML file that supplies defaults for the
//! donor interpreter and build options. `TemplateStore` is the named-blob store
//! the builder renders its shim, activation scripts and installer bootstrap from.

pub mod config;
pub mod templates;

pub use config::{BuildSection, EnvrootConfig, CONFIG_ENV_VAR};
pub use templates::{Placeholders, TemplateStore};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unknown template: {0}")]
    UnknownTemplate(String),
    #[error("failed to read template override {}: {source}", path.display())]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("python must not be empty")]
    EmptyInterpreter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_template_display() {
        let e = ConfigError::UnknownTemplate("activate.fish".to_owned());
        assert!(e.to_string().contains("activate.fish"));
    }

    #[test]
    fn read_error_names_path() {
        let e = ConfigError::Read {
            path: PathBuf::from("/etc/envroot.toml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(e.to_string().contains("/etc/envroot.toml"));
    }
}
