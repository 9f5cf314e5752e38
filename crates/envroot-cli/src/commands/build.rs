use super::{fail, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use envroot_config::templates::INSTALLER_BOOTSTRAP;
use envroot_config::{EnvrootConfig, TemplateStore};
use envroot_core::{BuildOptions, CoreError, EnvironmentBuilder};
use envroot_fs::{Level, ProgressLogger};
use envroot_runtime::{resolve_interpreter, DonorInstallation, SetuptoolsInstaller};
use std::path::{Path, PathBuf};

pub fn run(
    config: &EnvrootConfig,
    log: &ProgressLogger,
    dest: &Path,
    python: Option<&str>,
    options: BuildOptions,
    install_setuptools: bool,
    json: bool,
) -> Result<u8, String> {
    let name = python.unwrap_or_else(|| config.interpreter());
    let interpreter = match resolve_interpreter(name) {
        Ok(path) => path,
        Err(e) => return Ok(fail(&CoreError::from(e))),
    };

    let pb = if json || !log.console_accepts(Level::Notify) {
        None
    } else {
        Some(spinner(&format!("probing {}...", interpreter.display())))
    };
    let donor = match DonorInstallation::probe(&interpreter) {
        Ok(d) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("python{} at {}", d.version, d.prefix.display()));
            }
            d
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "donor probe failed");
            }
            return Ok(fail(&CoreError::from(e)));
        }
    };

    let mut templates = TemplateStore::builtin();
    if let Some(dir) = &config.templates_dir {
        templates = templates.with_override_dir(dir).map_err(|e| e.to_string())?;
    }
    let bootstrap = templates
        .get(INSTALLER_BOOTSTRAP)
        .map_err(|e| e.to_string())?
        .to_owned();

    let mut builder = EnvironmentBuilder::new(donor, templates, log);
    if install_setuptools {
        let search_dirs = if config.installer_search_dirs.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            config.installer_search_dirs.clone()
        };
        builder = builder.with_installer(SetuptoolsInstaller::new(bootstrap, search_dirs));
    }

    let report = match builder.build(dest, options) {
        Ok(r) => r,
        Err(e) => return Ok(fail(&e)),
    };
    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        log.info(format!(
            "Environment {} ready ({} filesystem changes)",
            report.root.display(),
            report.stats.mutations()
        ));
    }
    Ok(EXIT_SUCCESS)
}
