use crate::lifecycle::{validate_transition, BuildStage};
use crate::skeleton;
use crate::CoreError;
use envroot_config::templates::{DISTUTILS_CFG, DISTUTILS_INIT, SITE_SHIM};
use envroot_config::{Placeholders, TemplateStore};
use envroot_fs::{
    normalize, same_contents, EnvironmentLayout, FileMaterializer, MaterializeStats,
    OverwritePolicy, PlatformFamily, ProgressLogger,
};
use envroot_runtime::interpreter::PREFIX_PROGRAM;
use envroot_runtime::{
    check_host_environment, probe_prefix, DonorInstallation, HostIssue, InstallOptions,
    NoopInstaller, PackageInstaller, Severity,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Delete the library directory before building.
    pub clear: bool,
    /// Leave the donor's third-party packages importable.
    pub include_global_packages: bool,
    /// Symlink skeleton modules instead of copying them.
    pub symlink: bool,
    pub unzip_setuptools: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            clear: false,
            include_global_packages: true,
            symlink: true,
            unzip_setuptools: false,
        }
    }
}

pub type AdjustOptionsHook = Box<dyn Fn(&mut BuildOptions)>;
pub type AfterInstallHook = Box<dyn Fn(&BuildReport) -> Result<(), CoreError>>;

/// Caller-supplied extension points, fixed when the builder is constructed.
#[derive(Default)]
pub struct BuildHooks {
    /// Runs before the layout is computed and may rewrite the options.
    pub adjust_options: Option<AdjustOptionsHook>,
    /// Runs once the build is complete; an error fails the build.
    pub after_install: Option<AfterInstallHook>,
}

impl fmt::Debug for BuildHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildHooks")
            .field("adjust_options", &self.adjust_options.is_some())
            .field("after_install", &self.after_install.is_some())
            .finish()
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub root: PathBuf,
    pub layout: EnvironmentLayout,
    pub launcher: PathBuf,
    pub donor_prefix: PathBuf,
    pub stages: Vec<BuildStage>,
    /// Filesystem mutations the build performed; zero on an untouched rebuild.
    pub stats: MaterializeStats,
}

/// Materializes an environment from a donor interpreter installation.
///
/// The build runs the stages of [`BuildStage`] in order. Nothing is rolled
/// back on failure: every step is idempotent, so building the same root again
/// resumes where the failed run stopped.
pub struct EnvironmentBuilder<'a> {
    donor: DonorInstallation,
    templates: TemplateStore,
    installer: Box<dyn PackageInstaller + 'a>,
    hooks: BuildHooks,
    log: &'a ProgressLogger,
    stage: BuildStage,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(donor: DonorInstallation, templates: TemplateStore, log: &'a ProgressLogger) -> Self {
        Self {
            donor,
            templates,
            installer: Box::new(NoopInstaller),
            hooks: BuildHooks::default(),
            log,
            stage: BuildStage::Uninitialized,
        }
    }

    #[must_use]
    pub fn with_installer(mut self, installer: impl PackageInstaller + 'a) -> Self {
        self.installer = Box::new(installer);
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: BuildHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn donor(&self) -> &DonorInstallation {
        &self.donor
    }

    /// Last stage reached; after a failed build, the stage that completed last.
    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn build(&mut self, root: &Path, options: BuildOptions) -> Result<BuildReport, CoreError> {
        let mut options = options;
        if let Some(adjust) = &self.hooks.adjust_options {
            adjust(&mut options);
            debug!("build options after hook: {options:?}");
        }

        self.stage = BuildStage::Uninitialized;
        let mut stages = vec![self.stage];
        let layout = EnvironmentLayout::new(root, self.donor.family(), &self.donor.version);
        self.check_preconditions(&layout, &check_host_environment())?;
        if let Some(real) = &self.donor.real_prefix {
            self.log
                .notify(format!("Using real prefix {:?}", real.display().to_string()));
        }

        let fm = FileMaterializer::new(self.log);

        if options.clear {
            fm.remove_tree(layout.library_dir())?;
            self.log.notify(format!(
                "Not deleting {}",
                layout.executable_dir().display()
            ));
        }
        self.advance(BuildStage::LayoutComputed, &mut stages)?;

        self.copy_skeleton(&fm, &layout, &options)?;
        self.advance(BuildStage::SkeletonCopied, &mut stages)?;

        self.write_shim(&fm, &layout, &options)?;
        self.advance(BuildStage::ShimWritten, &mut stages)?;

        let launcher = self.install_executable(&fm, &layout)?;
        self.advance(BuildStage::ExecutableInstalled, &mut stages)?;

        let install_options = InstallOptions {
            unzip: options.unzip_setuptools,
            python_version: self.donor.version.clone(),
            working_dir: installer_working_dir(),
            extra_env: BTreeMap::new(),
        };
        debug!("running installer {}", self.installer.name());
        self.installer.install(&launcher, &install_options, self.log)?;
        self.advance(BuildStage::AuxPackagesInstalled, &mut stages)?;

        self.write_activation(&fm, &layout)?;
        self.advance(BuildStage::ActivationWritten, &mut stages)?;

        self.advance(BuildStage::Complete, &mut stages)?;
        let report = BuildReport {
            root: layout.root().to_path_buf(),
            donor_prefix: self.donor.effective_prefix().to_path_buf(),
            layout,
            launcher,
            stages,
            stats: fm.stats(),
        };
        if let Some(after) = &self.hooks.after_install {
            after(&report)?;
        }
        Ok(report)
    }

    /// Refuse to build when the host or the donor makes the result unusable.
    pub fn check_preconditions(
        &self,
        layout: &EnvironmentLayout,
        issues: &[HostIssue],
    ) -> Result<(), CoreError> {
        for issue in issues {
            match issue.severity {
                Severity::Fatal => {
                    self.log
                        .fatal(format!("ERROR: {} is set: {}", issue.variable, issue.hint));
                    return Err(CoreError::ConflictingEnvironment(issue.variable.to_owned()));
                }
                Severity::Warning => self
                    .log
                    .warn(format!("{} is set; {}", issue.variable, issue.hint)),
            }
        }

        for candidate in [&self.donor.interpreter, &self.donor.executable] {
            if candidate.as_os_str().is_empty() {
                continue;
            }
            if normalize(candidate).starts_with(layout.executable_dir()) {
                self.log.fatal(format!(
                    "ERROR: {} is inside the environment being built; use the system interpreter",
                    candidate.display()
                ));
                return Err(CoreError::DonorInsideEnvironment(candidate.clone()));
            }
        }
        Ok(())
    }

    fn advance(&mut self, to: BuildStage, stages: &mut Vec<BuildStage>) -> Result<(), CoreError> {
        validate_transition(self.stage, to)?;
        debug!("build stage {} -> {to}", self.stage);
        self.stage = to;
        stages.push(to);
        Ok(())
    }

    fn copy_skeleton(
        &self,
        fm: &FileMaterializer<'_>,
        layout: &EnvironmentLayout,
        options: &BuildOptions,
    ) -> Result<(), CoreError> {
        let donor = &self.donor;
        let prefix = donor.effective_prefix();
        fm.ensure_dir(layout.library_dir())?;

        let modules = skeleton::required_modules(donor.version_tuple());
        for stdlib in skeleton::stdlib_roots(donor) {
            if !stdlib.is_dir() {
                debug!("no stdlib directory {}", stdlib.display());
                continue;
            }
            self.log.info(if options.symlink {
                "Symlinking bootstrap modules"
            } else {
                "Copying bootstrap modules"
            });
            let _indent = self.log.indent(2);
            for name in sorted_entries(&stdlib)? {
                if skeleton::is_bootstrap_entry(&name, &modules) {
                    fm.ensure_linked(
                        &stdlib.join(&name),
                        &layout.library_dir().join(&name),
                        options.symlink,
                    )?;
                }
            }
        }
        fm.ensure_dir(&layout.site_packages_dir())?;

        if layout.family() == PlatformFamily::Posix && donor.uses_lib64 {
            fm.ensure_alias(Path::new("lib"), &layout.root().join("lib64"))?;
        }

        let include = prefix.join("include").join(donor.py_version());
        if include.exists() {
            fm.ensure_linked(&include, layout.include_dir(), options.symlink)?;
        } else {
            self.log
                .debug(format!("No include dir {}", include.display()));
        }

        if donor.exec_prefix != donor.prefix {
            let exec_dir = skeleton::exec_prefix_library(donor);
            if exec_dir.is_dir() {
                for name in sorted_entries(&exec_dir)? {
                    fm.ensure_linked(
                        &exec_dir.join(&name),
                        &layout.library_dir().join(&name),
                        options.symlink,
                    )?;
                }
            } else {
                self.log.warn(format!(
                    "Exec prefix library {} does not exist",
                    exec_dir.display()
                ));
            }
        }

        if layout.family() == PlatformFamily::Alternate {
            for name in ["jython-dev.jar", "javalib", "jython.jar"] {
                let src = prefix.join(name);
                if src.exists() {
                    fm.ensure_linked(&src, &layout.root().join(name), options.symlink)?;
                }
            }
            // Written to at runtime, so these must be private copies.
            for name in ["registry", "cachedir"] {
                let src = prefix.join(name);
                if src.exists() {
                    fm.ensure_linked(&src, &layout.root().join(name), false)?;
                }
            }
        }
        Ok(())
    }

    fn write_shim(
        &self,
        fm: &FileMaterializer<'_>,
        layout: &EnvironmentLayout,
        options: &BuildOptions,
    ) -> Result<(), CoreError> {
        fm.write_text(
            &layout.shim_file(),
            self.templates.get(SITE_SHIM)?,
            OverwritePolicy::Always,
        )?;
        fm.write_text(
            &layout.orig_prefix_file(),
            self.donor.effective_prefix().to_string_lossy().as_bytes(),
            OverwritePolicy::Always,
        )?;

        let marker = layout.site_marker_file();
        if options.include_global_packages {
            fm.remove_file(&marker)?;
        } else {
            fm.write_text(&marker, "", OverwritePolicy::Always)?;
        }

        let distutils = layout.distutils_dir();
        fm.ensure_dir(&distutils)?;
        fm.write_text(
            &distutils.join("__init__.py"),
            self.templates.get(DISTUTILS_INIT)?,
            OverwritePolicy::Always,
        )?;
        fm.write_text(
            &distutils.join("distutils.cfg"),
            self.templates.get(DISTUTILS_CFG)?,
            OverwritePolicy::Preserve,
        )?;
        Ok(())
    }

    fn install_executable(
        &self,
        fm: &FileMaterializer<'_>,
        layout: &EnvironmentLayout,
    ) -> Result<PathBuf, CoreError> {
        let donor = &self.donor;
        let family = layout.family();
        let bin = layout.executable_dir();
        fm.ensure_dir(bin)?;

        let mut source = donor.executable.clone();
        if donor.is_cygwin() {
            let with_exe = PathBuf::from(format!("{}.exe", source.display()));
            if with_exe.exists() {
                source = with_exe;
            }
        }
        let mut name = source
            .file_name()
            .map_or_else(|| family.expected_exe().to_owned(), |n| n.to_string_lossy().into_owned());
        let suffix = family.exe_suffix();
        if !suffix.is_empty() && !name.to_lowercase().ends_with(suffix) {
            name.push_str(suffix);
        }
        let launcher = bin.join(&name);

        if donor.framework {
            self.log.warn(format!(
                "{} is a framework build; the launcher is not re-linked and still loads the donor framework",
                donor.executable.display()
            ));
        }

        self.log.notify(format!(
            "New {} executable in {}",
            family.expected_exe(),
            launcher.display()
        ));
        if normalize(&source) != launcher {
            fm.ensure_copied(&source, &launcher)?;
            fm.make_executable(&launcher)?;
            if family == PlatformFamily::Windows || donor.is_cygwin() {
                if let Some(dir) = source.parent() {
                    let pythonw = dir.join("pythonw.exe");
                    if pythonw.exists() {
                        fm.ensure_copied(&pythonw, &bin.join("pythonw.exe"))?;
                    }
                }
            }
        }

        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if stem != family.expected_exe() {
            let ext = if name.to_lowercase().ends_with(".exe") { ".exe" } else { "" };
            let secondary = bin.join(format!("{}{ext}", family.expected_exe()));
            if !secondary.exists() {
                self.log.notify(format!(
                    "Also creating executable in {}",
                    secondary.display()
                ));
                fm.ensure_copied(&source, &secondary)?;
                fm.make_executable(&secondary)?;
            } else if same_contents(&source, &secondary)? {
                self.log
                    .debug(format!("{} already in place", secondary.display()));
            } else {
                self.log.warn(format!(
                    "Not overwriting existing {} script {} (you must use {})",
                    family.expected_exe(),
                    secondary.display(),
                    launcher.display()
                ));
            }
        }

        self.verify_executable(layout, &launcher)?;

        if let Some(home) = std::env::var_os("HOME") {
            let pydistutils = PathBuf::from(home).join(".pydistutils.cfg");
            if pydistutils.exists() {
                self.log.notify(format!(
                    "Please make sure you remove any previous custom paths from your {} file.",
                    pydistutils.display()
                ));
            }
        }
        Ok(launcher)
    }

    /// Run the installed launcher and check it resolves its prefix to the root.
    fn verify_executable(&self, layout: &EnvironmentLayout, launcher: &Path) -> Result<(), CoreError> {
        self.log.info(format!(
            "Testing executable with {} -c {PREFIX_PROGRAM:?}",
            launcher.display()
        ));
        let reported = match probe_prefix(launcher) {
            Ok(reported) => reported,
            Err(e) => {
                self.log
                    .fatal(format!("ERROR: could not run {}: {e}", launcher.display()));
                return Err(e.into());
            }
        };

        let family = layout.family();
        let actual = family.normcase(&normalize(Path::new(&reported)).to_string_lossy());
        let expected = layout.normalized_root();
        if actual != expected {
            self.log.fatal(format!(
                "ERROR: The executable {} is not functioning",
                launcher.display()
            ));
            self.log.fatal(format!(
                "ERROR: It thinks sys.prefix is {actual:?} (should be {expected:?})"
            ));
            self.log
                .fatal("ERROR: envroot is not compatible with this system or executable");
            return Err(CoreError::NonFunctionalExecutable {
                executable: launcher.to_path_buf(),
                reported: actual,
                expected,
            });
        }
        self.log.info(format!("Got sys.prefix result: {actual:?}"));
        Ok(())
    }

    fn write_activation(
        &self,
        fm: &FileMaterializer<'_>,
        layout: &EnvironmentLayout,
    ) -> Result<(), CoreError> {
        let root = layout.root().to_string_lossy();
        let name = layout.root_name();
        let values = Placeholders {
            root: &root,
            name: &name,
            bin_name: layout.executable_dir_name(),
        };
        for file in layout.family().activation_files() {
            let body = self.templates.render(file.template, &values)?;
            fm.write_text(
                &layout.executable_dir().join(file.file_name),
                body,
                OverwritePolicy::Always,
            )?;
        }
        Ok(())
    }
}

/// `None` keeps the current directory; an unwritable one falls back to the temp dir.
fn installer_working_dir() -> Option<PathBuf> {
    let writable = std::env::current_dir()
        .ok()
        .is_some_and(|dir| tempfile::tempfile_in(dir).is_ok());
    if writable {
        None
    } else {
        let fallback = std::env::temp_dir();
        debug!("current directory not writable; installer runs in {}", fallback.display());
        Some(fallback)
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<String>, CoreError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use envroot_fs::{Level, SharedBuffer};

    fn donor(executable: &str) -> DonorInstallation {
        DonorInstallation {
            interpreter: PathBuf::from(executable),
            executable: PathBuf::from(executable),
            prefix: PathBuf::from("/usr"),
            exec_prefix: PathBuf::from("/usr"),
            real_prefix: None,
            version: "2.6".to_owned(),
            platform: "linux2".to_owned(),
            implementation: "cpython".to_owned(),
            stdlib_dir: PathBuf::from("/usr/lib/python2.6"),
            uses_lib64: false,
            framework: false,
        }
    }

    fn layout() -> EnvironmentLayout {
        EnvironmentLayout::new("/srv/env", PlatformFamily::Posix, "2.6")
    }

    #[test]
    fn default_options() {
        let options = BuildOptions::default();
        assert!(options.include_global_packages);
        assert!(options.symlink);
        assert!(!options.clear);
        assert!(!options.unzip_setuptools);
    }

    #[test]
    fn conflicting_environment_is_fatal() {
        let buf = SharedBuffer::new();
        let log = ProgressLogger::new(Level::Notify, buf.clone());
        let builder = EnvironmentBuilder::new(donor("/usr/bin/python2.6"), TemplateStore::builtin(), &log);
        let issues = envroot_runtime::check_host_environment_with(|name| {
            (name == "WORKING_ENV").then(|| "1".into())
        });

        let err = builder.check_preconditions(&layout(), &issues).unwrap_err();
        assert!(matches!(err, CoreError::ConflictingEnvironment(ref v) if v == "WORKING_ENV"));
        assert!(buf.contents().contains("ERROR: WORKING_ENV is set"));
    }

    #[test]
    fn pythonhome_only_warns() {
        let buf = SharedBuffer::new();
        let log = ProgressLogger::new(Level::Notify, buf.clone());
        let builder = EnvironmentBuilder::new(donor("/usr/bin/python2.6"), TemplateStore::builtin(), &log);
        let issues = envroot_runtime::check_host_environment_with(|name| {
            (name == "PYTHONHOME").then(|| "/opt".into())
        });

        builder.check_preconditions(&layout(), &issues).unwrap();
        assert!(buf.contents().contains("PYTHONHOME is set"));
    }

    #[test]
    fn donor_inside_target_is_rejected() {
        let log = ProgressLogger::silent();
        let builder = EnvironmentBuilder::new(donor("/srv/env/bin/python"), TemplateStore::builtin(), &log);
        let err = builder.check_preconditions(&layout(), &[]).unwrap_err();
        assert!(matches!(err, CoreError::DonorInsideEnvironment(_)));
    }

    #[test]
    fn donor_elsewhere_is_accepted() {
        let log = ProgressLogger::silent();
        let builder = EnvironmentBuilder::new(donor("/srv/envy/bin/python"), TemplateStore::builtin(), &log);
        builder.check_preconditions(&layout(), &[]).unwrap();
        assert_eq!(builder.stage(), BuildStage::Uninitialized);
    }

    #[test]
    fn hooks_debug_shows_presence() {
        let hooks = BuildHooks {
            adjust_options: Some(Box::new(|o: &mut BuildOptions| o.symlink = false)),
            after_install: None,
        };
        assert_eq!(
            format!("{hooks:?}"),
            "BuildHooks { adjust_options: true, after_install: false }"
        );
    }

    #[test]
    fn entries_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["re.py", "os.py", "encodings"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(sorted_entries(dir.path()).unwrap(), vec!["encodings", "os.py", "re.py"]);
    }
}
