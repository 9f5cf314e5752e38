use crate::CoreError;
use envroot_fs::{is_normalized_absolute, normalize, relative, EnvironmentLayout, ProgressLogger};
use envroot_runtime::probe_search_path;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What one relocation pass did, per artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelocationReport {
    pub scripts_rewritten: Vec<PathBuf>,
    pub scripts_already_relocated: Vec<PathBuf>,
    pub scripts_skipped: Vec<PathBuf>,
    pub path_files_rewritten: Vec<PathBuf>,
    pub link_records_rewritten: Vec<PathBuf>,
    pub unwritable: Vec<PathBuf>,
}

impl RelocationReport {
    pub fn changes(&self) -> usize {
        self.scripts_rewritten.len() + self.path_files_rewritten.len() + self.link_records_rewritten.len()
    }
}

/// Rewrites the absolute self-references of a built environment so the tree
/// keeps working after it is moved.
#[derive(Debug)]
pub struct Relocator<'a> {
    layout: EnvironmentLayout,
    log: &'a ProgressLogger,
    search_path: Vec<PathBuf>,
}

impl<'a> Relocator<'a> {
    /// Fails unless the environment has its in-process activation helper,
    /// which relocated scripts depend on.
    pub fn new(layout: EnvironmentLayout, log: &'a ProgressLogger) -> Result<Self, CoreError> {
        let helper = layout.activate_this_file();
        if !helper.is_file() {
            log.fatal(format!(
                "The environment doesn't have a file {} -- please re-run the build on this environment to update it",
                helper.display()
            ));
            return Err(CoreError::InvalidEnvironment { missing: helper });
        }
        let search_path = vec![layout.library_dir().to_path_buf(), layout.site_packages_dir()];
        Ok(Self {
            layout,
            log,
            search_path,
        })
    }

    /// Directories scanned for path-list and link-record files.
    #[must_use]
    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn layout(&self) -> &EnvironmentLayout {
        &self.layout
    }

    pub fn relocate(&self) -> Result<RelocationReport, CoreError> {
        let mut report = RelocationReport::default();
        self.relocate_scripts(&mut report)?;
        self.relocate_path_artifacts(&mut report)?;
        Ok(report)
    }

    /// Interpreter line every unrelocated launcher script starts with.
    pub fn canonical_shebang(&self) -> String {
        let python = self
            .layout
            .executable_dir()
            .join(self.layout.family().expected_exe());
        format!(
            "#!{}",
            self.layout.family().normcase(&python.to_string_lossy())
        )
    }

    /// Interpreter line of a relocated script.
    pub fn generic_shebang(&self) -> String {
        format!("#!/usr/bin/env python{}", self.layout.version())
    }

    /// Scripts the build itself owns; they are absolute by nature.
    pub fn is_core_launcher(&self, name: &str) -> bool {
        let version = self.layout.version();
        let major = version.split('.').next().unwrap_or_default();
        [
            "python".to_owned(),
            format!("python{version}"),
            format!("python{major}"),
            "python.exe".to_owned(),
            "pythonw.exe".to_owned(),
            "activate".to_owned(),
            "activate.bat".to_owned(),
            "deactivate.bat".to_owned(),
            "activate_this.py".to_owned(),
        ]
        .iter()
        .any(|n| n == name)
    }

    fn activation_line(&self, script: &Path) -> String {
        let helper = relative(script, &self.layout.activate_this_file(), false);
        format!(
            "import os; activate_this=os.path.join(os.path.dirname(os.path.abspath(__file__)), {}); \
             exec(compile(open(activate_this).read(), activate_this, 'exec'), dict(__file__=activate_this)); \
             del os, activate_this",
            python_str_literal(&helper.to_string_lossy())
        )
    }

    pub fn relocate_scripts(&self, report: &mut RelocationReport) -> Result<(), CoreError> {
        let bin = self.layout.executable_dir();
        let canonical = self.canonical_shebang();
        let generic = self.generic_shebang();
        let family = self.layout.family();

        let mut scripts = Vec::new();
        for entry in fs::read_dir(bin)? {
            let entry = entry?;
            // Symlinks and directories are not scripts we own.
            if entry.file_type()?.is_file() {
                scripts.push(entry.path());
            }
        }
        scripts.sort();

        for script in scripts {
            let bytes = fs::read(&script)?;
            if bytes.is_empty() {
                self.log
                    .warn(format!("Script {} is an empty file", script.display()));
                report.scripts_skipped.push(script);
                continue;
            }
            let (first, rest) = match bytes.iter().position(|b| *b == b'\n') {
                Some(idx) => (&bytes[..idx], &bytes[idx + 1..]),
                None => (&bytes[..], &[][..]),
            };
            let first = String::from_utf8_lossy(first);
            let first = first.trim();
            let name = script
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if !family.normcase(first).starts_with(&canonical) {
                if self.is_core_launcher(&name) {
                    self.log
                        .debug(format!("Cannot make script {} relative", script.display()));
                    report.scripts_skipped.push(script);
                } else if first == generic {
                    self.log.info(format!(
                        "Script {} has already been made relative",
                        script.display()
                    ));
                    report.scripts_already_relocated.push(script);
                } else {
                    self.log.warn(format!(
                        "Script {} cannot be made relative (it's not a normal script that starts with {canonical})",
                        script.display()
                    ));
                    report.scripts_skipped.push(script);
                }
                continue;
            }

            self.log
                .notify(format!("Making script {} relative", script.display()));
            let mut out = Vec::with_capacity(bytes.len() + 256);
            out.extend_from_slice(generic.as_bytes());
            out.push(b'\n');
            out.extend_from_slice(self.activation_line(&script).as_bytes());
            out.push(b'\n');
            out.extend_from_slice(rest);
            fs::write(&script, out)?;
            report.scripts_rewritten.push(script);
        }
        Ok(())
    }

    pub fn relocate_path_artifacts(&self, report: &mut RelocationReport) -> Result<(), CoreError> {
        let mut dirs = BTreeSet::new();
        for entry in &self.search_path {
            let dir = normalize(entry);
            if !dir.is_dir() {
                continue;
            }
            if !self.layout.contains(&dir) {
                debug!("skipping system directory {}", dir.display());
                continue;
            }
            dirs.insert(dir);
        }

        for dir in dirs {
            let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
                .map(|e| e.map(|e| e.path()))
                .collect::<Result<_, _>>()?;
            files.sort();
            for file in files {
                let kind = match file.extension().and_then(|e| e.to_str()) {
                    Some("pth") => ".pth",
                    Some("egg-link") => ".egg-link",
                    _ => continue,
                };
                if !file.is_file() {
                    continue;
                }
                if fs::metadata(&file)?.permissions().readonly() {
                    self.log.warn(format!(
                        "Cannot write {kind} file {}, skipping",
                        file.display()
                    ));
                    report.unwritable.push(file);
                    continue;
                }
                if kind == ".pth" {
                    if self.fixup_path_file(&file)? {
                        report.path_files_rewritten.push(file);
                    }
                } else if self.fixup_link_record(&file)? {
                    report.link_records_rewritten.push(file);
                }
            }
        }
        Ok(())
    }

    /// Rewrite the absolute path lines of one `.pth` file; returns whether it changed.
    ///
    /// Lines that are not valid UTF-8 are kept byte for byte.
    pub fn fixup_path_file(&self, file: &Path) -> Result<bool, CoreError> {
        let content = fs::read(file)?;
        let body = content.strip_suffix(b"\n").unwrap_or(&content[..]);
        let original: Vec<&[u8]> = if content.is_empty() {
            Vec::new()
        } else {
            body.split(|b| *b == b'\n').collect()
        };
        let mut changed = false;
        let mut lines: Vec<Vec<u8>> = Vec::with_capacity(original.len());

        for raw in original {
            let Ok(text) = std::str::from_utf8(raw) else {
                self.log.warn(format!(
                    "Keeping undecodable line in .pth file {} as is",
                    file.display()
                ));
                lines.push(raw.to_vec());
                continue;
            };
            let line = text.trim();
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with("import ")
                || !is_normalized_absolute(Path::new(line))
            {
                lines.push(line.as_bytes().to_vec());
                continue;
            }
            let rewritten = relative(file, Path::new(line), true)
                .to_string_lossy()
                .into_owned();
            if rewritten != line {
                self.log.debug(format!(
                    "Rewriting path {line} as {rewritten} (in {})",
                    file.display()
                ));
                changed = true;
            }
            lines.push(rewritten.into_bytes());
        }

        if !changed {
            self.log
                .info(format!("No changes to .pth file {}", file.display()));
            return Ok(false);
        }
        self.log.notify(format!(
            "Making paths in .pth file {} relative",
            file.display()
        ));
        let mut out = lines.join(&b'\n');
        out.push(b'\n');
        fs::write(file, out)?;
        Ok(true)
    }

    /// Rewrite the path payload of one `.egg-link` file; returns whether it changed.
    pub fn fixup_link_record(&self, file: &Path) -> Result<bool, CoreError> {
        let content = fs::read(file)?;
        let first = content.split(|b| *b == b'\n').next().unwrap_or_default();
        let Ok(link) = std::str::from_utf8(first) else {
            self.log.warn(format!(
                "Skipping {}: the link is not valid UTF-8",
                file.display()
            ));
            return Ok(false);
        };
        let link = link.trim();
        if !is_normalized_absolute(Path::new(link)) {
            self.log
                .debug(format!("Link in {} already relative", file.display()));
            return Ok(false);
        }
        let rewritten = relative(file, Path::new(link), true)
            .to_string_lossy()
            .into_owned();
        self.log.notify(format!(
            "Rewriting link {link} in {} as {rewritten}",
            file.display()
        ));
        fs::write(file, rewritten)?;
        Ok(true)
    }
}

/// Single-quoted Python string literal for `s`; non-ASCII passes through.
fn python_str_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Make the environment at `root` relocatable.
///
/// The search path is taken from the environment's own interpreter; when that
/// cannot be run, the library directory and its `site-packages` are used.
pub fn relocate_environment(root: &Path, log: &ProgressLogger) -> Result<RelocationReport, CoreError> {
    let layout = EnvironmentLayout::discover(root)?;
    let relocator = Relocator::new(layout, log)?;
    let launcher = relocator.layout().generic_launcher();
    let relocator = match probe_search_path(&launcher) {
        Ok(search_path) => relocator.with_search_path(search_path),
        Err(e) => {
            log.info(format!(
                "Could not read the search path from {} ({e}); using the library directories",
                launcher.display()
            ));
            relocator
        }
    };
    relocator.relocate()
}
