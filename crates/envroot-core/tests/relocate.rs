#![cfg(unix)]

mod common;

use common::{FakeDonor, VERSION};
use envroot_config::TemplateStore;
use envroot_core::{relocate_environment, BuildOptions, CoreError, EnvironmentBuilder};
use envroot_fs::{Level, ProgressLogger, SharedBuffer};
use std::fs;
use std::path::{Path, PathBuf};

fn site(root: &Path) -> PathBuf {
    root.join(format!("lib/python{VERSION}/site-packages"))
}

/// A built environment with one installed script, a mixed `.pth` file and a
/// development link record.
fn populated_env(donor: &FakeDonor, root: &Path) {
    let log = ProgressLogger::silent();
    EnvironmentBuilder::new(donor.probe(), TemplateStore::builtin(), &log)
        .build(root, BuildOptions::default())
        .unwrap();

    let project = root.join("src/project");
    fs::create_dir_all(&project).unwrap();
    fs::create_dir_all(root.join("lib/shared")).unwrap();
    fs::write(
        root.join("bin/easy_install"),
        format!(
            "#!{}/bin/python\n# EASY-INSTALL-ENTRY-SCRIPT\nimport sys\nsys.exit(main())\n",
            root.display()
        ),
    )
    .unwrap();
    fs::write(
        site(root).join("project.pth"),
        format!(
            "# development checkouts\n../../shared\n{}\n",
            project.display()
        ),
    )
    .unwrap();
    fs::write(
        site(root).join("project.egg-link"),
        format!("{}\n.", project.display()),
    )
    .unwrap();
}

#[test]
fn relocation_rewrites_only_absolute_references() {
    let donor = FakeDonor::new();
    let target = tempfile::tempdir().unwrap();
    let root = target.path().join("env");
    populated_env(&donor, &root);

    let log = ProgressLogger::silent();
    let report = relocate_environment(&root, &log).unwrap();

    assert_eq!(report.scripts_rewritten, vec![root.join("bin/easy_install")]);
    assert_eq!(report.path_files_rewritten, vec![site(&root).join("project.pth")]);
    assert_eq!(report.link_records_rewritten, vec![site(&root).join("project.egg-link")]);
    assert!(report
        .scripts_skipped
        .contains(&root.join(format!("bin/python{VERSION}"))));

    let script = fs::read_to_string(root.join("bin/easy_install")).unwrap();
    let lines: Vec<&str> = script.lines().collect();
    assert_eq!(lines[0], format!("#!/usr/bin/env python{VERSION}"));
    assert!(lines[1].contains("activate_this.py"));
    assert_eq!(&lines[2..], ["# EASY-INSTALL-ENTRY-SCRIPT", "import sys", "sys.exit(main())"]);

    assert_eq!(
        fs::read_to_string(site(&root).join("project.pth")).unwrap(),
        "# development checkouts\n../../shared\n../../../src/project\n"
    );
    assert_eq!(
        fs::read_to_string(site(&root).join("project.egg-link")).unwrap(),
        "../../../src/project"
    );
}

#[test]
fn second_relocation_is_a_no_op() {
    let donor = FakeDonor::new();
    let target = tempfile::tempdir().unwrap();
    let root = target.path().join("env");
    populated_env(&donor, &root);

    let log = ProgressLogger::silent();
    relocate_environment(&root, &log).unwrap();
    let script = fs::read(root.join("bin/easy_install")).unwrap();

    let buf = SharedBuffer::new();
    let log = ProgressLogger::new(Level::Info, buf.clone());
    let again = relocate_environment(&root, &log).unwrap();
    assert_eq!(again.changes(), 0, "{again:?}");
    assert_eq!(again.scripts_already_relocated, vec![root.join("bin/easy_install")]);
    assert_eq!(fs::read(root.join("bin/easy_install")).unwrap(), script);
    assert!(buf.contents().contains("No changes to .pth file"));
}

#[test]
fn relocated_paths_resolve_after_moving_the_tree() {
    let donor = FakeDonor::new();
    let target = tempfile::tempdir().unwrap();
    let root = target.path().join("env");
    populated_env(&donor, &root);
    relocate_environment(&root, &ProgressLogger::silent()).unwrap();

    let moved = target.path().join("moved");
    fs::rename(&root, &moved).unwrap();

    let pth = fs::read_to_string(site(&moved).join("project.pth")).unwrap();
    for line in pth.lines().filter(|l| !l.starts_with('#')) {
        let resolved = fs::canonicalize(site(&moved).join(line)).unwrap();
        assert!(resolved.starts_with(fs::canonicalize(&moved).unwrap()), "{line}");
    }
    let link = fs::read_to_string(site(&moved).join("project.egg-link")).unwrap();
    assert_eq!(
        fs::canonicalize(site(&moved).join(link)).unwrap(),
        fs::canonicalize(moved.join("src/project")).unwrap()
    );

    // Nothing left to rewrite at the new location either.
    let report = relocate_environment(&moved, &ProgressLogger::silent()).unwrap();
    assert_eq!(report.changes(), 0);
}

#[test]
fn missing_activation_helper_is_rejected() {
    let donor = FakeDonor::new();
    let target = tempfile::tempdir().unwrap();
    let root = target.path().join("env");
    populated_env(&donor, &root);
    fs::remove_file(root.join("bin/activate_this.py")).unwrap();

    let buf = SharedBuffer::new();
    let log = ProgressLogger::new(Level::Notify, buf.clone());
    let err = relocate_environment(&root, &log).unwrap_err();
    match err {
        CoreError::InvalidEnvironment { missing } => {
            assert_eq!(missing, root.join("bin/activate_this.py"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(buf.contents().contains("please re-run the build"));
    // Nothing was touched.
    assert!(fs::read_to_string(root.join("bin/easy_install"))
        .unwrap()
        .starts_with(&format!("#!{}", root.display())));
}

#[test]
fn unusable_launcher_falls_back_to_library_dirs() {
    let donor = FakeDonor::new();
    let target = tempfile::tempdir().unwrap();
    let root = target.path().join("env");
    populated_env(&donor, &root);
    fs::remove_file(root.join("bin/python")).unwrap();

    let buf = SharedBuffer::new();
    let log = ProgressLogger::new(Level::Info, buf.clone());
    let report = relocate_environment(&root, &log).unwrap();
    assert!(buf.contents().contains("using the library directories"));
    assert_eq!(report.path_files_rewritten, vec![site(&root).join("project.pth")]);
    assert_eq!(report.link_records_rewritten.len(), 1);
}
