#![allow(dead_code)]

use envroot_runtime::DonorInstallation;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

pub const VERSION: &str = "3.9";

/// A throwaway donor installation whose interpreter is a shell script.
///
/// The script answers the probes envroot sends: the donor-info JSON, the
/// prefix query and the search-path query. A copy placed in an environment's
/// `bin/` reports that environment as its prefix only when the environment's
/// `orig-prefix.txt` names the donor, which is how a real interpreter behaves
/// with the site shim in place. The setuptools bootstrap succeeds unless
/// `<env>/installer-exit-code` exists, in which case it exits with that code.
pub struct FakeDonor {
    pub dir: TempDir,
    pub interpreter: PathBuf,
}

impl FakeDonor {
    pub fn new() -> Self {
        Self::build(None, "linux")
    }

    /// A donor that records a prefix its own interpreter does not recognize,
    /// so installed launchers never find their environment.
    pub fn misreporting() -> Self {
        Self::build(Some("elsewhere"), "linux")
    }

    /// A cygwin donor: POSIX layout, with `.exe` launchers next to the
    /// extensionless interpreter and a `pythonw.exe`.
    pub fn cygwin() -> Self {
        let donor = Self::build(None, "cygwin");
        let bin = donor.interpreter.parent().unwrap();
        fs::copy(&donor.interpreter, bin.join(format!("python{VERSION}.exe"))).unwrap();
        fs::write(bin.join("pythonw.exe"), "windowed\n").unwrap();
        donor
    }

    fn build(reported_subdir: Option<&str>, platform: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().to_path_buf();
        let stdlib = prefix.join(format!("lib/python{VERSION}"));
        fs::create_dir_all(stdlib.join("encodings")).unwrap();
        fs::create_dir_all(stdlib.join("lib-dynload")).unwrap();
        fs::create_dir_all(stdlib.join("site-packages")).unwrap();
        for module in ["os.py", "re.py", "codecs.py", "stat.py", "shutil.py", "site.py"] {
            fs::write(stdlib.join(module), format!("# donor {module}\n")).unwrap();
        }
        fs::write(stdlib.join("encodings/__init__.py"), "# encodings\n").unwrap();
        fs::create_dir_all(prefix.join(format!("include/python{VERSION}"))).unwrap();
        fs::write(prefix.join(format!("include/python{VERSION}/Python.h")), "/* header */\n").unwrap();

        let reported = match reported_subdir {
            Some(sub) => prefix.join(sub),
            None => prefix.clone(),
        };
        let interpreter = prefix.join(format!("bin/python{VERSION}"));
        let info = format!(
            r#"{{"executable": "{exe}", "prefix": "{rep}", "exec_prefix": "{rep}", "real_prefix": null, "version": "{VERSION}", "platform": "{platform}", "implementation": "cpython", "stdlib_dir": "{lib}", "uses_lib64": false, "framework": false}}"#,
            exe = interpreter.display(),
            rep = reported.display(),
            lib = stdlib.display(),
        );
        let script = format!(
            r#"#!/bin/sh
base=$(cd "$(dirname "$0")/.." && pwd)
donor='{donor}'
prefix="$donor"
record="$base/lib/python{VERSION}/orig-prefix.txt"
if [ -f "$record" ] && [ "$(cat "$record")" = "$donor" ]; then
    prefix="$base"
fi
case "$2" in
    *donor-info*)
        printf '%s\n' '{info}'
        ;;
    *setuptools*)
        echo "Reading bundled index"
        if [ -f "$base/installer-exit-code" ]; then
            echo "installer: cannot reach the network"
            exit "$(cat "$base/installer-exit-code")"
        fi
        echo "Installed setuptools"
        ;;
    *sys.path*)
        printf '["%s/lib/python{VERSION}", "%s/lib/python{VERSION}/site-packages", "%s/lib/python{VERSION}", ""]\n' "$prefix" "$prefix" "$donor"
        ;;
    *sys.prefix*)
        printf '%s\n' "$prefix"
        ;;
    *)
        echo "unexpected program" >&2
        exit 2
        ;;
esac
"#,
            donor = prefix.display(),
        );
        fs::create_dir_all(interpreter.parent().unwrap()).unwrap();
        fs::write(&interpreter, script).unwrap();
        fs::set_permissions(&interpreter, fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir, interpreter }
    }

    pub fn prefix(&self) -> &Path {
        self.dir.path()
    }

    pub fn probe(&self) -> DonorInstallation {
        DonorInstallation::probe(&self.interpreter).unwrap()
    }
}

/// Content fingerprint of a tree: file hashes and modes, symlink targets, directories.
pub fn tree_digest(root: &Path) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.unwrap();
        let rel = entry.path().strip_prefix(root).unwrap().display().to_string();
        let meta = entry.path().symlink_metadata().unwrap();
        let value = if meta.file_type().is_symlink() {
            format!("link:{}", fs::read_link(entry.path()).unwrap().display())
        } else if meta.is_dir() {
            "dir".to_owned()
        } else {
            let hash = blake3::hash(&fs::read(entry.path()).unwrap());
            format!("{}:{:o}", hash.to_hex(), meta.permissions().mode() & 0o7777)
        };
        out.insert(rel, value);
    }
    out
}
