#![allow(dead_code)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Points HOME at a fresh temp dir until dropped.
pub struct TestHome {
    dir: TempDir,
    saved: Option<OsString>,
}

impl TestHome {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for TestHome {
    fn drop(&mut self) {
        match self.saved.take() {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }
    }
}

pub fn ensure_test_home() -> TestHome {
    let dir = tempfile::tempdir().expect("create temp home");
    let saved = std::env::var_os("HOME");
    std::env::set_var("HOME", dir.path());
    TestHome { dir, saved }
}

pub fn read_json(path: &Path) -> serde_json::Value {
    chi_tui_lib::read_json_file(path).expect("read json file")
}

/// Writes an executable shell script standing in for the chi-llm CLI.
#[cfg(unix)]
pub fn fake_authority(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("chi-llm");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake authority");
    let mut perms = std::fs::metadata(&path).expect("stat").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}
