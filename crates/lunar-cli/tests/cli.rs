//! Smoke tests driving the built `lunar` binary.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn lunar() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lunar"))
}

fn write(root: &Path, rel: &str, content: &str) -> std::path::PathBuf {
    let path = root.join(rel);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_check_clean_file_exits_zero() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "ok.lua",
        "local M = {}\nM.n = 1\nreturn M",
    );

    let out = lunar()
        .args(["--root"])
        .arg(dir.path())
        .arg("check")
        .arg(&file)
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn test_check_mismatch_exits_nonzero_and_renders() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "bad.lua",
        "local n = \"text\" -- @n number\nreturn n",
    );

    let out = lunar()
        .args(["--root"])
        .arg(dir.path())
        .arg("check")
        .arg(&file)
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("cannot assign"), "stderr: {}", stderr);
}

#[test]
fn test_check_json_format() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "bad.lua",
        "local conf = {} -- @conf {host: string}\nreturn conf.hots",
    );

    let out = lunar()
        .args(["--root"])
        .arg(dir.path())
        .arg("check")
        .arg(&file)
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let diags = &parsed[0]["diagnostics"];
    assert_eq!(diags.as_array().unwrap().len(), 1);
    assert!(diags[0]["message"].as_str().unwrap().contains("hots"));
}

#[test]
fn test_type_query() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "calc.lua",
        "-- @a number @b number @return number\n\
         local function add(a, b)\n\
         return a + b\n\
         end\n\
         local M = { add = add }\n\
         return M",
    );

    let out = lunar()
        .args(["--root"])
        .arg(dir.path())
        .arg("type")
        .arg(&file)
        .arg("M.add(1, 2)")
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "number");
}

#[test]
fn test_modules_listing() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "alpha.lua", "return {}");
    write(dir.path(), "beta.lua", "return {}");

    let out = lunar()
        .args(["--root"])
        .arg(dir.path())
        .arg("modules")
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("alpha"));
    assert!(stdout.contains("beta"));
}
