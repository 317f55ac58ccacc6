use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn zxsync(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("zxsync");
    cmd.current_dir(home)
        .env("ZXSYNC_HOME", home)
        .env("ZXSYNC_CONFIG_PATH", home.join("zxsync.toml"));
    cmd
}

#[test]
fn sync_adds_and_updates_without_deleting() {
    let tmp = tempdir().expect("tempdir");
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(source.join("lib")).expect("mkdir source");
    fs::create_dir_all(dest.join("lib")).expect("mkdir dest");
    fs::write(source.join("lib").join("a.so"), b"Y").expect("write a");
    fs::write(source.join("lib").join("b.so"), b"Z").expect("write b");
    fs::write(dest.join("lib").join("a.so"), b"X").expect("write old a");
    fs::write(dest.join("lib").join("old.so"), b"O").expect("write old");

    zxsync(tmp.path())
        .arg("sync")
        .arg(&source)
        .arg(&dest)
        .assert()
        .success()
        .stdout(contains("update=lib/a.so"))
        .stdout(contains("create=lib/b.so"));

    assert_eq!(fs::read(dest.join("lib").join("a.so")).expect("a"), b"Y");
    assert_eq!(fs::read(dest.join("lib").join("old.so")).expect("old"), b"O");
}

#[test]
fn decode_recovers_gbk_bytes() {
    let tmp = tempdir().expect("tempdir");
    zxsync(tmp.path())
        .args(["decode", "--hex", "c4e3bac32e747874"])
        .assert()
        .success()
        .stdout(contains("path=你好.txt"));
}

#[test]
fn decode_rejects_traversal() {
    let tmp = tempdir().expect("tempdir");
    zxsync(tmp.path())
        .args(["decode", "--utf8-flag", "../../etc/passwd"])
        .assert()
        .failure()
        .stdout(contains("E002_TRAVERSAL"));
}

#[test]
fn status_reports_layout_as_json() {
    let tmp = tempdir().expect("tempdir");
    zxsync(tmp.path())
        .args(["--json", "status"])
        .assert()
        .success()
        .stdout(contains("\"command\": \"status\""))
        .stdout(contains("marker=none"))
        .stdout(contains("lock=free"));
}

#[test]
fn status_lists_variables_read_by_config_and_paths() {
    let tmp = tempdir().expect("tempdir");
    zxsync(tmp.path())
        .env("ZXSYNC_KEEP_ARCHIVES", "3")
        .arg("status")
        .assert()
        .success()
        .stdout(contains("env.recognised=18"))
        .stdout(contains("ZXSYNC_HOME"))
        .stdout(contains("ZXSYNC_KEEP_ARCHIVES"))
        .stdout(contains("ZXSYNC_WARN").not());
}
