use predicates::str::contains;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    let stamp = zip::DateTime::from_date_and_time(2024, 3, 1, 12, 30, 44).expect("dos time");
    let opts = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .last_modified_time(stamp);
    for (name, data) in entries {
        zip.start_file(*name, opts).expect("start file");
        zip.write_all(data).expect("write entry");
    }
    zip.finish().expect("finish zip");
}

fn zxsync(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("zxsync");
    cmd.current_dir(home)
        .env("ZXSYNC_HOME", home)
        .env("ZXSYNC_CONFIG_PATH", home.join("zxsync.toml"))
        .env("ZXSYNC_TIMEZONE", "UTC")
        .env("ZXSYNC_NOTIFY_ENABLED", "false");
    cmd
}

#[test]
fn ingest_publishes_then_reports_already_published() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let inbox = home.join("inbox");
    fs::create_dir_all(&inbox).expect("mkdir inbox");
    build_zip(
        &inbox.join("真心20240301.zip"),
        &[("data/readme.txt", b"readme"), ("data/config.json", b"{}")],
    );

    zxsync(home)
        .arg("ingest")
        .assert()
        .success()
        .stdout(contains("status=published"))
        .stdout(contains("version=20240301"))
        .stdout(contains("sync.create=data/readme.txt"));

    let published = home.join("zx_updated_files").join("data").join("readme.txt");
    assert_eq!(fs::read(&published).expect("published file"), b"readme");
    let mtime = fs::metadata(&published)
        .expect("metadata")
        .modified()
        .expect("mtime");
    let expected = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_709_296_244);
    assert_eq!(mtime, expected);
    assert!(home.join("state").join("last_ingested.json").exists());

    zxsync(home)
        .arg("ingest")
        .assert()
        .success()
        .stdout(contains("status=already_published"));

    let audit = fs::read_to_string(home.join("logs").join("audit.log")).expect("audit log");
    assert!(audit.contains("\"phase\":\"marker\""));
    assert!(audit.contains("already published"));
}

#[test]
fn traversal_archive_fails_without_publishing() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let inbox = home.join("inbox");
    fs::create_dir_all(&inbox).expect("mkdir inbox");
    build_zip(
        &inbox.join("真心20240302.zip"),
        &[
            ("data/readme.txt", b"r"),
            ("data/config.json", b"{}"),
            ("../escape.txt", b"x"),
        ],
    );

    zxsync(home)
        .arg("ingest")
        .assert()
        .failure()
        .stdout(contains("status=failed"))
        .stderr(contains("ZXSYNC_WARN code=E002_TRAVERSAL"));

    assert!(home.join("zxdown").join("data").join("readme.txt").exists());
    assert!(!home.join("zx_updated_files").exists());
    assert!(!home.join("escape.txt").exists());
    assert!(!home.join("state").join("last_ingested.json").exists());
}

#[test]
fn watch_once_with_empty_inbox_is_a_no_op() {
    let tmp = tempdir().expect("tempdir");
    zxsync(tmp.path())
        .args(["watch", "--once"])
        .assert()
        .success()
        .stdout(contains("archive=none"));
}

#[test]
fn ingest_prunes_old_archives_but_keeps_the_ingested_one() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let inbox = home.join("inbox");
    fs::create_dir_all(&inbox).expect("mkdir inbox");
    for day in ["20240101", "20240201", "20240301"] {
        build_zip(&inbox.join(format!("真心{day}.zip")), &[("a.txt", day.as_bytes())]);
    }

    zxsync(home)
        .env("ZXSYNC_KEEP_ARCHIVES", "1")
        .arg("ingest")
        .assert()
        .success();

    assert!(inbox.join("真心20240301.zip").exists());
    let remaining = fs::read_dir(&inbox).expect("read inbox").count();
    assert_eq!(remaining, 1);
    assert_eq!(
        fs::read(home.join("zx_updated_files").join("a.txt")).expect("published"),
        b"20240301"
    );
}
