use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Modules that read `ZXSYNC_*` variables through their `env_*` helpers.
const KEY_SOURCES: &[&str] = &["src/relay/config.rs", "src/relay/paths.rs"];
const KEY_PREFIX: &str = "ZXSYNC_";

/// String literals naming a `ZXSYNC_*` variable. Every other piece of a
/// `"`-split line sits outside quotes.
fn quoted_keys(source: &str) -> impl Iterator<Item = &str> {
    source
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .flat_map(|line| line.split('"').skip(1).step_by(2))
        .filter(|literal| {
            literal.len() > KEY_PREFIX.len()
                && literal.starts_with(KEY_PREFIX)
                && literal
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
        })
}

fn recognised_keys() -> Result<BTreeSet<String>, String> {
    let mut keys = BTreeSet::new();
    for source in KEY_SOURCES {
        let content =
            fs::read_to_string(source).map_err(|err| format!("failed to read {source}: {err}"))?;
        keys.extend(quoted_keys(&content).map(str::to_string));
        println!("cargo:rerun-if-changed={source}");
    }
    if keys.is_empty() {
        return Err("no ZXSYNC_* keys found in config or paths".to_string());
    }
    Ok(keys)
}

fn render_keys(keys: &BTreeSet<String>) -> String {
    let mut out = String::from("pub const RECOGNISED_ENV_KEYS: &[&str] = &[\n");
    for key in keys {
        out.push_str(&format!("    \"{key}\",\n"));
    }
    out.push_str("];\n");
    out
}

fn main() {
    let keys = match recognised_keys() {
        Ok(keys) => keys,
        Err(err) => panic!("{err}"),
    };
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| panic!("OUT_DIR is not set"));
    let target = Path::new(&out_dir).join("zxsync_env_keys.rs");
    if let Err(err) = fs::write(&target, render_keys(&keys)) {
        panic!("failed to write {}: {err}", target.display());
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_default();
    println!("cargo:rustc-env=BUILD_UUID={version}-{stamp:x}");
    println!("cargo:rerun-if-changed=build.rs");
}
