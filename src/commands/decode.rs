use anyhow::{Result, anyhow};

use crate::commands::CommandReport;
use crate::relay::decode;

#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    pub name: String,
    /// `name` is the stored byte form written as hex.
    pub hex: bool,
    pub utf8_flag: bool,
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        return Err(anyhow!("hex name must have an even number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| anyhow!("invalid hex digits at offset {i}"))
        })
        .collect()
}

pub fn run(opts: &DecodeOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("decode");

    let (raw, presented) = if opts.hex {
        let raw = parse_hex(&opts.name)?;
        let presented = String::from_utf8_lossy(&raw).into_owned();
        (raw, presented)
    } else {
        (opts.name.as_bytes().to_vec(), opts.name.clone())
    };

    let (recovered, strategy) = decode::recover_name(&raw, &presented, opts.utf8_flag);
    report.detail(format!("recovered={recovered}"));
    report.detail(format!("strategy={}", strategy.label()));
    report.detail(format!("exhausted={}", strategy.is_exhausted()));

    match decode::sanitize(&recovered) {
        Ok((_, display)) => report.detail(format!("path={display}")),
        Err(err) => report.issue(format!("{}: {err}", err.code().as_str())),
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_accepts_separators_and_prefix() {
        assert_eq!(parse_hex("0xc4e3 bac3").expect("hex"), vec![0xc4, 0xe3, 0xba, 0xc3]);
        assert_eq!(parse_hex("c4:e3").expect("hex"), vec![0xc4, 0xe3]);
        assert!(parse_hex("c4e").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn gbk_hex_name_is_recovered() {
        let report = run(&DecodeOptions {
            name: "c4e3bac32e747874".to_string(),
            hex: true,
            utf8_flag: false,
        })
        .expect("decode");
        assert!(report.ok);
        assert!(report.details.contains(&"path=你好.txt".to_string()));
        assert!(report.details.contains(&"strategy=cp437->GBK".to_string()));
    }

    #[test]
    fn traversal_name_is_an_issue() {
        let report = run(&DecodeOptions {
            name: "../../etc/passwd".to_string(),
            hex: false,
            utf8_flag: true,
        })
        .expect("decode");
        assert!(!report.ok);
        assert!(report.issues[0].starts_with("E002_TRAVERSAL"));
    }
}
