//! Recovery of readable names from ZIP entries with an ambiguous encoding flag.
//!
//! Legacy archivers store names in whatever codepage the packing machine
//! used and leave the UTF-8 flag clear. Readers then render those bytes as
//! CP437. Nothing in the metadata says what the bytes really were, so the
//! decoder walks a fixed list of likely (source, target) pairs and keeps the
//! first one that yields a non-empty name, substituting U+FFFD for any byte
//! run the target cannot decode.

use crate::error::RelayError;
use encoding_rs::{BIG5, Encoding, GB18030, GBK, SHIFT_JIS, WINDOWS_1252};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStrategy {
    Utf8Flag,
    Legacy {
        source: &'static str,
        target: &'static str,
    },
    Utf8Lossy,
    Verbatim,
}

impl DecodeStrategy {
    pub fn label(self) -> String {
        match self {
            Self::Utf8Flag => "utf8-flag".to_string(),
            Self::Legacy { source, target } => format!("{source}->{target}"),
            Self::Utf8Lossy => "utf8-lossy".to_string(),
            Self::Verbatim => "verbatim".to_string(),
        }
    }

    /// True when no real decoding strategy matched and the name is a
    /// best-effort rendering.
    pub fn is_exhausted(self) -> bool {
        matches!(self, Self::Utf8Lossy | Self::Verbatim)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedName {
    /// Normalized relative path, safe to join onto an extraction root.
    pub relative: PathBuf,
    /// The same path with `/` separators, for reports.
    pub display: String,
    pub strategy: DecodeStrategy,
}

#[derive(Debug, Clone, Copy)]
enum SourceCodepage {
    /// The bytes as stored. Re-encoding a CP437 rendering gives them back
    /// unchanged, so no conversion is needed.
    Cp437,
    Encoded(&'static Encoding, &'static str),
}

impl SourceCodepage {
    fn label(self) -> &'static str {
        match self {
            Self::Cp437 => "cp437",
            Self::Encoded(_, label) => label,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LegacyPair {
    source: SourceCodepage,
    target: &'static Encoding,
}

fn legacy_pairs() -> [LegacyPair; 6] {
    [
        LegacyPair {
            source: SourceCodepage::Cp437,
            target: GBK,
        },
        LegacyPair {
            source: SourceCodepage::Cp437,
            target: BIG5,
        },
        LegacyPair {
            source: SourceCodepage::Encoded(SHIFT_JIS, "cp932"),
            target: SHIFT_JIS,
        },
        LegacyPair {
            source: SourceCodepage::Encoded(WINDOWS_1252, "iso-8859-1"),
            target: GBK,
        },
        LegacyPair {
            source: SourceCodepage::Encoded(WINDOWS_1252, "iso-8859-1"),
            target: BIG5,
        },
        LegacyPair {
            source: SourceCodepage::Encoded(GB18030, "gb18030"),
            target: GB18030,
        },
    ]
}

/// Returns `None` on a hard failure: the presented name has a character
/// the source codepage cannot represent, or the result is empty.
fn try_pair(pair: LegacyPair, raw: &[u8], presented: &str) -> Option<String> {
    let source_bytes = match pair.source {
        SourceCodepage::Cp437 => std::borrow::Cow::Borrowed(raw),
        SourceCodepage::Encoded(encoding, _) => {
            let (bytes, _, unmappable) = encoding.encode(presented);
            if unmappable {
                return None;
            }
            bytes
        }
    };
    let (text, _) = pair.target.decode_without_bom_handling(&source_bytes);
    if text.is_empty() {
        return None;
    }
    Some(text.into_owned())
}

/// Pick the best readable rendering of a stored name. Never fails.
///
/// The first pair decodes the stored bytes directly and substitutes U+FFFD
/// for anything GBK rejects, so it only fails on an empty name. In practice
/// every non-empty legacy name resolves to `cp437->GBK`, and the lossy UTF-8
/// and verbatim fallbacks (the *exhausted* strategies) are reached only when
/// the pair list changes or the name is empty.
pub fn recover_name(raw: &[u8], presented: &str, explicit_utf8: bool) -> (String, DecodeStrategy) {
    if explicit_utf8 {
        if let Ok(text) = std::str::from_utf8(raw) {
            if !text.is_empty() {
                return (text.to_string(), DecodeStrategy::Utf8Flag);
            }
        }
    }

    for pair in legacy_pairs() {
        if let Some(text) = try_pair(pair, raw, presented) {
            let strategy = DecodeStrategy::Legacy {
                source: pair.source.label(),
                target: pair.target.name(),
            };
            return (text, strategy);
        }
    }

    let lossy = String::from_utf8_lossy(raw);
    if !lossy.is_empty() {
        return (lossy.into_owned(), DecodeStrategy::Utf8Lossy);
    }

    (presented.to_string(), DecodeStrategy::Verbatim)
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Normalize a recovered name into a relative path that cannot leave the
/// extraction root.
pub fn sanitize(name: &str) -> Result<(PathBuf, String), RelayError> {
    if name.contains('\0') {
        return Err(RelayError::EntryDecode {
            entry: name.to_string(),
            reason: "name contains a NUL byte".to_string(),
        });
    }

    let unified = name.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(RelayError::PathTraversal {
            entry: name.to_string(),
            reason: "absolute path".to_string(),
        });
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(RelayError::PathTraversal {
                        entry: name.to_string(),
                        reason: "parent segment escapes the extraction root".to_string(),
                    });
                }
            }
            part => parts.push(part),
        }
    }

    if parts.is_empty() {
        return Err(RelayError::EntryDecode {
            entry: name.to_string(),
            reason: "name is empty after normalization".to_string(),
        });
    }

    let relative = parts.iter().collect::<PathBuf>();
    Ok((relative, parts.join("/")))
}

/// Decode and sanitize one archive entry name.
///
/// `raw` is the stored byte form, `presented` is the container library's own
/// rendering of it (CP437 for legacy entries).
pub fn decode(raw: &[u8], presented: &str, explicit_utf8: bool) -> Result<DecodedName, RelayError> {
    let (text, strategy) = recover_name(raw, presented, explicit_utf8);
    let (relative, display) = sanitize(&text)?;
    Ok(DecodedName {
        relative,
        display,
        strategy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const REPLACEMENT: char = '\u{FFFD}';

    // "你好.txt" in GBK.
    const GBK_NIHAO: &[u8] = b"\xc4\xe3\xba\xc3.txt";

    #[test]
    fn utf8_flag_is_trusted_when_bytes_are_valid() {
        let raw = "数据/说明.txt".as_bytes();
        let got = decode(raw, "数据/说明.txt", true).expect("decode");
        assert_eq!(got.display, "数据/说明.txt");
        assert_eq!(got.strategy, DecodeStrategy::Utf8Flag);
    }

    #[test]
    fn invalid_utf8_under_flag_falls_through_to_legacy_pairs() {
        let got = decode(GBK_NIHAO, "garbled", true).expect("decode");
        assert_eq!(got.display, "你好.txt");
        assert_eq!(got.strategy.label(), "cp437->GBK");
    }

    #[test]
    fn legacy_gbk_name_is_recovered() {
        let got = decode(GBK_NIHAO, "─π║├.txt", false).expect("decode");
        assert_eq!(got.display, "你好.txt");
        assert!(!got.strategy.is_exhausted());
    }

    #[test]
    fn undecodable_bytes_become_replacement_characters() {
        let raw = b"\x81\xff\xfe-end";
        let (text, strategy) = recover_name(raw, "", false);
        assert!(text.contains(REPLACEMENT));
        assert!(text.ends_with("-end"));
        assert!(!text.chars().any(|c| c.is_control()));
        assert!(matches!(strategy, DecodeStrategy::Legacy { .. }));
    }

    #[test]
    fn any_non_empty_legacy_name_resolves_through_the_first_pair() {
        for raw in [&b"\xff"[..], &b"\x80\x80"[..], &b"\xfe\xfe\xfe"[..]] {
            let (_, strategy) = recover_name(raw, "", false);
            assert_eq!(strategy.label(), "cp437->GBK", "{raw:?}");
            assert!(!strategy.is_exhausted());
        }
    }

    #[test]
    fn unmappable_source_codepage_is_a_hard_failure() {
        let pair = LegacyPair {
            source: SourceCodepage::Encoded(WINDOWS_1252, "iso-8859-1"),
            target: GBK,
        };
        assert_eq!(try_pair(pair, b"", "中文"), None);
    }

    #[test]
    fn empty_name_uses_verbatim_and_is_rejected() {
        let (text, strategy) = recover_name(b"", "", false);
        assert_eq!(text, "");
        assert_eq!(strategy, DecodeStrategy::Verbatim);
        assert!(matches!(
            decode(b"", "", false),
            Err(RelayError::EntryDecode { .. })
        ));
    }

    #[test]
    fn parent_segments_that_escape_are_rejected() {
        let err = decode(b"../../etc/passwd", "../../etc/passwd", true).unwrap_err();
        assert!(matches!(err, RelayError::PathTraversal { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn absolute_names_are_rejected() {
        for name in ["/etc/passwd", "\\windows\\system32", "C:\\boot.ini", "c:/x"] {
            let err = sanitize(name).unwrap_err();
            assert!(
                matches!(err, RelayError::PathTraversal { .. }),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn interior_parent_segments_are_resolved() {
        let (relative, display) = sanitize("a/./b/../c\\d.txt").expect("sanitize");
        assert_eq!(display, "a/c/d.txt");
        assert_eq!(relative, Path::new("a").join("c").join("d.txt"));
    }

    #[test]
    fn directory_entries_keep_their_segments() {
        let (_, display) = sanitize("data/sub/").expect("sanitize");
        assert_eq!(display, "data/sub");
    }

    #[test]
    fn nul_bytes_are_rejected_without_aborting() {
        let err = sanitize("a\0b").unwrap_err();
        assert!(!err.is_fatal());
    }
}
