fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if !ch.is_control() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

/// One greppable stderr line per degraded or security-relevant event.
pub fn emit(
    code: &str,
    stage: &str,
    action: &str,
    archive: &str,
    entry: &str,
    reason: &str,
    err: &str,
) {
    eprintln!(
        "ZXSYNC_WARN code={} stage={} action={} archive={} entry={} reason={} err={}",
        sanitize_value(code),
        sanitize_value(stage),
        sanitize_value(action),
        sanitize_value(archive),
        sanitize_value(entry),
        sanitize_value(reason),
        sanitize_value(err),
    );
}
