#[derive(Debug, Clone, Copy)]
pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub action: &'a str,
    pub item: &'a str,
    pub source: &'a str,
    pub retry: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

/// One `key=value` token: whitespace runs become `_`, `=` becomes `:`.
/// Non-ASCII filenames pass through unchanged.
fn sanitize_value(value: &str) -> String {
    let words: Vec<&str> = value
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|word| !word.is_empty())
        .collect();
    if words.is_empty() {
        return "na".to_string();
    }
    words.join("_").replace('=', ":")
}

pub fn format_line(event: &WarnEvent<'_>) -> String {
    format!(
        "INGEST_WARN code={} stage={} action={} item={} source={} retry={} reason={} err={}",
        sanitize_value(event.code),
        sanitize_value(event.stage),
        sanitize_value(event.action),
        sanitize_value(event.item),
        sanitize_value(event.source),
        sanitize_value(event.retry),
        sanitize_value(event.reason),
        sanitize_value(event.err),
    )
}

pub fn emit(event: WarnEvent<'_>) {
    tracing::warn!("{}", format_line(&event));
}

#[cfg(test)]
mod tests {
    use super::{WarnEvent, format_line, sanitize_value};

    #[test]
    fn sanitize_value_rewrites_whitespace() {
        assert_eq!(sanitize_value("a b\tc"), "a_b_c");
    }

    #[test]
    fn sanitize_value_keeps_tokens_parseable() {
        assert_eq!(sanitize_value("key=value"), "key:value");
        assert_eq!(sanitize_value("  Été\u{7}clip.mov "), "Été_clip.mov");
    }

    #[test]
    fn sanitize_value_falls_back_for_empty() {
        assert_eq!(sanitize_value("   "), "na");
    }

    #[test]
    fn line_is_single_token_per_field() {
        let line = format_line(&WarnEvent {
            code: "E003_BACKEND",
            stage: "backend",
            action: "archive",
            item: "My Clip.mp4",
            source: "/media/card/DCIM/My Clip.mp4",
            retry: "next-run",
            reason: "backend-failed",
            err: "disk full\n",
        });
        assert_eq!(
            line,
            "INGEST_WARN code=E003_BACKEND stage=backend action=archive item=My_Clip.mp4 \
             source=/media/card/DCIM/My_Clip.mp4 retry=next-run reason=backend-failed err=disk_full"
        );
    }
}
