//! Turning raw journal bytes into structured records.

use serde_json::Value;

/// One successfully parsed journal line.
pub type Record = Value;

/// Result of parsing one buffer of journal bytes.
///
/// `consumed` is the byte length of the buffer prefix that was fully
/// handled: the position just past the last line terminator. Everything
/// after it is an in-progress line that the caller must hold on to and
/// prepend to the next read.
#[derive(Debug, Default)]
pub(crate) struct ParsedLines {
    pub records: Vec<Record>,
    pub consumed: usize,
}

/// Journal files occasionally carry shift-out/shift-in bytes left over
/// from the game's text encoding; they are stripped before parsing.
const SHIFT_OUT: u8 = 0x0e;
const SHIFT_IN: u8 = 0x0f;

/// Parses every complete line in `buf`, leaving the trailing partial line
/// (if any) untouched.
///
/// Complete input is split on runs of `\r`/`\n`, blank lines are dropped,
/// and each remaining line is parsed as one JSON value. A line that fails
/// to parse is skipped with a diagnostic; it never aborts the batch.
pub(crate) fn parse_complete_lines(buf: &[u8]) -> ParsedLines {
    let consumed = match buf.iter().rposition(|&b| b == b'\n') {
        Some(idx) => idx + 1,
        // No terminator yet: the whole buffer may be a half-written line.
        None => return ParsedLines::default(),
    };

    let complete: Vec<u8> = buf[..consumed]
        .iter()
        .copied()
        .filter(|&b| b != SHIFT_OUT && b != SHIFT_IN)
        .collect();

    let mut records = Vec::new();
    for line in complete
        .split(|&b| b == b'\n' || b == b'\r')
        .filter(|line| !line.is_empty())
    {
        match serde_json::from_slice(line) {
            Ok(value) => records.push(value),
            Err(err) => {
                tracing::debug!(
                    line = %String::from_utf8_lossy(line),
                    %err,
                    "skipping unparseable journal line"
                );
            }
        }
    }

    ParsedLines { records, consumed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_complete_lines() {
        let buf = b"{\"a\":1}\n{\"b\":2}\n";
        let parsed = parse_complete_lines(buf);

        assert_eq!(parsed.records, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(parsed.consumed, buf.len());
    }

    #[test]
    fn holds_back_buffer_without_terminator() {
        let parsed = parse_complete_lines(b"{\"a\":1}");

        assert!(parsed.records.is_empty());
        assert_eq!(parsed.consumed, 0);
    }

    #[test]
    fn holds_back_trailing_partial_line() {
        let buf = b"{\"a\":1}\n{\"b\":";
        let parsed = parse_complete_lines(buf);

        assert_eq!(parsed.records, vec![json!({"a": 1})]);
        assert_eq!(parsed.consumed, 8);
    }

    #[test]
    fn strips_shift_control_bytes() {
        let buf = b"\x0e{\"a\":\x0f1}\n";
        let parsed = parse_complete_lines(buf);

        assert_eq!(parsed.records, vec![json!({"a": 1})]);
        assert_eq!(parsed.consumed, buf.len());
    }

    #[test]
    fn skips_malformed_lines() {
        let buf = b"{\"a\":1}\nnot json at all\n{\"b\":2}\n";
        let parsed = parse_complete_lines(buf);

        assert_eq!(parsed.records, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(parsed.consumed, buf.len());
    }

    #[test]
    fn handles_crlf_and_blank_lines() {
        let buf = b"{\"a\":1}\r\n\r\n{\"b\":2}\r\n";
        let parsed = parse_complete_lines(buf);

        assert_eq!(parsed.records, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(parsed.consumed, buf.len());
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let parsed = parse_complete_lines(b"");

        assert!(parsed.records.is_empty());
        assert_eq!(parsed.consumed, 0);
    }
}
