//! Post-processing: turn raw model replies into typed stage outputs.
//!
//! Models asked for "JSON only" still wrap their answer in ```json fences,
//! prepend a sentence of chatter, emit a BOM, or use CRLF line endings. The
//! rules here recover the JSON object without touching its content; if no
//! object can be recovered the stage has no usable output.
//!
//! ## Rule Order
//!
//! Invisible characters go first (a leading BOM defeats the fence regex),
//! then fences, then object extraction.

use crate::error::CapabilityError;
use crate::schema::{RecordField, StructuredRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Parse a model reply into the stage's output schema.
///
/// Tries the whole (cleaned) reply first, then the outermost `{…}` span.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T, CapabilityError> {
    let s = remove_invisible_chars(raw);
    let s = strip_code_fences(&s);
    let s = s.trim();

    if s.is_empty() {
        return Err(CapabilityError::missing("empty reply"));
    }

    match serde_json::from_str::<T>(s) {
        Ok(v) => Ok(v),
        Err(first_err) => {
            let candidate = outermost_object(s)
                .ok_or_else(|| CapabilityError::missing(format!("no JSON object in reply: {first_err}")))?;
            serde_json::from_str::<T>(candidate)
                .map_err(|e| CapabilityError::missing(format!("malformed JSON reply: {e}")))
        }
    }
}

/// Parse the structuring reply into a record.
///
/// An individual missing key reads as `null`, but the object must carry at
/// least one of the five record keys. A refusal such as
/// `{"error": "I cannot read this document"}` is therefore missing output,
/// not an all-null record.
pub fn parse_record_reply(raw: &str) -> Result<StructuredRecord, CapabilityError> {
    let object: Map<String, Value> = parse_json_reply(raw)?;
    if !RecordField::ALL.iter().any(|f| object.contains_key(f.key())) {
        let keys: Vec<&str> = object.keys().map(String::as_str).collect();
        return Err(CapabilityError::missing(format!(
            "structuring reply has none of the record keys (got {keys:?})"
        )));
    }
    serde_json::from_value(Value::Object(object))
        .map_err(|e| CapabilityError::missing(format!("malformed record: {e}")))
}

/// Tidy free text produced by the extraction and normalization stages.
///
/// Whitespace-only changes: line endings, trailing spaces, runs of blank
/// lines, invisible characters. Wording is left to the model.
pub fn clean_text(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

/// Zero-width joiner and non-joiner are kept: Indic scripts need them to
/// select conjunct and half forms.
fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}

// ── Rule 2: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Find the outermost JSON object ──────────────────────────────────

/// Slice from the first `{` to its matching `}`, skipping braces inside
/// string literals.
fn outermost_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in input[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Text rules ──────────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ExtractionOutput, RecognitionOutput, StructuredRecord};

    #[test]
    fn test_plain_json() {
        let out: ExtractionOutput = parse_json_reply(r#"{"extractedText": "Form A"}"#).unwrap();
        assert_eq!(out.extracted_text.as_deref(), Some("Form A"));
    }

    #[test]
    fn test_fenced_json() {
        let raw = "```json\n{\"entities\": [{\"label\": \"Village\", \"value\": \"Rampur\"}]}\n```";
        let out: RecognitionOutput = parse_json_reply(raw).unwrap();
        assert_eq!(out.entities.unwrap()[0].value, "Rampur");
    }

    #[test]
    fn test_chatter_around_object() {
        let raw = "Sure! Here is the record:\n{\"villageName\": \"Rampur {East}\", \"coordinates\": null}\nLet me know if you need more.";
        let out: StructuredRecord = parse_json_reply(raw).unwrap();
        assert_eq!(out.village_name.as_deref(), Some("Rampur {East}"));
        assert_eq!(out.coordinates, None);
    }

    #[test]
    fn test_bom_and_crlf() {
        let raw = "\u{FEFF}```json\r\n{\"extractedText\": \"x\"}\r\n```";
        let out: ExtractionOutput = parse_json_reply(raw).unwrap();
        assert_eq!(out.extracted_text.as_deref(), Some("x"));
    }

    #[test]
    fn test_no_object_is_missing_output() {
        let err = parse_json_reply::<ExtractionOutput>("I could not read the scan.").unwrap_err();
        assert!(matches!(err, CapabilityError::MissingOutput { .. }));
        let err = parse_json_reply::<ExtractionOutput>("   ").unwrap_err();
        assert!(matches!(err, CapabilityError::MissingOutput { .. }));
    }

    #[test]
    fn test_outermost_object_skips_string_braces() {
        let s = r#"x {"a": "}\"{", "b": {"c": 1}} y"#;
        assert_eq!(outermost_object(s), Some(r#"{"a": "}\"{", "b": {"c": 1}}"#));
        assert_eq!(outermost_object("{ unterminated"), None);
    }

    #[test]
    fn test_record_reply_rejects_refusal() {
        let err = parse_record_reply(r#"{"error":"I cannot read this document"}"#).unwrap_err();
        assert!(matches!(err, CapabilityError::MissingOutput { .. }));
        let err = parse_record_reply("{}").unwrap_err();
        assert!(matches!(err, CapabilityError::MissingOutput { .. }));
    }

    #[test]
    fn test_record_reply_partial_keys_read_as_null() {
        let rec = parse_record_reply("```json\n{\"villageName\": \"Rampur\"}\n```").unwrap();
        assert_eq!(rec.village_name.as_deref(), Some("Rampur"));
        assert_eq!(rec.patta_holder_name, None);

        let rec = parse_record_reply(
            r#"{"pattaHolderName":null,"villageName":null,"coordinates":null,"claimStatus":null,"additionalNotes":null}"#,
        )
        .unwrap();
        assert_eq!(rec.filled_count(), 0);
    }

    #[test]
    fn test_record_reply_wrong_type_is_missing_output() {
        let err = parse_record_reply(r#"{"coordinates": 21.5}"#).unwrap_err();
        assert!(matches!(err, CapabilityError::MissingOutput { .. }));
    }

    #[test]
    fn test_clean_text_keeps_joiners() {
        let raw = "ഗ്രാമം: അവന്\u{200D}\nग्राम: क्\u{200C}ष\u{200B}";
        assert_eq!(clean_text(raw), "ഗ്രാമം: അവന്\u{200D}\nग्राम: क्\u{200C}ष");
    }

    #[test]
    fn test_clean_text() {
        let raw = "\u{200B}Name:  Ram Singh   \r\n\r\n\r\n\r\nVillage: Rampur\r";
        assert_eq!(clean_text(raw), "Name:  Ram Singh\n\nVillage: Rampur");
    }
}
