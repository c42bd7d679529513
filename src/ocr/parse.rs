//! Splitting recognizer output into debug text, JSON and raw text.
//!
//! The recognizer prints free-form debug lines followed by a JSON report,
//! normally wrapped in start/end markers. Its JSON writer sometimes omits
//! the comma between adjacent `structured_data` objects; that is repaired
//! before parsing.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const JSON_START_MARKER: &str = "=== JSON START ===";
pub const JSON_END_MARKER: &str = "=== JSON END ===";

/// Matches `}` followed by an object starting with `"title":` without a comma between.
const MISSING_COMMA_PATTERN: &str = r#"(\s*\}\s*)(\s*\{\s*"title":)"#;

/// One listing entry recognized on a composite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredItem {
    pub title: String,
    pub title_short: String,
    pub enhancement: String,
    pub price: String,
    pub package: bool,
    pub owner: String,
    pub count: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TextRecognition {
    pub success: bool,
    pub raw_text: String,
    pub structured_data: Vec<StructuredItem>,
    pub confidence: String,
}

/// The recognizer's JSON report; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RecognizerReport {
    pub image_file: String,
    pub text_recognition: TextRecognition,
}

/// Recognizer output split into its parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    /// Everything before the JSON report, trimmed
    pub debug_info: String,
    /// The (repaired) JSON report; empty if none was found
    pub json_data: String,
    /// `text_recognition.raw_text`; empty if the JSON did not parse
    pub raw_text: String,
}

/// Inserts the commas the recognizer drops between `structured_data` objects.
pub fn repair_json(json: &str) -> Result<String> {
    let re = Regex::new(MISSING_COMMA_PATTERN)?;
    Ok(re.replace_all(json, "$1,$2").into_owned())
}

/// Parses a JSON report, repairing it first.
pub fn parse_report(json: &str) -> Result<RecognizerReport> {
    let repaired = repair_json(json)?;
    Ok(serde_json::from_str(&repaired)?)
}

/// Splits raw recognizer output.
///
/// Uses the JSON markers when both are present in order, otherwise the
/// span from the first `{` to the last `}`. Without either, the whole
/// output is debug text.
pub fn parse_output(output: &str) -> ParsedOutput {
    let (debug, json) = match split_markers(output).or_else(|| split_braces(output)) {
        Some(parts) => parts,
        None => {
            return ParsedOutput {
                debug_info: output.to_string(),
                ..ParsedOutput::default()
            }
        }
    };

    let json_data = match repair_json(json) {
        Ok(repaired) => repaired,
        Err(_) => json.to_string(),
    };
    let raw_text = match parse_report(json) {
        Ok(report) => {
            let recognition = report.text_recognition;
            crate::log(&format!(
                "Recognizer report for {}: success={}, {} structured items, confidence {}",
                report.image_file,
                recognition.success,
                recognition.structured_data.len(),
                recognition.confidence
            ));
            recognition.raw_text
        }
        Err(e) => {
            crate::log(&format!("Warning: recognizer JSON did not parse: {}", e));
            String::new()
        }
    };

    ParsedOutput {
        debug_info: debug.trim().to_string(),
        json_data,
        raw_text,
    }
}

fn split_markers(output: &str) -> Option<(&str, &str)> {
    let start = output.find(JSON_START_MARKER)?;
    let end = output.find(JSON_END_MARKER)?;
    if end <= start {
        return None;
    }
    let json = &output[start + JSON_START_MARKER.len()..end];
    Some((&output[..start], json.trim()))
}

fn split_braces(output: &str) -> Option<(&str, &str)> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if end <= start {
        return None;
    }
    Some((&output[..start], output[start..=end].trim()))
}
