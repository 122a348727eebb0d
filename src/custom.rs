// src/custom.rs
// Custom indicator importer: extracts a declarative parameter/output-buffer
// schema from external indicator source text, so imports plug into the same
// catalog shape as the built-ins.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorDataType {
    Int,
    Double,
    Bool,
    String,
    Datetime,
    Color,
    Enum,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumOption {
    pub label: String,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputParameter {
    pub name: String,
    pub display_name: String,
    pub data_type: IndicatorDataType,
    pub default_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<EnumOption>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBuffer {
    pub index: usize,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Immutable catalog entry derived once from imported source text.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSchema {
    pub name: String,
    pub input_parameters: Vec<InputParameter>,
    pub output_buffers: Vec<OutputBuffer>,
}

/// Parse an indicator source file into its schema.
///
/// Extracts typed `input` declarations (an inline `//` comment becomes the
/// display name), buffer/plot counts, and per-buffer labels. Unparseable or
/// ambiguous declarations fall back to a single buffer named "Value"; only an
/// invalid indicator name is a hard failure.
pub fn parse_indicator_source(source: &str, file_name: &str) -> Result<IndicatorSchema, ImportError> {
    let name = strip_source_extension(file_name);
    validate_indicator_name(name)?;

    Ok(IndicatorSchema {
        name: name.to_string(),
        input_parameters: extract_input_parameters(source),
        output_buffers: extract_output_buffers(source),
    })
}

/// Reject names the catalog cannot hold, with a human-readable reason.
pub fn validate_indicator_name(name: &str) -> Result<(), ImportError> {
    if name.trim().is_empty() {
        return Err(ImportError::new("indicator name cannot be empty"));
    }
    if name.len() > 100 {
        return Err(ImportError::new(
            "indicator name too long (max 100 characters)",
        ));
    }
    let ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ');
    if !ok {
        return Err(ImportError::new("indicator name contains invalid characters"));
    }
    Ok(())
}

fn strip_source_extension(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".mq4") || lower.ends_with(".mq5") {
        &file_name[..file_name.len() - 4]
    } else {
        file_name
    }
}

// ============================================================================
// Input parameters
// ============================================================================

fn extract_input_parameters(source: &str) -> Vec<InputParameter> {
    let mut parameters = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix("input ") else {
            continue;
        };
        if let Some(parameter) = parse_input_declaration(rest, source) {
            parameters.push(parameter);
        }
    }

    parameters
}

// One declaration: `<type> <name> = <default>; // optional display name`
fn parse_input_declaration(decl: &str, source: &str) -> Option<InputParameter> {
    let (body, comment) = match decl.split_once(';') {
        Some((body, tail)) => {
            let comment = tail.trim().strip_prefix("//").map(|c| c.trim().to_string());
            (body, comment)
        }
        None => return None,
    };

    let (left, default_str) = body.split_once('=')?;
    let mut tokens = left.split_whitespace();
    let type_token = tokens.next()?;
    let name = tokens.next()?;
    if tokens.next().is_some() || !is_identifier(name) {
        return None;
    }

    let data_type = map_data_type(type_token);
    let default_value = parse_default_value(default_str.trim(), data_type);

    let (min, max, step) = match data_type {
        IndicatorDataType::Int => (Some(1.0), Some(1000.0), Some(1.0)),
        IndicatorDataType::Double => (Some(1.0), Some(10_000.0), Some(0.1)),
        _ => (None, None, None),
    };

    let options = if data_type == IndicatorDataType::Enum {
        Some(enum_options(type_token, source))
    } else {
        None
    };

    let display_name = comment
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| format_display_name(name));

    Some(InputParameter {
        name: name.to_string(),
        display_name,
        data_type,
        default_value,
        min,
        max,
        step,
        options,
    })
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_') == Some(true)
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn map_data_type(type_token: &str) -> IndicatorDataType {
    if type_token.starts_with("ENUM_") {
        return IndicatorDataType::Enum;
    }
    match type_token.to_ascii_lowercase().as_str() {
        "int" | "uint" | "long" | "ulong" | "short" | "ushort" | "char" | "uchar" => {
            IndicatorDataType::Int
        }
        "double" | "float" => IndicatorDataType::Double,
        "bool" => IndicatorDataType::Bool,
        "string" => IndicatorDataType::String,
        "datetime" => IndicatorDataType::Datetime,
        "color" => IndicatorDataType::Color,
        _ => IndicatorDataType::Int,
    }
}

fn parse_default_value(value: &str, data_type: IndicatorDataType) -> Value {
    match data_type {
        IndicatorDataType::Bool => json!(value.eq_ignore_ascii_case("true")),
        IndicatorDataType::Int | IndicatorDataType::Double => value
            .parse::<f64>()
            .map(|v| json!(v))
            .unwrap_or_else(|_| json!(value)),
        IndicatorDataType::String => {
            json!(value.trim_matches('"'))
        }
        IndicatorDataType::Color => json!(value.strip_prefix("clr").unwrap_or(value)),
        _ => json!(value),
    }
}

// InpSignalPeriod -> "Signal Period"
fn format_display_name(variable: &str) -> String {
    let base = variable.strip_prefix("Inp").unwrap_or(variable);
    let mut display = String::new();
    for (i, c) in base.chars().enumerate() {
        if c == '_' {
            display.push(' ');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 && !display.ends_with(' ') {
            display.push(' ');
        }
        if i == 0 {
            display.push(c.to_ascii_uppercase());
        } else {
            display.push(c);
        }
    }
    display.trim().to_string()
}

// Option tables for the enum types every platform indicator uses; anything
// unknown gets a single default entry.
fn enum_options(enum_type: &str, _source: &str) -> Vec<EnumOption> {
    let table: &[(&str, &str)] = match enum_type {
        "ENUM_MA_METHOD" => &[
            ("Simple", "MODE_SMA"),
            ("Exponential", "MODE_EMA"),
            ("Smoothed", "MODE_SMMA"),
            ("Linear Weighted", "MODE_LWMA"),
        ],
        "ENUM_APPLIED_PRICE" => &[
            ("Close", "PRICE_CLOSE"),
            ("Open", "PRICE_OPEN"),
            ("High", "PRICE_HIGH"),
            ("Low", "PRICE_LOW"),
            ("Median (HL/2)", "PRICE_MEDIAN"),
            ("Typical (HLC/3)", "PRICE_TYPICAL"),
            ("Weighted (HLCC/4)", "PRICE_WEIGHTED"),
        ],
        "ENUM_TIMEFRAMES" => &[
            ("M1", "PERIOD_M1"),
            ("M5", "PERIOD_M5"),
            ("M15", "PERIOD_M15"),
            ("M30", "PERIOD_M30"),
            ("H1", "PERIOD_H1"),
            ("H4", "PERIOD_H4"),
            ("D1", "PERIOD_D1"),
            ("W1", "PERIOD_W1"),
            ("MN1", "PERIOD_MN1"),
        ],
        _ => {
            return vec![EnumOption {
                label: "Default".to_string(),
                value: json!(0),
            }]
        }
    };

    table
        .iter()
        .map(|(label, value)| EnumOption {
            label: label.to_string(),
            value: json!(value),
        })
        .collect()
}

// ============================================================================
// Output buffers
// ============================================================================

fn extract_output_buffers(source: &str) -> Vec<OutputBuffer> {
    let mut buffer_count: Option<usize> = None;
    let mut plot_count: Option<usize> = None;
    let mut labels: Vec<(usize, String)> = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix("#property") else {
            continue;
        };
        let rest = rest.trim();

        if let Some(value) = rest.strip_prefix("indicator_buffers") {
            buffer_count = value.trim().parse().ok();
        } else if let Some(value) = rest.strip_prefix("indicator_plots") {
            plot_count = value.trim().parse().ok();
        } else if let Some(value) = rest.strip_prefix("indicator_label") {
            // indicator_labelN "Some Label"
            let value = value.trim();
            let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(index) = digits.parse::<usize>() {
                let tail = value[digits.len()..].trim();
                if let Some(label) = tail.strip_prefix('"').and_then(|t| t.split('"').next()) {
                    labels.push((index, label.to_string()));
                }
            }
        }
    }

    let buffer_count = buffer_count.unwrap_or(1);
    let plot_count = plot_count.unwrap_or(buffer_count);
    let total = buffer_count.max(plot_count);

    let mut buffers: Vec<OutputBuffer> = (0..total)
        .map(|i| {
            let label = labels
                .iter()
                .find(|(index, _)| *index == i + 1)
                .map(|(_, label)| label.clone());
            OutputBuffer {
                index: i,
                name: label.unwrap_or_else(|| format!("Buffer {i}")),
                description: Some(format!("Output buffer {i}")),
            }
        })
        .collect();

    if buffers.is_empty() {
        buffers.push(OutputBuffer {
            index: 0,
            name: "Value".to_string(),
            description: Some("Main output value".to_string()),
        });
    }

    buffers
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
#property indicator_separate_window
#property indicator_buffers 3
#property indicator_plots 2
#property indicator_label1 "Main Line"
#property indicator_label2 "Signal Line"

input int InpPeriod = 14;        // Averaging Period
input double InpDeviation = 2.0;
input bool InpShowArrows = true; // Show Arrows
input string InpLabel = "zones";
input ENUM_MA_METHOD InpMethod = MODE_SMA;
"#;

    #[test]
    fn test_parses_inputs_with_display_names() {
        let schema = parse_indicator_source(SOURCE, "TrendZones.mq5").unwrap();
        assert_eq!(schema.name, "TrendZones");
        assert_eq!(schema.input_parameters.len(), 5);

        let period = &schema.input_parameters[0];
        assert_eq!(period.name, "InpPeriod");
        assert_eq!(period.display_name, "Averaging Period");
        assert_eq!(period.data_type, IndicatorDataType::Int);
        assert_eq!(period.default_value, json!(14.0));
        assert_eq!(period.step, Some(1.0));

        // No comment: display name derived from the identifier
        let deviation = &schema.input_parameters[1];
        assert_eq!(deviation.display_name, "Deviation");
        assert_eq!(deviation.data_type, IndicatorDataType::Double);

        let arrows = &schema.input_parameters[2];
        assert_eq!(arrows.default_value, json!(true));

        let label = &schema.input_parameters[3];
        assert_eq!(label.default_value, json!("zones"));
    }

    #[test]
    fn test_enum_input_gets_option_table() {
        let schema = parse_indicator_source(SOURCE, "TrendZones.mq4").unwrap();
        let method = &schema.input_parameters[4];
        assert_eq!(method.data_type, IndicatorDataType::Enum);
        let options = method.options.as_ref().unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options[0].label, "Simple");
    }

    #[test]
    fn test_buffers_use_labels_then_fallback_names() {
        let schema = parse_indicator_source(SOURCE, "TrendZones.mq5").unwrap();
        assert_eq!(schema.output_buffers.len(), 3);
        assert_eq!(schema.output_buffers[0].name, "Main Line");
        assert_eq!(schema.output_buffers[1].name, "Signal Line");
        assert_eq!(schema.output_buffers[2].name, "Buffer 2");
    }

    #[test]
    fn test_unparseable_source_falls_back_to_value_buffer() {
        let schema = parse_indicator_source("int OnCalculate() { return 0; }", "mystery.mq4").unwrap();
        assert!(schema.input_parameters.is_empty());
        assert_eq!(schema.output_buffers.len(), 1);
        assert_eq!(schema.output_buffers[0].name, "Value");
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_indicator_name("Super Trend_2").is_ok());
        assert!(validate_indicator_name("").is_err());
        assert!(validate_indicator_name(&"x".repeat(101)).is_err());
        assert!(validate_indicator_name("bad/name").is_err());
        let err = parse_indicator_source("", "bad/name.mq4").unwrap_err();
        assert!(err.reason.contains("invalid characters"));
    }

    #[test]
    fn test_display_name_formatting() {
        assert_eq!(format_display_name("InpFastPeriod"), "Fast Period");
        assert_eq!(format_display_name("slow_length"), "Slow length");
        assert_eq!(format_display_name("Gamma"), "Gamma");
    }
}
