//! Parameter declaration grammar.
//!
//! A filter's parameter block is a run of declarations of the form
//! `NAME = [_]TYPE(VALUES)`, where the value region may also be delimited by
//! `{}` or `[]`. [`parse_one`] reads a single declaration and reports how many
//! bytes it consumed so callers can walk a whole block.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::FilterError;

/// Parameter type keywords understood by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Int,
    Float,
    Bool,
    Choice,
    Color,
    Separator,
    Note,
    File,
    Folder,
    Text,
    Link,
    Value,
    Button,
}

impl ParameterType {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "choice" => Some(Self::Choice),
            "color" => Some(Self::Color),
            "separator" => Some(Self::Separator),
            "note" => Some(Self::Note),
            "file" => Some(Self::File),
            "folder" => Some(Self::Folder),
            "text" => Some(Self::Text),
            "link" => Some(Self::Link),
            "value" => Some(Self::Value),
            "button" => Some(Self::Button),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Choice => "choice",
            Self::Color => "color",
            Self::Separator => "separator",
            Self::Note => "note",
            Self::File => "file",
            Self::Folder => "folder",
            Self::Text => "text",
            Self::Link => "link",
            Self::Value => "value",
            Self::Button => "button",
        }
    }

    /// Display-only types never occupy a value slot.
    pub fn is_decorative(self) -> bool {
        matches!(self, Self::Separator | Self::Note | Self::Link)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StringValue {
    pub default: String,
    pub current: Option<String>,
}

impl StringValue {
    fn new(default: String) -> Self {
        Self {
            default,
            current: None,
        }
    }

    pub fn effective(&self) -> &str {
        self.current.as_deref().unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkAlignment {
    Left,
    Center,
    Right,
}

/// Typed payload of a parameter, one shape per declared type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterKind {
    Int {
        default: f32,
        min: f32,
        max: f32,
        current: f32,
    },
    Float {
        default: f32,
        min: f32,
        max: f32,
        current: f32,
    },
    Bool {
        default: f32,
        current: f32,
    },
    Choice {
        labels: Vec<String>,
        default: f32,
        current: f32,
    },
    Color {
        default: [f32; 4],
        current: [f32; 4],
        uses_alpha: bool,
    },
    Separator,
    Note {
        text: String,
    },
    File(StringValue),
    Folder(StringValue),
    Text {
        value: StringValue,
        multiline: bool,
    },
    Link {
        text: String,
        url: String,
        alignment: LinkAlignment,
    },
    Value(StringValue),
    Button {
        current: f32,
    },
}

impl ParameterKind {
    pub fn parameter_type(&self) -> ParameterType {
        match self {
            Self::Int { .. } => ParameterType::Int,
            Self::Float { .. } => ParameterType::Float,
            Self::Bool { .. } => ParameterType::Bool,
            Self::Choice { .. } => ParameterType::Choice,
            Self::Color { .. } => ParameterType::Color,
            Self::Separator => ParameterType::Separator,
            Self::Note { .. } => ParameterType::Note,
            Self::File(_) => ParameterType::File,
            Self::Folder(_) => ParameterType::Folder,
            Self::Text { .. } => ParameterType::Text,
            Self::Link { .. } => ParameterType::Link,
            Self::Value(_) => ParameterType::Value,
            Self::Button { .. } => ParameterType::Button,
        }
    }
}

/// One declared control of a filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub updates_preview: bool,
    #[serde(flatten)]
    pub kind: ParameterKind,
}

impl Parameter {
    pub fn parameter_type(&self) -> ParameterType {
        self.kind.parameter_type()
    }

    /// Whether this parameter consumes a slot in the encoded value list.
    pub fn is_actual(&self) -> bool {
        !self.parameter_type().is_decorative()
    }

    /// Current value in its encoded string form, `None` for decorative types.
    pub fn current_value(&self) -> Option<String> {
        match &self.kind {
            ParameterKind::Int { current, .. }
            | ParameterKind::Float { current, .. }
            | ParameterKind::Bool { current, .. }
            | ParameterKind::Choice { current, .. }
            | ParameterKind::Button { current } => Some(format_number(*current)),
            ParameterKind::Color {
                current,
                uses_alpha,
                ..
            } => {
                let channels = if *uses_alpha { 4 } else { 3 };
                Some(
                    current[..channels]
                        .iter()
                        .map(|channel| format_number(*channel))
                        .collect::<Vec<_>>()
                        .join(","),
                )
            }
            ParameterKind::File(value)
            | ParameterKind::Folder(value)
            | ParameterKind::Value(value)
            | ParameterKind::Text { value, .. } => Some(value.effective().to_owned()),
            ParameterKind::Separator | ParameterKind::Note { .. } | ParameterKind::Link { .. } => {
                None
            }
        }
    }

    /// Update the current value from its encoded string form.
    ///
    /// Numbers that fail to parse become `0` (`-1` for a choice index). A color
    /// whose channel count disagrees with its alpha flag is a mismatch and
    /// leaves the parameter untouched. Decorative parameters ignore the call.
    pub fn apply_value(&mut self, raw: &str) -> Result<(), FilterError> {
        match &mut self.kind {
            ParameterKind::Int { current, .. }
            | ParameterKind::Float { current, .. }
            | ParameterKind::Bool { current, .. }
            | ParameterKind::Button { current } => {
                *current = parse_lenient(raw);
            }
            ParameterKind::Choice { current, .. } => {
                *current = raw
                    .trim()
                    .parse::<f32>()
                    .map(f32::trunc)
                    .unwrap_or(-1.0);
            }
            ParameterKind::Color {
                current,
                uses_alpha,
                ..
            } => {
                let channels = raw.split(',').collect::<Vec<_>>();
                let expected = if *uses_alpha { 4 } else { 3 };
                if channels.len() != expected {
                    return Err(FilterError::mismatch(format!(
                        "color parameter '{}' expects {} channels, got '{}'",
                        self.name, expected, raw
                    )));
                }
                current[3] = 1.0;
                for (slot, channel) in current.iter_mut().zip(channels) {
                    *slot = parse_lenient(channel);
                }
            }
            ParameterKind::File(value)
            | ParameterKind::Folder(value)
            | ParameterKind::Value(value)
            | ParameterKind::Text { value, .. } => {
                value.current = Some(raw.to_owned());
            }
            ParameterKind::Separator | ParameterKind::Note { .. } | ParameterKind::Link { .. } => {}
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        match &mut self.kind {
            ParameterKind::Int {
                default, current, ..
            }
            | ParameterKind::Float {
                default, current, ..
            }
            | ParameterKind::Bool { default, current }
            | ParameterKind::Choice {
                default, current, ..
            } => *current = *default,
            ParameterKind::Color {
                default, current, ..
            } => *current = *default,
            ParameterKind::Button { current } => *current = 0.0,
            ParameterKind::File(value)
            | ParameterKind::Folder(value)
            | ParameterKind::Value(value)
            | ParameterKind::Text { value, .. } => value.current = None,
            ParameterKind::Separator | ParameterKind::Note { .. } | ParameterKind::Link { .. } => {}
        }
    }
}

fn format_number(value: f32) -> String {
    format!("{}", value)
}

fn parse_lenient(raw: &str) -> f32 {
    raw.trim().parse::<f32>().unwrap_or(0.0)
}

/// Parse the declaration at the start of `text`.
///
/// Returns `Ok(None)` when only whitespace remains, which marks the clean end
/// of a parameter block. On success the second tuple element is the number of
/// bytes consumed, including the terminator and any commas or whitespace that
/// directly follow it.
pub fn parse_one(text: &str) -> Result<Option<(Parameter, usize)>, FilterError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let captures = declaration_header_regex()
        .captures(text)
        .ok_or_else(|| FilterError::grammar(first_line(text), "expected 'NAME = TYPE(...)'"))?;

    let keyword = &captures[3];
    let parameter_type = ParameterType::from_keyword(keyword).ok_or_else(|| {
        FilterError::grammar(
            first_line(text),
            format!("unknown parameter type '{keyword}'"),
        )
    })?;

    let close = match &captures[4] {
        "(" => ')',
        "{" => '}',
        "[" => ']',
        other => {
            return Err(FilterError::grammar(
                first_line(text),
                format!("expected '(', '{{' or '[' after '{keyword}', found '{other}'"),
            ))
        }
    };

    let values_start = captures.get(0).map_or(0, |header| header.end());
    let values_len = text[values_start..].find(close).ok_or_else(|| {
        FilterError::grammar(first_line(text), format!("missing closing '{close}'"))
    })?;
    let values = text[values_start..values_start + values_len].trim();

    let mut consumed = values_start + values_len + close.len_utf8();
    consumed += text[consumed..]
        .chars()
        .take_while(|ch| *ch == ',' || ch.is_whitespace())
        .map(char::len_utf8)
        .sum::<usize>();

    let kind = parse_kind(parameter_type, values)
        .map_err(|reason| FilterError::grammar(first_line(text), reason))?;

    let parameter = Parameter {
        name: captures[1].trim().to_owned(),
        updates_preview: captures[2].is_empty(),
        kind,
    };
    Ok(Some((parameter, consumed)))
}

fn declaration_header_regex() -> &'static Regex {
    static HEADER_RE: OnceLock<Regex> = OnceLock::new();
    HEADER_RE.get_or_init(|| {
        Regex::new(r"(?s)^([^=]*)=\s*(_?)([A-Za-z]+)\s*(.)")
            .expect("declaration header regex should compile")
    })
}

fn first_line(text: &str) -> &str {
    text.trim_start().lines().next().unwrap_or_default()
}

fn parse_kind(parameter_type: ParameterType, values: &str) -> Result<ParameterKind, String> {
    let kind = match parameter_type {
        ParameterType::Int | ParameterType::Float => {
            let (default, min, max) = parse_numeric_triple(values)?;
            if parameter_type == ParameterType::Int {
                ParameterKind::Int {
                    default,
                    min,
                    max,
                    current: default,
                }
            } else {
                ParameterKind::Float {
                    default,
                    min,
                    max,
                    current: default,
                }
            }
        }
        ParameterType::Bool => {
            let first = values.split(',').next().unwrap_or_default().trim();
            let value = if first == "true" || first.starts_with('1') {
                1.0
            } else {
                0.0
            };
            ParameterKind::Bool {
                default: value,
                current: value,
            }
        }
        ParameterType::Choice => {
            let mut tokens = values.split(',').collect::<Vec<_>>();
            let index = match tokens.first().map(|token| token.trim().parse::<i32>()) {
                Some(Ok(index)) => {
                    tokens.remove(0);
                    index as f32
                }
                _ => 0.0,
            };
            ParameterKind::Choice {
                labels: tokens
                    .into_iter()
                    .map(|token| strip_quotes(token).to_owned())
                    .collect(),
                default: index,
                current: index,
            }
        }
        ParameterType::Color => {
            let channels = values
                .split(',')
                .map(|channel| {
                    channel
                        .trim()
                        .parse::<i32>()
                        .map(|value| value as f32)
                        .map_err(|_| format!("color channel '{}' is not an integer", channel.trim()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let (rgba, uses_alpha) = match channels.as_slice() {
                [r, g, b] => ([*r, *g, *b, 1.0], false),
                [r, g, b, a] => ([*r, *g, *b, *a], true),
                _ => {
                    return Err(format!(
                        "color expects 3 or 4 channels, got {}",
                        channels.len()
                    ))
                }
            };
            ParameterKind::Color {
                default: rgba,
                current: rgba,
                uses_alpha,
            }
        }
        ParameterType::Separator => ParameterKind::Separator,
        ParameterType::Note => ParameterKind::Note {
            text: note_markup(values),
        },
        ParameterType::File => ParameterKind::File(StringValue::new(values.to_owned())),
        ParameterType::Folder => ParameterKind::Folder(StringValue::new(values.to_owned())),
        ParameterType::Value => ParameterKind::Value(StringValue::new(values.to_owned())),
        ParameterType::Text => {
            let (multiline, rest) = split_multiline_marker(values);
            let text = strip_quotes(rest)
                .replace("\\\\", "\\")
                .replace("\\n", "\n");
            ParameterKind::Text {
                value: StringValue::new(text),
                multiline,
            }
        }
        ParameterType::Link => parse_link(values),
        ParameterType::Button => ParameterKind::Button { current: 0.0 },
    };
    Ok(kind)
}

fn parse_numeric_triple(values: &str) -> Result<(f32, f32, f32), String> {
    let numbers = values
        .split(',')
        .take(3)
        .map(|token| {
            token
                .trim()
                .parse::<f32>()
                .map_err(|_| format!("'{}' is not a number", token.trim()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match numbers.as_slice() {
        [default, min, max] => Ok((*default, *min, *max)),
        _ => Err(format!(
            "expected default, min and max, got {} value(s)",
            numbers.len()
        )),
    }
}

fn split_multiline_marker(values: &str) -> (bool, &str) {
    static MULTILINE_RE: OnceLock<Regex> = OnceLock::new();
    let re = MULTILINE_RE.get_or_init(|| {
        Regex::new(r"^\s*(0|1)\s*,").expect("multiline marker regex should compile")
    });
    match re.captures(values) {
        Some(captures) => {
            let marker_end = captures.get(0).map_or(0, |marker| marker.end());
            (&captures[1] == "1", &values[marker_end..])
        }
        None => (false, values),
    }
}

fn note_markup(values: &str) -> String {
    static COLOR_ATTRIBUTE_RE: OnceLock<Regex> = OnceLock::new();
    let re = COLOR_ATTRIBUTE_RE.get_or_init(|| {
        Regex::new(r#"(?:color|foreground)\s*=\s*""#).expect("note color regex should compile")
    });
    let text = strip_quotes(values)
        .replace("\\\"", "\"")
        .replace("\\n", "<br/>");
    re.replace_all(&text, r#"style="color:"#).into_owned()
}

fn parse_link(values: &str) -> ParameterKind {
    let mut tokens = values.split(',').collect::<Vec<_>>();
    let mut alignment = LinkAlignment::Center;
    if tokens.len() == 3 {
        alignment = match tokens.remove(0).trim().parse::<f32>() {
            Ok(value) if value == 0.0 => LinkAlignment::Left,
            Ok(value) if value == 1.0 => LinkAlignment::Right,
            _ => LinkAlignment::Center,
        };
    }

    let mut text = String::new();
    let mut url = String::new();
    if tokens.len() == 2 {
        text = strip_quotes(tokens.remove(0)).to_owned();
    }
    if tokens.len() == 1 {
        url = strip_quotes(tokens[0]).to_owned();
    }
    if text.is_empty() {
        text = url.clone();
    }
    ParameterKind::Link {
        text,
        url,
        alignment,
    }
}

/// Trim and drop one leading and one trailing double quote.
fn strip_quotes(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}
