//! Flat NUL-separated encoding of a filter's identity and parameter values.
//!
//! Layout: `name\0command\0preview_command\0value_1\0 ... value_n\0`.
//! The buffer always carries `3 + values.len()` fields; empty fields are a
//! single NUL byte. The byte length travels with the buffer because values may
//! themselves be empty.
//!
//! Encoding is strict (an embedded NUL would break framing and is rejected).
//! Decoding is lenient: it stops at the declared length and leaves whatever it
//! could not read as empty, which keeps older and shorter host buffers usable.

use serde::Serialize;

use crate::error::FilterError;

const FIELD_SEPARATOR: u8 = 0;

/// The `(name, command, preview_command)` triple selecting a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FilterIdentity {
    pub name: String,
    pub command: String,
    pub preview_command: String,
}

impl FilterIdentity {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        preview_command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            preview_command: preview_command.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedFilterBuffer {
    bytes: Vec<u8>,
}

impl EncodedFilterBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn decode(&self) -> DecodedFilterData {
        decode(&self.bytes, self.bytes.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodedFilterData {
    pub identity: FilterIdentity,
    pub values: Vec<String>,
}

pub fn encode<S: AsRef<str>>(
    identity: &FilterIdentity,
    values: &[S],
) -> Result<EncodedFilterBuffer, FilterError> {
    let identity_fields = [
        ("filter name", identity.name.as_str()),
        ("filter command", identity.command.as_str()),
        ("preview command", identity.preview_command.as_str()),
    ];

    let capacity = identity_fields
        .iter()
        .map(|(_, field)| field.len() + 1)
        .chain(values.iter().map(|value| value.as_ref().len() + 1))
        .sum();
    let mut bytes = Vec::with_capacity(capacity);

    for (label, field) in identity_fields {
        push_field(&mut bytes, label, field)?;
    }
    for (index, value) in values.iter().enumerate() {
        push_field(&mut bytes, &format!("value #{}", index + 1), value.as_ref())?;
    }

    Ok(EncodedFilterBuffer { bytes })
}

fn push_field(bytes: &mut Vec<u8>, label: &str, field: &str) -> Result<(), FilterError> {
    if field.as_bytes().contains(&FIELD_SEPARATOR) {
        return Err(FilterError::EmbeddedNul {
            field: label.to_owned(),
        });
    }
    bytes.extend_from_slice(field.as_bytes());
    bytes.push(FIELD_SEPARATOR);
    Ok(())
}

/// Decode the first `length` bytes of `bytes`.
///
/// `length` is clamped to the slice. Reading stops as soon as the running
/// offset reaches `length`. A field whose terminator lies at or beyond
/// `length` is only partially covered: it and every later field stay empty.
/// When `length` covers the whole slice the last field needs no terminator.
pub fn decode(bytes: &[u8], length: usize) -> DecodedFilterData {
    let mut reader = FieldReader {
        bytes: &bytes[..length.min(bytes.len())],
        offset: 0,
        open_tail: length >= bytes.len(),
    };
    let mut identity_fields = Vec::with_capacity(3);
    while identity_fields.len() < 3 {
        match reader.next_field() {
            Some(field) => identity_fields.push(field),
            None => break,
        }
    }

    let mut values = Vec::new();
    if identity_fields.len() == 3 {
        while let Some(value) = reader.next_field() {
            values.push(value);
        }
    }

    let mut fields = identity_fields.into_iter();
    DecodedFilterData {
        identity: FilterIdentity {
            name: fields.next().unwrap_or_default(),
            command: fields.next().unwrap_or_default(),
            preview_command: fields.next().unwrap_or_default(),
        },
        values,
    }
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    offset: usize,
    open_tail: bool,
}

impl FieldReader<'_> {
    fn next_field(&mut self) -> Option<String> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        let rest = &self.bytes[self.offset..];
        let terminator = match rest.iter().position(|byte| *byte == FIELD_SEPARATOR) {
            Some(terminator) => terminator,
            None if self.open_tail => rest.len(),
            None => return None,
        };
        let field = String::from_utf8_lossy(&rest[..terminator]).into_owned();
        self.offset += terminator + 1;
        Some(field)
    }
}

/// Strip one pair of surrounding double quotes from each quoted value.
pub fn unquote_values(values: &mut [String]) {
    for value in values.iter_mut() {
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            *value = value[1..value.len() - 1].to_owned();
        }
    }
}

/// Argument string handed to the engine after the command name.
pub fn join_arguments<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}
