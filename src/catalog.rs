//! Filter catalog lookup.
//!
//! The catalog is a line-oriented text blob. Folder headers look like
//! `#@gui Folder name`, filter headers like
//! `#@gui Filter name : command, preview_command(factor)`, and the lines that
//! follow a filter header and start with `#@gui :` carry its parameter
//! declarations. Any header may be language-tagged (`#@gui_fr ...`); untagged
//! headers are the default variant.

use std::sync::OnceLock;

use log::{debug, warn};
use regex::Regex;
use serde::Serialize;

use crate::error::FilterError;
use crate::filter_data::FilterIdentity;
use crate::parameter_set::FilterParameterSet;

pub const FALLBACK_LANGUAGE: &str = "en";

const HEADER_MARKER: &str = "#@gui";
const WARNING_PREFIX: char = '!';

/// Preview sizing hint carried by `preview_command(factor[+])`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreviewHint {
    pub factor: Option<f32>,
    pub accurate_if_zoomed: bool,
}

impl Default for PreviewHint {
    fn default() -> Self {
        Self {
            factor: None,
            accurate_if_zoomed: true,
        }
    }
}

/// A filter header as declared in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub identity: FilterIdentity,
    pub warning: bool,
    pub preview: PreviewHint,
}

/// A catalog entry whose parameter block parsed successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterDefinition {
    pub parameters: FilterParameterSet,
    pub warning: bool,
    pub preview: PreviewHint,
}

impl FilterDefinition {
    pub fn identity(&self) -> &FilterIdentity {
        &self.parameters.identity
    }
}

/// Pick the language tag used for header matching.
///
/// The requested two-letter tag is used only when the catalog declares at
/// least one header with it; otherwise lookups fall back to English.
pub fn resolve_language(catalog: &str, requested: Option<&str>) -> String {
    match requested.map(str::trim).filter(|tag| !tag.is_empty()) {
        Some(tag) if catalog.contains(&format!("{HEADER_MARKER}_{tag}")) => tag.to_owned(),
        _ => FALLBACK_LANGUAGE.to_owned(),
    }
}

pub struct CatalogLookup<'a> {
    catalog: &'a str,
    language: String,
    folder_header: Regex,
    filter_header: Regex,
}

enum ScanState {
    Scanning,
    InMatchedBlock {
        entry: CatalogEntry,
        continuation_prefix: String,
        block: String,
    },
    Done(Option<(CatalogEntry, String)>),
}

impl<'a> CatalogLookup<'a> {
    pub fn new(catalog: &'a str, requested_language: Option<&str>) -> Self {
        let language = resolve_language(catalog, requested_language);
        let tag = regex::escape(&language);
        let folder_header = Regex::new(&format!(r"^#@gui(?:_{tag})? [^:]+$"))
            .expect("folder header regex should compile");
        let filter_header = Regex::new(&format!(r"^#@gui(?:_{tag})? [^:]+ *:.*$"))
            .expect("filter header regex should compile");
        Self {
            catalog,
            language,
            folder_header,
            filter_header,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Find the definition of `identity`.
    ///
    /// The first header matching the identity exactly wins. If its parameter
    /// block does not parse, the filter is reported as not found.
    pub fn find(&self, identity: &FilterIdentity) -> Result<FilterDefinition, FilterError> {
        let mut state = ScanState::Scanning;
        let mut lines = self.catalog.split_inclusive('\n');

        while !matches!(state, ScanState::Done(_)) {
            let Some(raw) = lines.next() else {
                state = match state {
                    ScanState::InMatchedBlock { entry, block, .. } => {
                        ScanState::Done(Some((entry, block)))
                    }
                    _ => ScanState::Done(None),
                };
                break;
            };
            state = self.step(state, raw, identity);
        }

        let ScanState::Done(Some((entry, block))) = state else {
            debug!(
                "catalog has no '{}' header for language '{}'",
                identity.name, self.language
            );
            return Err(FilterError::NotFound {
                identity: identity.clone(),
            });
        };

        match FilterParameterSet::build(entry.identity.clone(), &block) {
            Ok(parameters) => Ok(FilterDefinition {
                parameters,
                warning: entry.warning,
                preview: entry.preview,
            }),
            Err(error) => {
                warn!(
                    "rejecting catalog entry '{}': {}",
                    entry.identity.name, error
                );
                Err(FilterError::NotFound {
                    identity: identity.clone(),
                })
            }
        }
    }

    fn step(&self, state: ScanState, raw: &str, identity: &FilterIdentity) -> ScanState {
        match state {
            ScanState::Scanning => {
                let line = raw.trim();
                match self.parse_filter_header(line) {
                    Some(entry) if entry.identity == *identity => {
                        debug!("matched catalog header '{}'", line);
                        ScanState::InMatchedBlock {
                            entry,
                            continuation_prefix: continuation_prefix(line),
                            block: String::new(),
                        }
                    }
                    _ => ScanState::Scanning,
                }
            }
            ScanState::InMatchedBlock {
                entry,
                continuation_prefix,
                mut block,
            } => {
                let bare = raw.trim_end_matches(&['\n', '\r'][..]);
                if raw.starts_with(continuation_prefix.as_str()) {
                    block.push_str(strip_continuation_marker(raw));
                    ScanState::InMatchedBlock {
                        entry,
                        continuation_prefix,
                        block,
                    }
                } else if self.is_header(bare) {
                    ScanState::Done(Some((entry, block)))
                } else if raw.starts_with('#') || bare.trim().is_empty() {
                    ScanState::InMatchedBlock {
                        entry,
                        continuation_prefix,
                        block,
                    }
                } else {
                    ScanState::Done(Some((entry, block)))
                }
            }
            done @ ScanState::Done(_) => done,
        }
    }

    /// Every filter header visible in the active language, in catalog order.
    pub fn filters(&self) -> Vec<CatalogEntry> {
        self.catalog
            .lines()
            .filter_map(|line| self.parse_filter_header(line.trim()))
            .collect()
    }

    fn is_header(&self, line: &str) -> bool {
        self.folder_header.is_match(line) || self.filter_header.is_match(line)
    }

    fn parse_filter_header(&self, line: &str) -> Option<CatalogEntry> {
        if !line.starts_with(HEADER_MARKER) || !self.filter_header.is_match(line) {
            return None;
        }

        let (head, commands) = line.split_once(':')?;
        let mut name = tag_prefix_regex()
            .replace(head.trim_end_matches(' '), "")
            .into_owned();
        let warning = name.starts_with(WARNING_PREFIX);
        if warning {
            name.remove(0);
        }

        let mut tokens = commands.trim_start_matches(' ').split(',');
        let command = tokens.next().unwrap_or_default().trim().to_owned();
        let (preview_command, preview) = parse_preview(tokens.next().unwrap_or_default());

        Some(CatalogEntry {
            identity: FilterIdentity {
                name,
                command,
                preview_command,
            },
            warning,
            preview,
        })
    }
}

fn tag_prefix_regex() -> &'static Regex {
    static TAG_PREFIX_RE: OnceLock<Regex> = OnceLock::new();
    TAG_PREFIX_RE.get_or_init(|| {
        Regex::new(r"^#@gui[_a-zA-Z]{0,3} ").expect("header tag regex should compile")
    })
}

fn strip_continuation_marker(raw: &str) -> &str {
    static CONTINUATION_RE: OnceLock<Regex> = OnceLock::new();
    let re = CONTINUATION_RE.get_or_init(|| {
        Regex::new(r"^#@gui[_a-zA-Z]{0,3} *: *").expect("continuation regex should compile")
    });
    match re.find(raw) {
        Some(marker) => &raw[marker.end()..],
        None => raw,
    }
}

/// `#@gui_fr Name : cmd` continues with lines starting `#@gui_fr :`.
fn continuation_prefix(header: &str) -> String {
    let tag = header.split(' ').next().unwrap_or(header);
    format!("{tag} :")
}

fn parse_preview(token: &str) -> (String, PreviewHint) {
    let mut parts = token.trim().splitn(2, '(');
    let command = parts.next().unwrap_or_default().trim().to_owned();
    let Some(suffix) = parts.next() else {
        return (command, PreviewHint::default());
    };

    let inner = suffix.split(')').next().unwrap_or_default().trim();
    let (factor_text, accurate_if_zoomed) = match inner.strip_suffix('+') {
        Some(factor) => (factor, true),
        None => (inner, false),
    };
    (
        command,
        PreviewHint {
            factor: factor_text.trim().parse::<f32>().ok(),
            accurate_if_zoomed,
        },
    )
}
