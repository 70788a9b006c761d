use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::OutputMessageMode;

pub const CONFIG_DIR_NAME: &str = "filter-bridge";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const LANGUAGE_ENV: &str = "FILTER_BRIDGE_LANG";
const LOCALE_ENVS: [&str; 3] = ["LC_ALL", "LC_MESSAGES", "LANG"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Catalog language tag such as `fr`. Locale variables are used when unset.
    pub language: Option<String>,
    pub output_message_mode: OutputMessageMode,
    pub image_scale: f32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            language: None,
            output_message_mode: OutputMessageMode::Quiet,
            image_scale: 1.0,
        }
    }
}

impl BridgeConfig {
    /// Load `explicit` if given, otherwise the per-user config file.
    ///
    /// A missing per-user file yields defaults; a missing explicit file is an
    /// error. The language is then resolved against the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => load_file(path)?,
            None => match default_config_path() {
                Ok(path) if path.is_file() => load_file(&path)?,
                _ => Self::default(),
            },
        };
        config.language = resolve_language(config.language.take(), |key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.image_scale.is_finite() || self.image_scale <= 0.0 {
            bail!(
                "image_scale must be a positive finite number, got {}",
                self.image_scale
            );
        }
        Ok(())
    }
}

pub fn load_file(path: &Path) -> Result<BridgeConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(BridgeConfig::default());
    }
    let config: BridgeConfig = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;
    config.validate()?;
    Ok(config)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(user_config_dir()?
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn user_config_dir() -> Result<PathBuf> {
    if let Some(path) = env::var_os("XDG_CONFIG_HOME").filter(|path| !path.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Some(home) = env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".config"));
    }
    bail!("unable to resolve user config directory")
}

/// `FILTER_BRIDGE_LANG` wins over the configured language, which wins over
/// the locale variables.
pub fn resolve_language<F>(configured: Option<String>, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(language) = lookup(LANGUAGE_ENV).and_then(|value| language_tag(&value)) {
        return Some(language);
    }
    if let Some(language) = configured.as_deref().and_then(language_tag) {
        return Some(language);
    }
    LOCALE_ENVS
        .iter()
        .filter_map(|key| lookup(*key))
        .find_map(|value| language_tag(&value))
}

/// Reduce a locale such as `fr_FR.UTF-8` to its language tag.
fn language_tag(locale: &str) -> Option<String> {
    let tag = locale
        .trim()
        .split(&['_', '.', '@', '-'][..])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if tag.is_empty() || tag == "c" || tag == "posix" {
        return None;
    }
    Some(tag)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_snake_case_message_mode() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "language: de\noutput_message_mode: very_verbose_console\nimage_scale: 0.5\n",
        )
        .expect("config should be written");
        let config = load_file(&path).expect("config should load");
        assert_eq!(config.language.as_deref(), Some("de"));
        assert_eq!(
            config.output_message_mode,
            OutputMessageMode::VeryVerboseConsole
        );
        assert_eq!(config.image_scale, 0.5);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "language: fr\n").expect("config should be written");
        let config = load_file(&path).expect("config should load");
        assert_eq!(config.output_message_mode, OutputMessageMode::Quiet);
        assert_eq!(config.image_scale, 1.0);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "langauge: fr\n").expect("config should be written");
        let error = load_file(&path).expect_err("typo should be rejected");
        assert!(error.to_string().contains("langauge"), "{error}");
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        let config = BridgeConfig {
            image_scale: 0.0,
            ..BridgeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn language_precedence() {
        assert_eq!(
            resolve_language(
                Some("de".to_owned()),
                env_of(&[(LANGUAGE_ENV, "ja"), ("LANG", "fr_FR.UTF-8")])
            )
            .as_deref(),
            Some("ja")
        );
        assert_eq!(
            resolve_language(Some("de".to_owned()), env_of(&[("LANG", "fr_FR.UTF-8")])).as_deref(),
            Some("de")
        );
        assert_eq!(
            resolve_language(None, env_of(&[("LC_ALL", "C"), ("LANG", "fr_FR.UTF-8")])).as_deref(),
            Some("fr")
        );
        assert_eq!(resolve_language(None, env_of(&[("LANG", "POSIX")])), None);
    }
}
