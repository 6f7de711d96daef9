//! Loader for the daemon's INI-like configuration files (spec §6):
//! `plymouthd.conf` and `plymouthd.defaults`, both `[Section] Key=Value`
//! with no nesting. Theme `.plymouth` files (spec §4.7) share the same
//! grammar and are parsed with the same type.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// A parsed INI-like document: section name -> (key -> value), plus a
/// top-level (no-section) bucket for lines that precede any `[Section]`
/// header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl IniDocument {
    pub fn parse(text: &str) -> Result<Self> {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut current = String::new();
        sections.entry(current.clone()).or_default();

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') {
                let Some(end) = line.find(']') else {
                    return Err(Error::config(format!(
                        "line {}: unterminated section header",
                        lineno + 1
                    )));
                };
                current = line[1..end].trim().to_string();
                sections.entry(current.clone()).or_default();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::config(format!(
                    "line {}: expected `Key=Value`, got {:?}",
                    lineno + 1,
                    line
                )));
            };
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self { sections })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    pub fn get_f64(&self, section: &str, key: &str) -> Option<f64> {
        self.get(section, key)?.parse().ok()
    }
}

/// `[Daemon]` section settings common to `plymouthd.conf` and
/// `plymouthd.defaults` (spec §6).
#[derive(Debug, Clone, Default)]
pub struct DaemonSettings {
    pub theme: Option<String>,
    pub show_delay: Option<f64>,
}

impl DaemonSettings {
    pub fn from_document(doc: &IniDocument) -> Self {
        Self {
            theme: doc.get("Daemon", "Theme").map(str::to_string),
            show_delay: doc.get_f64("Daemon", "ShowDelay"),
        }
    }

    /// Merge `self` over `fallback`: any field `self` leaves unset is taken
    /// from `fallback`. Used to implement `plymouthd.conf` falling back to
    /// `plymouthd.defaults` per spec §4.9/§7.
    pub fn or(self, fallback: DaemonSettings) -> Self {
        Self {
            theme: self.theme.or(fallback.theme),
            show_delay: self.show_delay.or(fallback.show_delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_daemon_section() {
        let doc = IniDocument::parse("[Daemon]\nTheme=spinner\nShowDelay=0.5\n").unwrap();
        assert_eq!(doc.get("Daemon", "Theme"), Some("spinner"));
        assert_eq!(doc.get_f64("Daemon", "ShowDelay"), Some(0.5));
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let doc = IniDocument::parse("# comment\n\n[Daemon]\n; also comment\nTheme=x\n").unwrap();
        assert_eq!(doc.get("Daemon", "Theme"), Some("x"));
    }

    #[test]
    fn rejects_malformed_line() {
        let err = IniDocument::parse("[Daemon]\nnotakeyvalue\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn settings_fall_back_to_defaults() {
        let conf = DaemonSettings {
            theme: None,
            show_delay: Some(1.0),
        };
        let defaults = DaemonSettings {
            theme: Some("text".to_string()),
            show_delay: Some(2.0),
        };
        let merged = conf.or(defaults);
        assert_eq!(merged.theme.as_deref(), Some("text"));
        assert_eq!(merged.show_delay, Some(1.0));
    }
}
