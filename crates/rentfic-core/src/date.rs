//! Publication date detection in extracted report text.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use crate::CoreError;
use crate::config::{Config, ConfigError};

/// Which pattern produced a [`DateMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Primary,
    Fallback,
}

/// A (day, month name, year) triple as it appeared in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMatch {
    pub day: String,
    pub month: String,
    pub year: String,
    pub pattern: PatternKind,
}

/// Primary and fallback publication date patterns, both case-insensitive.
#[derive(Debug, Clone)]
pub struct DateExtractor {
    primary: Regex,
    fallback: Regex,
}

impl DateExtractor {
    pub fn new(primary: &str, fallback: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            primary: compile("date_patterns.primary", primary)?,
            fallback: compile("date_patterns.fallback", fallback)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(&config.date_patterns.primary, &config.date_patterns.fallback)
    }

    /// Find the first publication date anywhere in `text`.
    ///
    /// Returns `None` when neither pattern matches; that is a normal outcome,
    /// not an error.
    pub fn extract_date(&self, text: &str) -> Option<DateMatch> {
        if let Some(found) = first_match(&self.primary, text, PatternKind::Primary) {
            return Some(found);
        }
        let found = first_match(&self.fallback, text, PatternKind::Fallback)?;
        log::info!("Publication date found with the fallback pattern");
        Some(found)
    }
}

fn compile(key: &str, pattern: &str) -> Result<Regex, ConfigError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::Invalid(format!("{key} is not a valid regex: {e}")))?;
    // captures_len counts the implicit whole-match group
    if regex.captures_len() < 4 {
        return Err(ConfigError::Invalid(format!(
            "{key} needs three capture groups (day, month, year), found {}",
            regex.captures_len() - 1
        )));
    }
    Ok(regex)
}

fn first_match(regex: &Regex, text: &str, pattern: PatternKind) -> Option<DateMatch> {
    let caps = regex.captures(text)?;
    let group = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
    Some(DateMatch {
        day: group(1)?,
        month: group(2)?,
        year: group(3)?,
        pattern,
    })
}

/// Month name → two-digit month number lookup; names are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct MonthTable {
    months: BTreeMap<String, String>,
}

impl MonthTable {
    pub fn new(months: &BTreeMap<String, String>) -> Self {
        Self {
            months: months
                .iter()
                .map(|(name, number)| (name.to_lowercase(), number.clone()))
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.months)
    }

    /// Two-digit month number for a month name.
    pub fn month_number(&self, month: &str) -> Result<&str, CoreError> {
        self.months
            .get(&month.to_lowercase())
            .map(String::as_str)
            .ok_or_else(|| CoreError::UnknownMonth(month.to_string()))
    }

    /// Build the `YYYYMMDD` date key.
    pub fn format_date(&self, day: &str, month: &str, year: &str) -> Result<String, CoreError> {
        let number = self.month_number(month)?;
        Ok(format!("{year}{number}{day:0>2}"))
    }
}
