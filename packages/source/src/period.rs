//! Period keys.
//!
//! Period keys are zero-padded strings (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`) so
//! that lexical order is chronological order.

use chrono::NaiveDate;
use regex::Regex;

use crate::ConfigError;

/// A file-name regex that yields a period key.
///
/// The pattern must have a named `year` group and may have `month` and
/// `day` groups.
#[derive(Debug, Clone)]
pub struct PeriodPattern {
    regex: Regex,
}

impl PeriodPattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the regex does not compile
    /// or has no `year` group.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        if !regex.capture_names().flatten().any(|n| n == "year") {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "missing named group 'year'".to_string(),
            });
        }

        Ok(Self { regex })
    }

    /// Period key of `filename`, or `None` if it does not match.
    #[must_use]
    pub fn period_of(&self, filename: &str) -> Option<String> {
        let caps = self.regex.captures(filename)?;
        let year = caps.name("year")?.as_str();
        Some(match (caps.name("month"), caps.name("day")) {
            (Some(month), Some(day)) => format!("{year}-{}-{}", month.as_str(), day.as_str()),
            (Some(month), None) => format!("{year}-{}", month.as_str()),
            _ => year.to_string(),
        })
    }
}

/// Compiles a plain (non-period) file-name regex.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPattern`] if the regex does not compile.
pub fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%m/%d/%Y", "%Y-%m-%d", "%B %e, %Y"];

/// Normalizes a human-written date (`January 8, 2025`, `1/8/2025`) to
/// `YYYY-MM-DD`.
#[must_use]
pub fn to_iso_date(text: &str) -> Option<String> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Period key for a release date: ISO when parseable, otherwise a path-safe
/// form of the text (`Dec 31, 2025` -> `Dec_31_2025`).
#[must_use]
pub fn release_period(text: &str) -> String {
    to_iso_date(text).unwrap_or_else(|| {
        text.replace(',', "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
    })
}

/// Lowercase `a-z0-9_` form of a display label.
#[must_use]
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}
