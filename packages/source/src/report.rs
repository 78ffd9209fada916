//! Per-run log context.
//!
//! A [`Reporter`] is created for each job run and passed by reference to
//! every phase, so each line carries the dataset id, the phase and, where
//! relevant, the period:
//!
//! ```text
//! [cvm_fi_inf_diario][fetch][2024-12] downloaded inf_diario_fi_202412.zip (41.3 MB)
//! ```

use std::fmt::Display;

use log::Level;
use strum_macros::{AsRefStr, Display};

/// Stage of a run a log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    /// Resolving the dataset definition and storage backend.
    Config,
    /// Scraping the listing page.
    List,
    /// Applying the recency bound.
    Select,
    /// Downloading a resource.
    Fetch,
    /// Uploading a resource.
    Upload,
    /// Header-only size checks.
    Probe,
    /// Building the manifest document.
    Manifest,
    /// Uploading the manifest.
    Publish,
}

/// Log handle scoped to one dataset run.
#[derive(Debug, Clone)]
pub struct Reporter {
    dataset_id: String,
}

impl Reporter {
    /// Creates a reporter for `dataset_id`.
    #[must_use]
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
        }
    }

    /// Dataset this reporter belongs to.
    #[must_use]
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    /// Logs `message` at `level`.
    pub fn log(&self, level: Level, phase: Phase, period: Option<&str>, message: impl Display) {
        match period {
            Some(period) if !period.is_empty() => {
                log::log!(level, "[{}][{phase}][{period}] {message}", self.dataset_id);
            }
            _ => log::log!(level, "[{}][{phase}] {message}", self.dataset_id),
        }
    }

    /// Logs at `info`.
    pub fn info(&self, phase: Phase, message: impl Display) {
        self.log(Level::Info, phase, None, message);
    }

    /// Logs at `warn`.
    pub fn warn(&self, phase: Phase, message: impl Display) {
        self.log(Level::Warn, phase, None, message);
    }

    /// Logs at `debug`.
    pub fn debug(&self, phase: Phase, message: impl Display) {
        self.log(Level::Debug, phase, None, message);
    }

    /// Logs at `info` for one period.
    pub fn info_for(&self, phase: Phase, period: &str, message: impl Display) {
        self.log(Level::Info, phase, Some(period), message);
    }

    /// Logs at `warn` for one period.
    pub fn warn_for(&self, phase: Phase, period: &str, message: impl Display) {
        self.log(Level::Warn, phase, Some(period), message);
    }

    /// Logs at `error` for one period.
    pub fn error_for(&self, phase: Phase, period: &str, message: impl Display) {
        self.log(Level::Error, phase, Some(period), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_render_snake_case() {
        assert_eq!(Phase::Publish.to_string(), "publish");
        assert_eq!(Phase::List.as_ref(), "list");
    }
}
