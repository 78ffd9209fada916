#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resource candidates produced by scraping a dataset's listing page.
//!
//! A [`Candidate`] is transient: it lives for one scrape pass, is filtered
//! by the selection policy, and is either turned into a manifest item or
//! dropped.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Period key of the undated "current" file some sources publish next to
/// their yearly or monthly archives.
pub const CURRENT_PERIOD: &str = "Atual";

/// Whether a candidate is a data file or the dataset's data dictionary.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// A data file for one period.
    Data,
    /// A metadata file (layout, field dictionary).
    Metadata,
}

/// One downloadable resource found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Absolute download URL.
    pub url: String,
    /// Page the download link was found on, when that differs from the
    /// dataset landing page (EIA series pages).
    pub source_url: Option<String>,
    /// Sortable period label: `YYYY`, `YYYY-MM`, `YYYY-MM-DD` or
    /// [`CURRENT_PERIOD`]. Empty for metadata candidates.
    pub period_key: String,
    /// Data or metadata.
    pub role: Role,
    /// Path of the file relative to its period folder, set only by sources
    /// that publish several files per period.
    pub slot: Option<String>,
    /// Display title taken from the listing page.
    pub title: Option<String>,
    /// File name the resource is stored under.
    pub filename: String,
}

impl Candidate {
    /// A data candidate named after the last segment of `url`.
    #[must_use]
    pub fn data(url: impl Into<String>, period_key: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            filename: filename_from_url(&url),
            url,
            source_url: None,
            period_key: period_key.into(),
            role: Role::Data,
            slot: None,
            title: None,
        }
    }

    /// A metadata candidate named after the last segment of `url`.
    #[must_use]
    pub fn metadata(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            filename: filename_from_url(&url),
            url,
            source_url: None,
            period_key: String::new(),
            role: Role::Metadata,
            slot: None,
            title: None,
        }
    }

    /// Sets the slot.
    #[must_use]
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Sets the display title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the page the link was found on.
    #[must_use]
    pub fn with_source_url(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = Some(source_url.into());
        self
    }

    /// Overrides the stored file name.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Path of the stored file relative to its period folder.
    #[must_use]
    pub fn relative_path(&self) -> &str {
        self.slot.as_deref().unwrap_or(&self.filename)
    }

    /// `true` for the undated current-file candidate.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.period_key == CURRENT_PERIOD
    }

    /// `(role, period_key, slot)` identity used for deduplication.
    #[must_use]
    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            role: self.role,
            period_key: self.period_key.clone(),
            slot: self.slot.clone(),
        }
    }
}

/// Identity of a candidate within one scrape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidateKey {
    /// Data or metadata.
    pub role: Role,
    /// Period key.
    pub period_key: String,
    /// Path within the period folder, for multi-file periods.
    pub slot: Option<String>,
}

/// Everything a lister found on one listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingResult {
    /// Candidates in page order.
    pub candidates: Vec<Candidate>,
    /// Page-level facts (release dates, week ending) merged into the
    /// manifest `meta` object.
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// Links found on the page that could not be resolved to a download.
    pub unresolved: Vec<UnresolvedLink>,
}

/// A listing link that should have produced a candidate but did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedLink {
    /// Link text, when the page gives one.
    pub title: Option<String>,
    /// Page that was being resolved.
    pub source_url: String,
    /// Why no download was found.
    pub reason: String,
}

impl ListingResult {
    /// Data candidates only.
    pub fn data(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.role == Role::Data)
    }

    /// Metadata candidates only.
    pub fn metadata(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.role == Role::Metadata)
    }
}

/// Last path segment of `url`, ignoring any query string or fragment.
#[must_use]
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}
