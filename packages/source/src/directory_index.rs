//! Plain directory listings and pages of download links.
//!
//! Used for the INPE dataserver (Apache-style index pages) and the INMET
//! historical data page. Every anchor whose last path segment matches the
//! dataset's pattern becomes a dated candidate.

use async_trait::async_trait;
use forest_pipelines_fetch::Fetcher;
use forest_pipelines_source_models::{Candidate, ListingResult, filename_from_url};
use scraper::Html;

use crate::period::PeriodPattern;
use crate::{ConfigError, ListingError, Phase, Reporter, ResourceLister, dedup_candidates, html};

/// Lister for directory-style pages.
#[derive(Debug, Clone)]
pub struct DirectoryIndexLister {
    pattern: PeriodPattern,
}

impl DirectoryIndexLister {
    /// Creates a lister matching file names against `data_pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the pattern does not
    /// compile or has no `year` group.
    pub fn new(data_pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: PeriodPattern::new(data_pattern)?,
        })
    }

    /// Matching candidates on `page`, with hrefs resolved against
    /// `page_url`, in page order without duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::Pattern`] if an href cannot be resolved.
    pub fn candidates(&self, page_url: &str, page: &str) -> Result<Vec<Candidate>, ListingError> {
        let anchors = html::selector("a[href]")?;
        let document = Html::parse_document(page);

        let mut candidates = Vec::new();
        for href in document.select(&anchors).filter_map(|a| a.value().attr("href")) {
            let Some(period) = self.pattern.period_of(&filename_from_url(href)) else {
                continue;
            };
            candidates.push(Candidate::data(html::join(page_url, href)?, period));
        }
        Ok(dedup_candidates(candidates))
    }
}

#[async_trait]
impl ResourceLister for DirectoryIndexLister {
    fn kind(&self) -> &'static str {
        "directory_index"
    }

    async fn list(
        &self,
        page_url: &str,
        fetcher: &Fetcher,
        reporter: &Reporter,
    ) -> Result<ListingResult, ListingError> {
        let page = fetcher.fetch_text(page_url).await?;
        let candidates = self.candidates(page_url, &page)?;
        reporter.info(Phase::List, format!("{} matching files", candidates.len()));

        Ok(ListingResult {
            candidates,
            ..ListingResult::default()
        })
    }
}
