//! CKAN dataset pages (dados.cvm.gov.br).
//!
//! Every resource on a CKAN dataset page has a direct download anchor
//! carrying the `resource-url-analytics` class. Files are classified by
//! name: a metadata pattern, an optional undated current file, an optional
//! fixed single file, and a dated pattern.

use async_trait::async_trait;
use forest_pipelines_fetch::Fetcher;
use forest_pipelines_source_models::{
    CURRENT_PERIOD, Candidate, ListingResult, filename_from_url,
};
use regex::Regex;
use scraper::{Html, Selector};

use crate::period::{PeriodPattern, compile};
use crate::{ConfigError, ListingError, Phase, Reporter, ResourceLister};

/// Lister for CKAN dataset pages.
#[derive(Debug, Clone)]
pub struct CkanLister {
    selector: Selector,
    selector_css: String,
    data_pattern: Option<PeriodPattern>,
    current_filename: Option<String>,
    data_filename: Option<String>,
    meta_pattern: Option<Regex>,
}

impl CkanLister {
    /// Creates a lister.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the selector does not parse
    /// or a pattern does not compile.
    pub fn new(
        selector: &str,
        data_pattern: Option<&str>,
        current_filename: Option<&str>,
        data_filename: Option<&str>,
        meta_pattern: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let parsed = Selector::parse(selector).map_err(|e| ConfigError::InvalidPattern {
            pattern: selector.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            selector: parsed,
            selector_css: selector.to_string(),
            data_pattern: data_pattern.map(PeriodPattern::new).transpose()?,
            current_filename: current_filename.map(str::to_ascii_lowercase),
            data_filename: data_filename.map(str::to_ascii_lowercase),
            meta_pattern: meta_pattern.map(compile).transpose()?,
        })
    }

    /// Absolute `http(s)` hrefs of the marker anchors, deduplicated and
    /// sorted.
    #[must_use]
    pub fn resource_urls(&self, page: &str) -> Vec<String> {
        let document = Html::parse_document(page);

        let mut urls: Vec<String> = document
            .select(&self.selector)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| href.starts_with("http"))
            .map(ToString::to_string)
            .collect();
        urls.sort_unstable();
        urls.dedup();
        urls
    }

    /// Classifies one download URL, or `None` if it is irrelevant.
    #[must_use]
    pub fn classify(&self, url: &str) -> Option<Candidate> {
        let filename = filename_from_url(url);
        let lower = filename.to_ascii_lowercase();

        if self.meta_pattern.as_ref().is_some_and(|re| re.is_match(&filename)) {
            return Some(Candidate::metadata(url));
        }
        if self.current_filename.as_deref() == Some(lower.as_str())
            || self.data_filename.as_deref() == Some(lower.as_str())
        {
            return Some(Candidate::data(url, CURRENT_PERIOD));
        }
        let period = self.data_pattern.as_ref()?.period_of(&filename)?;
        Some(Candidate::data(url, period))
    }
}

#[async_trait]
impl ResourceLister for CkanLister {
    fn kind(&self) -> &'static str {
        "ckan"
    }

    async fn list(
        &self,
        page_url: &str,
        fetcher: &Fetcher,
        reporter: &Reporter,
    ) -> Result<ListingResult, ListingError> {
        let page = fetcher.fetch_text(page_url).await?;
        let urls = self.resource_urls(&page);

        if urls.is_empty() {
            return Err(ListingError::StructuralDrift {
                url: page_url.to_string(),
                expected: format!("resource anchors matching '{}'", self.selector_css),
            });
        }

        let candidates: Vec<Candidate> = urls.iter().filter_map(|u| self.classify(u)).collect();

        if let Some(fixed) = &self.data_filename
            && !candidates.iter().any(|c| c.filename.eq_ignore_ascii_case(fixed))
        {
            return Err(ListingError::StructuralDrift {
                url: page_url.to_string(),
                expected: format!("a resource named '{fixed}'"),
            });
        }

        let result = ListingResult {
            candidates,
            ..ListingResult::default()
        };
        reporter.info(
            Phase::List,
            format!(
                "{} resource links, {} data files, metadata: {}",
                urls.len(),
                result.data().count(),
                if result.metadata().next().is_some() { "yes" } else { "no" },
            ),
        );
        Ok(result)
    }
}
