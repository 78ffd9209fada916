//! EIA tables of data series (Petroleum Supply Monthly).
//!
//! The listing page is a table of series titles, each linking to a
//! `/dnav/pet/` series page. The download itself is only on the series
//! page, so every link costs one extra request. A series page that fails to
//! load or has no spreadsheet link is reported as unresolved and the rest of
//! the table is still listed.

use std::collections::BTreeSet;

use async_trait::async_trait;
use forest_pipelines_fetch::Fetcher;
use forest_pipelines_source_models::{
    CURRENT_PERIOD, Candidate, ListingResult, UnresolvedLink, filename_from_url,
};
use scraper::Html;

use crate::{ListingError, Phase, Reporter, ResourceLister, dedup_candidates, html};

const TABLE: &str = "div.basic-table table";
const SERIES_LINKS: &str = "div.basic-table table tbody tr td a[href*='/dnav/pet/']";

/// A series link on the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesLink {
    /// Link text.
    pub title: String,
    /// Absolute URL of the series page.
    pub url: String,
}

/// Lister for EIA series tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EiaSeriesTableLister;

/// Series links of the listing page, in page order without duplicates.
///
/// # Errors
///
/// Returns [`ListingError::StructuralDrift`] if the page has no series
/// table.
pub fn series_links(page_url: &str, page: &str) -> Result<Vec<SeriesLink>, ListingError> {
    let table = html::selector(TABLE)?;
    let anchors = html::selector(SERIES_LINKS)?;
    let document = Html::parse_document(page);

    if document.select(&table).next().is_none() {
        return Err(ListingError::StructuralDrift {
            url: page_url.to_string(),
            expected: format!("a '{TABLE}' element"),
        });
    }

    let mut seen = BTreeSet::new();
    let mut links = Vec::new();
    for a in document.select(&anchors) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let url = html::join(page_url, href)?;
        if seen.insert(url.clone()) {
            links.push(SeriesLink {
                title: html::text_of(&a),
                url,
            });
        }
    }
    Ok(links)
}

/// Spreadsheet download link of a series page.
///
/// Prefers the "Download Series History" breadcrumb and falls back to any
/// link ending in `.xls`.
///
/// # Errors
///
/// Returns [`ListingError::Pattern`] if an href cannot be resolved.
pub fn download_link(page_url: &str, page: &str) -> Result<Option<String>, ListingError> {
    let crumbs = html::selector("a.crumb[href]")?;
    let anchors = html::selector("a[href]")?;
    let document = Html::parse_document(page);

    let crumb = document.select(&crumbs).find(|a| {
        html::text_of(a).contains("Download Series History")
            || a.value().attr("href").is_some_and(|h| h.contains(".xls"))
    });
    let link = crumb.or_else(|| {
        document.select(&anchors).find(|a| {
            a.value()
                .attr("href")
                .is_some_and(|h| h.trim().to_ascii_lowercase().ends_with(".xls"))
        })
    });

    link.and_then(|a| a.value().attr("href"))
        .map(|href| html::join(page_url, href))
        .transpose()
}

#[async_trait]
impl ResourceLister for EiaSeriesTableLister {
    fn kind(&self) -> &'static str {
        "eia_series_table"
    }

    async fn list(
        &self,
        page_url: &str,
        fetcher: &Fetcher,
        reporter: &Reporter,
    ) -> Result<ListingResult, ListingError> {
        let page = fetcher.fetch_text(page_url).await?;
        let links = series_links(page_url, &page)?;
        reporter.info(Phase::List, format!("{} series links", links.len()));

        let mut result = ListingResult::default();
        for link in links {
            reporter.debug(Phase::List, format!("indexing {}", link.title));

            let resolved = match fetcher.fetch_text(&link.url).await {
                Ok(sub_page) => download_link(&link.url, &sub_page),
                Err(e) => {
                    reporter.warn(Phase::List, format!("skipping '{}': {e}", link.title));
                    result.unresolved.push(UnresolvedLink {
                        title: Some(link.title),
                        source_url: link.url,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match resolved {
                Ok(Some(url)) => {
                    let filename = filename_from_url(&url);
                    result.candidates.push(
                        Candidate::data(url, CURRENT_PERIOD)
                            .with_slot(filename)
                            .with_title(link.title)
                            .with_source_url(link.url),
                    );
                }
                Ok(None) => {
                    reporter.warn(
                        Phase::List,
                        format!("skipping '{}': no download link on series page", link.title),
                    );
                    result.unresolved.push(UnresolvedLink {
                        title: Some(link.title),
                        source_url: link.url,
                        reason: "no download link on series page".to_string(),
                    });
                }
                Err(e) => {
                    reporter.warn(Phase::List, format!("skipping '{}': {e}", link.title));
                    result.unresolved.push(UnresolvedLink {
                        title: Some(link.title),
                        source_url: link.url,
                        reason: e.to_string(),
                    });
                }
            }
        }

        result.candidates = dedup_candidates(result.candidates);
        Ok(result)
    }
}
