//! EIA Weekly Petroleum Status Report.
//!
//! The report page lists its tables in rows with one column of files per
//! release time: columns 2 and 3 are published at 10:30 AM, column 4 at
//! 1:00 PM. Every file of one release shares the release date as its period
//! and is told apart by a `{time}/{filename}` slot.

use async_trait::async_trait;
use forest_pipelines_fetch::Fetcher;
use forest_pipelines_source_models::{Candidate, ListingResult, filename_from_url};
use scraper::{ElementRef, Html};
use serde_json::Value;

use crate::period::release_period;
use crate::{ListingError, Phase, Reporter, ResourceLister, dedup_candidates, html};

const RELEASE_DATES: &str = ".release-dates";
const TABLES: &str = "div.basic-table table";

/// Slot folder of files released at 10:30 AM.
pub const MORNING_RELEASE: &str = "1030AM";
/// Slot folder of files released at 1:00 PM.
pub const AFTERNOON_RELEASE: &str = "0100PM";

/// Dates printed in the report header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseDates {
    /// "Data for week ending" date.
    pub week_ending: String,
    /// Date of the current release.
    pub release_date: String,
    /// Date of the next scheduled release.
    pub next_release_date: String,
}

/// A file link in the report table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFile {
    /// Title of the table row.
    pub title: String,
    /// Absolute download URL.
    pub url: String,
    /// [`MORNING_RELEASE`] or [`AFTERNOON_RELEASE`].
    pub release_time: &'static str,
}

/// Lister for the weekly report page.
#[derive(Debug, Clone, Copy, Default)]
pub struct EiaReleaseTableLister;

fn date_of(span: &ElementRef<'_>) -> Result<String, ListingError> {
    let date = html::selector(".date")?;
    Ok(span
        .select(&date)
        .next()
        .map(|d| html::text_of(&d))
        .unwrap_or_default())
}

/// Parses the report page into its header dates and file links.
///
/// # Errors
///
/// Returns [`ListingError::StructuralDrift`] if the release-dates header or
/// the report tables are missing.
pub fn parse_report(
    page_url: &str,
    page: &str,
) -> Result<(ReleaseDates, Vec<ReleaseFile>), ListingError> {
    let header_sel = html::selector(RELEASE_DATES)?;
    let span_sel = html::selector(".responsive-container")?;
    let table_sel = html::selector(TABLES)?;
    let row_sel = html::selector("tbody tr")?;
    let cell_sel = html::selector("td")?;
    let link_sel = html::selector("a[href]")?;
    let document = Html::parse_document(page);

    let header = document
        .select(&header_sel)
        .next()
        .ok_or_else(|| ListingError::StructuralDrift {
            url: page_url.to_string(),
            expected: format!("a '{RELEASE_DATES}' header"),
        })?;

    let mut dates = ReleaseDates::default();
    for span in header.select(&span_sel) {
        let text = html::text_of(&span);
        if let Some(idx) = text.find("Data for week ending") {
            dates.week_ending = text[idx + "Data for week ending".len()..].trim().to_string();
        } else if text.contains("Next Release Date") {
            dates.next_release_date = date_of(&span)?;
        } else if text.contains("Release Date") {
            dates.release_date = date_of(&span)?;
        }
    }

    let tables: Vec<ElementRef<'_>> = document.select(&table_sel).collect();
    if tables.is_empty() {
        return Err(ListingError::StructuralDrift {
            url: page_url.to_string(),
            expected: format!("'{TABLES}' report tables"),
        });
    }

    let mut files = Vec::new();
    for row in tables.iter().flat_map(|t| t.select(&row_sel)) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        if cells.len() < 5 {
            continue;
        }
        let title = html::text_of(&cells[1]);
        let columns = [
            (2, MORNING_RELEASE),
            (3, MORNING_RELEASE),
            (4, AFTERNOON_RELEASE),
        ];
        for (idx, release_time) in columns {
            let Some(href) = cells[idx]
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                continue;
            };
            files.push(ReleaseFile {
                title: title.clone(),
                url: html::join(page_url, href)?,
                release_time,
            });
        }
    }

    Ok((dates, files))
}

#[async_trait]
impl ResourceLister for EiaReleaseTableLister {
    fn kind(&self) -> &'static str {
        "eia_release_table"
    }

    async fn list(
        &self,
        page_url: &str,
        fetcher: &Fetcher,
        reporter: &Reporter,
    ) -> Result<ListingResult, ListingError> {
        let page = fetcher.fetch_text(page_url).await?;
        let (dates, files) = parse_report(page_url, &page)?;

        if dates.release_date.is_empty() {
            return Err(ListingError::StructuralDrift {
                url: page_url.to_string(),
                expected: "a release date in the report header".to_string(),
            });
        }
        let period = release_period(&dates.release_date);
        reporter.info_for(
            Phase::List,
            &period,
            format!(
                "release {} (week ending {}), {} files",
                dates.release_date,
                dates.week_ending,
                files.len()
            ),
        );

        let candidates = files
            .into_iter()
            .map(|file| {
                let slot = format!("{}/{}", file.release_time, filename_from_url(&file.url));
                Candidate::data(file.url, period.clone())
                    .with_slot(slot)
                    .with_title(file.title)
            })
            .collect();

        let mut meta = serde_json::Map::new();
        meta.insert("last_eia_update".to_string(), Value::String(dates.release_date));
        meta.insert("week_ending".to_string(), Value::String(dates.week_ending));
        meta.insert("next_release".to_string(), Value::String(dates.next_release_date));

        Ok(ListingResult {
            candidates: dedup_candidates(candidates),
            meta,
            unresolved: Vec::new(),
        })
    }
}
