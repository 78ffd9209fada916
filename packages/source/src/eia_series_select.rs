//! EIA series pages with series and frequency drop-downs (heating oil and
//! propane prices).
//!
//! The page has one `<select>` of series (`Drop1`, option values are the
//! weekly page of each series) and one of frequencies (`DropF`). Each
//! combination has its own page carrying the spreadsheet link; monthly
//! pages share the weekly file name with `_m.htm` in place of `_w.htm`.

use std::sync::LazyLock;

use async_trait::async_trait;
use forest_pipelines_fetch::Fetcher;
use forest_pipelines_source_models::{Candidate, ListingResult, UnresolvedLink};
use regex::Regex;
use scraper::Html;
use serde_json::Value;

use crate::eia_series_table::download_link;
use crate::period::{slugify, to_iso_date};
use crate::{ListingError, Phase, Reporter, ResourceLister, dedup_candidates, html};

static SHORT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})").expect("valid regex"));

const SERIES_OPTIONS: &str = "select[name='Drop1'] option";
const FREQUENCY_OPTIONS: &str = "select[name='DropF'] option";

/// Release dates printed on a series page, as `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesDates {
    /// Date of the current release.
    pub release: Option<String>,
    /// Date of the next scheduled release.
    pub next_release: Option<String>,
}

/// One series × frequency page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    /// Absolute URL of the combination page.
    pub url: String,
    /// Stored file name, `{series}_{frequency}.xls`.
    pub filename: String,
    /// Display name, `Series (Frequency)`.
    pub title: String,
}

/// Lister for series drop-down pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct EiaSeriesSelectLister;

fn iso_in(text: &str) -> Option<String> {
    SHORT_DATE_RE
        .captures(text)
        .and_then(|caps| to_iso_date(&caps[1]))
}

/// Parses the release dates and the drop-down combinations.
///
/// # Errors
///
/// Returns [`ListingError::StructuralDrift`] if either drop-down is missing
/// or empty.
pub fn parse_series_page(
    page_url: &str,
    page: &str,
) -> Result<(SeriesDates, Vec<Combination>), ListingError> {
    let update_sel = html::selector("td.Update")?;
    let footnote_sel = html::selector("td.Footnotes")?;
    let series_sel = html::selector(SERIES_OPTIONS)?;
    let frequency_sel = html::selector(FREQUENCY_OPTIONS)?;
    let document = Html::parse_document(page);

    let dates = SeriesDates {
        release: document
            .select(&update_sel)
            .next()
            .and_then(|td| iso_in(&html::text_of(&td))),
        next_release: document
            .select(&footnote_sel)
            .map(|td| html::text_of(&td))
            .find(|text| text.contains("Next Release Date"))
            .and_then(|text| iso_in(&text)),
    };

    let series: Vec<(String, String)> = document
        .select(&series_sel)
        .filter_map(|o| Some((html::text_of(&o), o.value().attr("value")?.trim().to_string())))
        .filter(|(_, value)| !value.is_empty())
        .collect();
    let frequencies: Vec<String> = document
        .select(&frequency_sel)
        .map(|o| html::text_of(&o))
        .collect();

    if series.is_empty() || frequencies.is_empty() {
        return Err(ListingError::StructuralDrift {
            url: page_url.to_string(),
            expected: format!("options in '{SERIES_OPTIONS}' and '{FREQUENCY_OPTIONS}'"),
        });
    }

    let mut combinations = Vec::with_capacity(series.len() * frequencies.len());
    for (series_label, page_part) in &series {
        for frequency_label in &frequencies {
            let frequency = slugify(frequency_label);
            let part = if frequency == "monthly" {
                page_part.replace("_w.htm", "_m.htm")
            } else {
                page_part.clone()
            };
            combinations.push(Combination {
                url: html::join(page_url, &part)?,
                filename: format!("{}_{frequency}.xls", slugify(series_label)),
                title: format!("{series_label} ({frequency_label})"),
            });
        }
    }

    Ok((dates, combinations))
}

#[async_trait]
impl ResourceLister for EiaSeriesSelectLister {
    fn kind(&self) -> &'static str {
        "eia_series_select"
    }

    async fn list(
        &self,
        page_url: &str,
        fetcher: &Fetcher,
        reporter: &Reporter,
    ) -> Result<ListingResult, ListingError> {
        let page = fetcher.fetch_text(page_url).await?;
        let (dates, combinations) = parse_series_page(page_url, &page)?;

        let period = dates.release.clone().ok_or_else(|| ListingError::StructuralDrift {
            url: page_url.to_string(),
            expected: "a release date in 'td.Update'".to_string(),
        })?;
        reporter.info_for(
            Phase::List,
            &period,
            format!("{} series combinations", combinations.len()),
        );

        let mut result = ListingResult::default();
        for combination in combinations {
            let resolved = match fetcher.fetch_text(&combination.url).await {
                Ok(sub_page) => download_link(&combination.url, &sub_page).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match resolved {
                Ok(Some(url)) => result.candidates.push(
                    Candidate::data(url, period.clone())
                        .with_filename(combination.filename.clone())
                        .with_slot(combination.filename)
                        .with_title(combination.title)
                        .with_source_url(combination.url),
                ),
                Ok(None) => {
                    reporter.warn(Phase::List, format!("no spreadsheet link for {}", combination.title));
                    result.unresolved.push(UnresolvedLink {
                        title: Some(combination.title),
                        source_url: combination.url,
                        reason: "no spreadsheet link on series page".to_string(),
                    });
                }
                Err(reason) => {
                    reporter.warn(Phase::List, format!("skipping {}: {reason}", combination.title));
                    result.unresolved.push(UnresolvedLink {
                        title: Some(combination.title),
                        source_url: combination.url,
                        reason,
                    });
                }
            }
        }

        result.candidates = dedup_candidates(result.candidates);
        result.meta.insert("last_release_iso".to_string(), Value::String(period));
        result.meta.insert(
            "next_release_iso".to_string(),
            dates.next_release.map_or(Value::Null, Value::String),
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use forest_pipelines_fetch::RetryPolicy;
    use forest_pipelines_fetch::test_server::{Reply, TestServer};

    use super::*;

    const SERIES_PAGE: &str = r#"
        <html><body>
        <form>
          <select name="Drop1">
            <option value="pet_pri_wfr_a_EPD2F_prs_dpgal_w.htm" selected>Residential Heating Oil</option>
            <option value="pet_pri_wfr_a_EPLLPA_prs_dpgal_w.htm">Residential Propane</option>
          </select>
          <select name="DropF">
            <option value="w">Weekly</option>
            <option value="m">Monthly</option>
          </select>
        </form>
        <table>
          <tr><td class="Update">Release Date: 12/31/2025</td></tr>
          <tr><td class="Footnotes">Data are collected October through March.</td></tr>
          <tr><td class="Footnotes">Next Release Date: 1/7/2026</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn reads_release_dates_as_iso() {
        let (dates, _) = parse_series_page("https://www.eia.gov/dnav/pet/x_w.htm", SERIES_PAGE).unwrap();
        assert_eq!(dates.release.as_deref(), Some("2025-12-31"));
        assert_eq!(dates.next_release.as_deref(), Some("2026-01-07"));
    }

    #[test]
    fn builds_every_series_frequency_combination() {
        let (_, combinations) = parse_series_page(
            "https://www.eia.gov/dnav/pet/pet_pri_wfr_a_EPD2F_prs_dpgal_w.htm",
            SERIES_PAGE,
        )
        .unwrap();

        assert_eq!(combinations.len(), 4);
        assert_eq!(combinations[0].filename, "residential_heating_oil_weekly.xls");
        assert_eq!(combinations[1].filename, "residential_heating_oil_monthly.xls");
        assert_eq!(
            combinations[1].url,
            "https://www.eia.gov/dnav/pet/pet_pri_wfr_a_EPD2F_prs_dpgal_m.htm"
        );
        assert_eq!(combinations[3].title, "Residential Propane (Monthly)");
    }

    #[test]
    fn missing_drop_downs_is_structural_drift() {
        let err = parse_series_page("https://www.eia.gov/x", "<td class=\"Update\">1/1/2026</td>").unwrap_err();
        assert!(matches!(err, ListingError::StructuralDrift { .. }));
    }

    #[tokio::test]
    async fn resolves_each_combination_page() {
        let server = TestServer::bind().await;
        server.route("/dnav/pet/pet_pri_wfr_a_EPD2F_prs_dpgal_w.htm", vec![Reply::ok(SERIES_PAGE)]);
        server.route(
            "/dnav/pet/pet_pri_wfr_a_EPD2F_prs_dpgal_m.htm",
            vec![Reply::ok(r#"<a href="hist_xls/EMA_EPD2F_PRS_DPGAL_M.xls">Download</a>"#)],
        );
        server.route(
            "/dnav/pet/pet_pri_wfr_a_EPLLPA_prs_dpgal_w.htm",
            vec![Reply::ok(r#"<a href="hist_xls/W_EPLLPA_PRS_DPGAL_W.xls">Download</a>"#)],
        );
        server.route(
            "/dnav/pet/pet_pri_wfr_a_EPLLPA_prs_dpgal_m.htm",
            vec![Reply::ok("<p>No data</p>")],
        );
        let fetcher = Fetcher::new(RetryPolicy::immediate(1)).unwrap();

        let result = EiaSeriesSelectLister
            .list(
                &server.url("/dnav/pet/pet_pri_wfr_a_EPD2F_prs_dpgal_w.htm"),
                &fetcher,
                &Reporter::new("t"),
            )
            .await
            .unwrap();

        // The weekly heating oil page is the listing page itself, which has
        // no spreadsheet link in this fixture.
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.unresolved.len(), 2);
        let c = &result.candidates[0];
        assert_eq!(c.period_key, "2025-12-31");
        assert_eq!(c.filename, "residential_heating_oil_monthly.xls");
        assert_eq!(c.slot.as_deref(), Some("residential_heating_oil_monthly.xls"));
        assert_eq!(c.url, server.url("/dnav/pet/hist_xls/EMA_EPD2F_PRS_DPGAL_M.xls"));
        assert_eq!(result.meta["last_release_iso"], "2025-12-31");
        assert_eq!(result.meta["next_release_iso"], "2026-01-07");
    }
}
