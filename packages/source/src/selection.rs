//! Recency-bounded selection of candidates.
//!
//! Dated candidates are ordered newest first by their period key (lexical
//! order is chronological for zero-padded keys) and cut to the `N` most
//! recent distinct periods. The undated [`CURRENT_PERIOD`] candidate is not
//! subject to the cutoff and is placed ahead of the dated ones.
//!
//! [`CURRENT_PERIOD`]: forest_pipelines_source_models::CURRENT_PERIOD

use std::collections::BTreeSet;

use forest_pipelines_source_models::{Candidate, Role};

use crate::dataset_def::Recency;
use crate::dedup_candidates;

/// What a run will sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Data candidates, current file first, then newest period first.
    pub data: Vec<Candidate>,
    /// The dataset's metadata file, if the listing had one.
    pub metadata: Option<Candidate>,
}

impl Selection {
    /// Distinct period keys of the selected data, in selection order.
    #[must_use]
    pub fn periods(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.data
            .iter()
            .map(|c| c.period_key.as_str())
            .filter(|p| seen.insert(*p))
            .collect()
    }
}

/// Number of dated periods to keep: the explicit bound if given, otherwise
/// the dataset default, otherwise all (`None`).
#[must_use]
pub const fn effective_limit(latest: Option<usize>, default: Recency) -> Option<usize> {
    match latest {
        Some(n) => Some(n),
        None => default.limit(),
    }
}

/// Selects the candidates to sync.
///
/// `limit` bounds the number of distinct dated periods; `None` keeps all.
/// When `include_current` is false the undated current file is dropped.
#[must_use]
pub fn select(candidates: Vec<Candidate>, limit: Option<usize>, include_current: bool) -> Selection {
    let mut metadata = None;
    let mut current = Vec::new();
    let mut dated = Vec::new();

    for candidate in dedup_candidates(candidates) {
        match candidate.role {
            Role::Metadata => {
                if metadata.is_none() {
                    metadata = Some(candidate);
                }
            }
            Role::Data if candidate.is_current() => {
                if include_current {
                    current.push(candidate);
                }
            }
            Role::Data => dated.push(candidate),
        }
    }

    // Stable, so slotted files of one period keep their listing order.
    dated.sort_by(|a, b| b.period_key.cmp(&a.period_key));

    let mut periods = BTreeSet::new();
    let dated = dated.into_iter().filter(|c| {
        if periods.contains(&c.period_key) {
            return true;
        }
        if limit.is_some_and(|n| periods.len() >= n) {
            return false;
        }
        periods.insert(c.period_key.clone());
        true
    });

    current.extend(dated);

    Selection {
        data: current,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use forest_pipelines_source_models::CURRENT_PERIOD;

    use super::*;

    fn data(period: &str) -> Candidate {
        Candidate::data(format!("https://x.example/f_{period}.zip"), period)
    }

    fn periods(selection: &Selection) -> Vec<&str> {
        selection.data.iter().map(|c| c.period_key.as_str()).collect()
    }

    #[test]
    fn keeps_the_most_recent_periods_newest_first() {
        let selection = select(
            vec![data("2024-01"), data("2024-02"), data("2024-03")],
            Some(2),
            true,
        );
        assert_eq!(periods(&selection), vec!["2024-03", "2024-02"]);
    }

    #[test]
    fn fewer_candidates_than_limit_returns_all() {
        let selection = select(vec![data("2023"), data("2024")], Some(5), true);
        assert_eq!(periods(&selection), vec!["2024", "2023"]);
    }

    #[test]
    fn no_limit_selects_everything() {
        let all = (2000..2025).map(|y| data(&y.to_string())).collect::<Vec<_>>();
        assert_eq!(select(all, None, true).data.len(), 25);
    }

    #[test]
    fn current_file_leads_and_ignores_the_cutoff() {
        let selection = select(
            vec![data("2022"), data(CURRENT_PERIOD), data("2024"), data("2023")],
            Some(0),
            true,
        );
        assert_eq!(periods(&selection), vec![CURRENT_PERIOD]);

        let selection = select(
            vec![data("2022"), data(CURRENT_PERIOD), data("2024"), data("2023")],
            Some(2),
            true,
        );
        assert_eq!(periods(&selection), vec![CURRENT_PERIOD, "2024", "2023"]);
    }

    #[test]
    fn current_file_can_be_excluded() {
        let selection = select(vec![data(CURRENT_PERIOD), data("2024")], None, false);
        assert_eq!(periods(&selection), vec!["2024"]);
    }

    #[test]
    fn duplicates_and_extra_metadata_are_dropped() {
        let selection = select(
            vec![
                data("2024-01"),
                Candidate::metadata("https://x.example/meta_a.txt"),
                data("2024-01"),
                Candidate::metadata("https://x.example/meta_b.txt"),
            ],
            None,
            true,
        );
        assert_eq!(selection.data.len(), 1);
        assert_eq!(selection.metadata.unwrap().filename, "meta_a.txt");
    }

    #[test]
    fn limit_counts_distinct_periods_not_files() {
        let file = |period: &str, slot: &str| {
            Candidate::data(format!("https://eia.example/{slot}"), period).with_slot(slot)
        };
        let selection = select(
            vec![
                file("2025-01-08", "1030AM/a.pdf"),
                file("2025-01-08", "0100PM/b.pdf"),
                file("2025-01-01", "1030AM/a.pdf"),
            ],
            Some(1),
            true,
        );
        assert_eq!(selection.data.len(), 2);
        assert_eq!(selection.periods(), vec!["2025-01-08"]);
        assert_eq!(selection.data[0].relative_path(), "1030AM/a.pdf");
    }

    #[test]
    fn explicit_bound_overrides_the_default() {
        assert_eq!(effective_limit(Some(3), Recency::Months(12)), Some(3));
        assert_eq!(effective_limit(None, Recency::Years(5)), Some(5));
        assert_eq!(effective_limit(None, Recency::All), None);
    }
}
