//! Incremental skip.
//!
//! Before fetching anything, the previously published manifest is read back
//! and every selected candidate is probed with a `HEAD` request. A candidate
//! whose probed size equals the `size_bytes` of the prior item with the same
//! identity is unchanged and its prior item is reused as is. When every
//! candidate is unchanged and the set of items is the same, the prior
//! manifest bytes are republished verbatim, so `generated_at` keeps the
//! time of the run that actually built it.

use std::collections::BTreeMap;

use forest_pipelines_manifest::{PublishedManifest, load_published};
use forest_pipelines_manifest_models::{ItemKey, ManifestItem};
use forest_pipelines_source::selection::Selection;
use forest_pipelines_source::{Phase, Reporter};
use forest_pipelines_source_models::Candidate;

use crate::SyncContext;
use crate::items::item_key;

/// What the prior manifest lets a run skip.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// The manifest currently published, if any.
    pub prior: Option<PublishedManifest>,
    /// Prior items whose upstream file is unchanged.
    pub reusable: BTreeMap<ItemKey, ManifestItem>,
    /// Sizes obtained while probing, reused for external items.
    pub probed: BTreeMap<ItemKey, u64>,
    /// Whether the prior manifest can be republished unchanged.
    pub unchanged: bool,
}

impl Plan {
    /// A plan that reuses nothing.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Prior item to reuse for `candidate`, if its file is unchanged.
    #[must_use]
    pub fn reusable_item(&self, candidate: &Candidate) -> Option<&ManifestItem> {
        self.reusable.get(&item_key(candidate))
    }

    /// Size probed for `candidate`, if the probe succeeded.
    #[must_use]
    pub fn probed_size(&self, candidate: &Candidate) -> Option<u64> {
        self.probed.get(&item_key(candidate)).copied()
    }
}

/// Compares the selection with the published manifest.
///
/// `unresolved` is the number of listing links that produced no candidate;
/// any of them means the listing changed shape and rules out a verbatim
/// republish. A probe failure counts as a change.
pub async fn plan(
    ctx: &SyncContext,
    bucket_prefix: &str,
    selection: &Selection,
    unresolved: usize,
    reporter: &Reporter,
) -> Plan {
    let prior = match load_published(ctx.store.as_ref(), bucket_prefix).await {
        Ok(Some(prior)) => prior,
        Ok(None) => {
            reporter.info(Phase::Probe, "no published manifest, running a full sync");
            return Plan::full();
        }
        Err(e) => {
            reporter.warn(Phase::Probe, format!("prior manifest unreadable, running a full sync: {e}"));
            return Plan::full();
        }
    };

    let prior_items: BTreeMap<ItemKey, &ManifestItem> =
        prior.manifest.items.iter().map(|i| (i.key(), i)).collect();

    let mut plan = Plan::full();
    let mut changed = false;
    let candidates = selection.data.iter().chain(selection.metadata.iter());

    for candidate in candidates {
        let key = item_key(candidate);
        let period = key.period.clone().unwrap_or_default();

        let size = match ctx.fetcher.probe_size(&candidate.url).await {
            Ok(Some(size)) => size,
            Ok(None) => {
                reporter.warn_for(Phase::Probe, &period, format!("no Content-Length for {}", candidate.url));
                changed = true;
                continue;
            }
            Err(e) => {
                reporter.warn_for(Phase::Probe, &period, format!("probe failed for {}: {e}", candidate.url));
                changed = true;
                continue;
            }
        };
        plan.probed.insert(key.clone(), size);

        match prior_items.get(&key) {
            Some(item) if item.size_bytes == size => {
                reporter.log(
                    log::Level::Debug,
                    Phase::Probe,
                    Some(&period),
                    format!("{} unchanged ({size} bytes)", candidate.filename),
                );
                plan.reusable.insert(key, (*item).clone());
            }
            Some(item) => {
                reporter.info_for(
                    Phase::Probe,
                    &period,
                    format!("{} changed ({} -> {size} bytes)", candidate.filename, item.size_bytes),
                );
                changed = true;
            }
            None => {
                reporter.info_for(Phase::Probe, &period, format!("{} is new", candidate.filename));
                changed = true;
            }
        }
    }

    plan.unchanged = !changed
        && unresolved == 0
        && plan.reusable.len() == prior.manifest.items.len();
    plan.prior = Some(prior);
    plan
}
