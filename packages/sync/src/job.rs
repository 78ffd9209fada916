//! One dataset job, from listing page to published manifest.

use forest_pipelines_manifest::{build_manifest, publish, republish_bytes};
use forest_pipelines_manifest_models::{Manifest, ManifestItem, RunStatus};
use forest_pipelines_source::selection::{Selection, effective_limit, select};
use forest_pipelines_source::{DatasetConfig, Phase, Reporter};
use forest_pipelines_source_models::{Candidate, ListingResult};
use forest_pipelines_storage::{UploadBody, content_type_for};

use crate::incremental::{self, Plan};
use crate::items::{cache_path, external_item, mirrored_item, object_path};
use crate::meta::{FailedResource, RunCounts, build_meta};
use crate::{ResourceError, SyncContext, SyncError};

/// What a finished job produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The manifest now published.
    pub manifest: Manifest,
    /// Public URL of the manifest.
    pub manifest_url: String,
    /// Data resources attempted.
    pub discovered: usize,
    /// Data items published.
    pub published: usize,
    /// Resources left out of the manifest.
    pub failed: Vec<FailedResource>,
    /// Whether the prior manifest was republished unchanged.
    pub republished: bool,
}

impl RunOutcome {
    /// Status of the run.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        RunStatus::from_counts(self.published, self.discovered)
    }
}

/// Runs the job for `config`.
///
/// `latest` overrides the dataset's recency default, in the dataset's own
/// unit (months or years).
///
/// # Errors
///
/// Returns [`SyncError`] if the lister cannot be built, the listing page
/// fails or yields no data files, or the manifest cannot be published.
/// Per-resource failures do not abort the run.
pub async fn run(
    ctx: &SyncContext,
    config: &DatasetConfig,
    latest: Option<usize>,
) -> Result<RunOutcome, SyncError> {
    let reporter = Reporter::new(&config.id);
    reporter.info(
        Phase::Config,
        format!(
            "{} -> {} via {} storage (default: {}, mirror: {}, incremental: {})",
            config.title,
            config.bucket_prefix,
            ctx.store.backend(),
            config.recency,
            config.mirror,
            config.incremental,
        ),
    );

    let lister = config.lister()?;
    reporter.info(
        Phase::List,
        format!("scraping {} ({})", config.source_dataset_url, lister.kind()),
    );
    let listing = lister
        .list(&config.source_dataset_url, &ctx.fetcher, &reporter)
        .await?;

    if listing.data().next().is_none() {
        return Err(SyncError::StructuralDrift {
            url: config.source_dataset_url.clone(),
            expected: "at least one data file on the listing page".to_string(),
        });
    }

    let limit = effective_limit(latest, config.recency);
    let ListingResult {
        candidates,
        meta: listing_meta,
        unresolved,
    } = listing;
    let found = candidates.len();
    let selection = select(candidates, limit, config.include_current);
    reporter.info(
        Phase::Select,
        format!(
            "{} of {found} candidates selected across {} periods (limit: {}), metadata: {}",
            selection.data.len(),
            selection.periods().len(),
            limit.map_or_else(|| "all".to_string(), |n| n.to_string()),
            selection.metadata.as_ref().map_or("none", |m| m.filename.as_str()),
        ),
    );

    let mut plan = if config.incremental {
        incremental::plan(ctx, &config.bucket_prefix, &selection, unresolved.len(), &reporter).await
    } else {
        Plan::full()
    };

    if plan.unchanged
        && let Some(prior) = plan.prior.take()
    {
        reporter.info(Phase::Publish, "nothing changed upstream, republishing the prior manifest");
        let manifest_url = republish_bytes(ctx.store.as_ref(), &config.bucket_prefix, prior.raw).await?;
        let manifest = prior.manifest;
        let published = manifest.data_items().count();
        return Ok(RunOutcome {
            manifest,
            manifest_url,
            discovered: published,
            published,
            failed: Vec::new(),
            republished: true,
        });
    }

    let mut failed: Vec<FailedResource> = unresolved
        .into_iter()
        .map(|link| FailedResource {
            period: None,
            source_url: link.source_url,
            error: link.reason,
        })
        .collect();
    let discovered = selection.data.len() + failed.len();

    let Selection { data, metadata } = selection;
    let mut items = Vec::with_capacity(data.len() + 1);
    for candidate in &data {
        match process(ctx, config, &plan, candidate, &reporter).await {
            Ok(item) => items.push(item),
            Err(e) => {
                reporter.error_for(e.phase(), &candidate.period_key, format!("{}: {e}", candidate.url));
                failed.push(FailedResource {
                    period: Some(candidate.period_key.clone()),
                    source_url: candidate.url.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    let published = items.len();

    if let Some(candidate) = &metadata {
        match process(ctx, config, &plan, candidate, &reporter).await {
            Ok(item) => items.push(item),
            Err(e) => {
                reporter.error_for(e.phase(), "meta", format!("{}: {e}", candidate.url));
                failed.push(FailedResource {
                    period: None,
                    source_url: candidate.url.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let counts = RunCounts {
        published,
        discovered,
    };
    let meta = build_meta(counts, &failed, &listing_meta, &config.meta);
    let manifest = build_manifest(&config.identity(), items, Some(meta));
    reporter.info(
        Phase::Manifest,
        format!(
            "{} items, {published}/{discovered} data files, status {}",
            manifest.items.len(),
            counts.status()
        ),
    );

    let manifest_url = publish(ctx.store.as_ref(), &manifest).await?;
    reporter.info(Phase::Publish, format!("manifest at {manifest_url}"));

    Ok(RunOutcome {
        manifest,
        manifest_url,
        discovered,
        published,
        failed,
        republished: false,
    })
}

/// Turns one candidate into a manifest item: reused, linked or mirrored.
async fn process(
    ctx: &SyncContext,
    config: &DatasetConfig,
    plan: &Plan,
    candidate: &Candidate,
    reporter: &Reporter,
) -> Result<ManifestItem, ResourceError> {
    let period = candidate.period_key.as_str();

    if let Some(item) = plan.reusable_item(candidate) {
        reporter.info_for(Phase::Probe, period, format!("{} unchanged, reusing", candidate.filename));
        return Ok(item.clone());
    }

    if !config.mirror {
        let size = match plan.probed_size(candidate) {
            Some(size) => size,
            None => match ctx.fetcher.probe_size(&candidate.url).await {
                Ok(Some(size)) => size,
                Ok(None) => {
                    reporter.warn_for(Phase::Probe, period, format!("no Content-Length for {}", candidate.url));
                    0
                }
                Err(e) => {
                    reporter.warn_for(Phase::Probe, period, format!("probe failed for {}: {e}", candidate.url));
                    0
                }
            },
        };
        reporter.info_for(Phase::Probe, period, format!("{} linked ({size} bytes)", candidate.filename));
        return Ok(external_item(candidate, size));
    }

    let dest = cache_path(&ctx.data_dir, &config.local_dir, candidate);
    reporter.info_for(Phase::Fetch, period, format!("downloading {}", candidate.url));
    let download = ctx.fetcher.stream_download(&candidate.url, &dest).await?;
    reporter.info_for(
        Phase::Fetch,
        period,
        format!(
            "{} ({} bytes, sha256 {})",
            candidate.filename, download.size_bytes, download.sha256
        ),
    );

    let path = object_path(&config.bucket_prefix, candidate);
    ctx.store
        .upload(
            &path,
            UploadBody::File(download.local_path.clone()),
            content_type_for(&candidate.filename),
            true,
        )
        .await?;
    let public_url = ctx.store.public_url(&path);
    reporter.info_for(Phase::Upload, period, format!("uploaded {path}"));

    Ok(mirrored_item(candidate, &download, path, public_url))
}

#[cfg(test)]
mod tests {
    use forest_pipelines_fetch::test_server::{Reply, TestServer};
    use forest_pipelines_fetch::{Fetcher, RetryPolicy};
    use forest_pipelines_manifest::{build_manifest_at, load_published, to_canonical_json};
    use forest_pipelines_manifest_models::{EXTERNAL_DIGEST, ItemKind, manifest_path};
    use forest_pipelines_source::dataset_def::parse_dataset_toml;
    use forest_pipelines_storage::{BlobStore, LocalStore, StorageError, UploadReceipt};
    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        server: TestServer,
        _dir: TempDir,
        ctx: SyncContext,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("store"), Some("https://cdn.example.com/open-data"));
        let ctx = SyncContext::new(
            Box::new(store),
            Fetcher::new(RetryPolicy::immediate(1)).unwrap(),
            dir.path().join("cache"),
        );
        Fixture {
            server: TestServer::bind().await,
            _dir: dir,
            ctx,
        }
    }

    fn directory_dataset(page_url: &str, pattern: &str, extra: &str) -> DatasetConfig {
        parse_dataset_toml(
            "test",
            &format!(
                r#"
                id = "test_dataset"
                title = "Test"
                source_url = "{page_url}"
                bucket_prefix = "test/dataset"
                {extra}

                [meta]
                source = "Test fixture"

                [lister]
                type = "directory_index"
                data_pattern = '{pattern}'
                "#
            ),
        )
        .unwrap()
        .resolve()
        .unwrap()
    }

    fn index_page(files: &[&str]) -> String {
        files
            .iter()
            .map(|f| format!(r#"<a href="{f}">{f}</a>"#))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A local store that refuses uploads to one object path.
    struct RejectingStore {
        inner: LocalStore,
        rejected: String,
    }

    #[async_trait::async_trait]
    impl BlobStore for RejectingStore {
        fn backend(&self) -> &str {
            "rejecting"
        }

        async fn upload(
            &self,
            object_path: &str,
            body: UploadBody,
            content_type: &str,
            upsert: bool,
        ) -> Result<UploadReceipt, StorageError> {
            if object_path == self.rejected {
                return Err(StorageError::Status {
                    key: object_path.to_string(),
                    status: 503,
                    body: "bucket unavailable".to_string(),
                });
            }
            self.inner.upload(object_path, body, content_type, upsert).await
        }

        fn public_url(&self, object_path: &str) -> String {
            self.inner.public_url(object_path)
        }

        async fn get(&self, object_path: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(object_path).await
        }
    }

    fn rejecting_context(dir: &TempDir, rejected: &str) -> SyncContext {
        let store = RejectingStore {
            inner: LocalStore::new(dir.path().join("store"), None),
            rejected: rejected.to_string(),
        };
        SyncContext::new(
            Box::new(store),
            Fetcher::new(RetryPolicy::immediate(1)).unwrap(),
            dir.path().join("cache"),
        )
    }

    async fn stored_manifest(ctx: &SyncContext) -> Option<Vec<u8>> {
        ctx.store.get(&manifest_path("test/dataset")).await.unwrap()
    }

    #[tokio::test]
    async fn keeps_the_latest_periods_newest_first() {
        let f = fixture().await;
        f.server.route(
            "/files/",
            vec![Reply::ok(index_page(&["f_202401.zip", "f_202402.zip", "f_202403.zip"]))],
        );
        for month in ["01", "02", "03"] {
            f.server.route(&format!("/files/f_2024{month}.zip"), vec![Reply::ok(format!("payload {month}"))]);
        }
        let config = directory_dataset(
            &f.server.url("/files/"),
            r"^f_(?P<year>\d{4})(?P<month>\d{2})\.zip$",
            "",
        );

        let outcome = run(&f.ctx, &config, Some(2)).await.unwrap();

        let periods: Vec<_> = outcome.manifest.items.iter().map(|i| i.period.as_deref()).collect();
        assert_eq!(periods, vec![Some("2024-03"), Some("2024-02")]);
        assert_eq!(outcome.status(), RunStatus::Success);
        assert_eq!(f.server.hits("/files/f_202401.zip"), 0);

        let item = &outcome.manifest.items[0];
        assert_eq!(item.storage_path.as_deref(), Some("test/dataset/data/2024-03/f_202403.zip"));
        assert_eq!(item.public_url, "https://cdn.example.com/open-data/test/dataset/data/2024-03/f_202403.zip");
        assert_eq!(item.size_bytes, 10);
        assert_eq!(item.sha256.len(), 64);

        let meta = outcome.manifest.meta.as_ref().unwrap();
        assert_eq!(meta["status"], "success");
        assert_eq!(meta["total_items"], 2);
        assert_eq!(meta["source"], "Test fixture");

        let stored = stored_manifest(&f.ctx).await.unwrap();
        assert_eq!(stored, to_canonical_json(&outcome.manifest).unwrap());
    }

    #[tokio::test]
    async fn empty_listing_aborts_without_a_manifest() {
        let f = fixture().await;
        f.server.route("/files/", vec![Reply::ok("<html><body>No files</body></html>")]);
        let config = directory_dataset(&f.server.url("/files/"), r"^(?P<year>\d{4})\.zip$", "");

        let err = run(&f.ctx, &config, None).await.unwrap_err();

        assert!(matches!(err, SyncError::StructuralDrift { .. }));
        assert!(stored_manifest(&f.ctx).await.is_none());
    }

    #[tokio::test]
    async fn unreachable_listing_aborts_without_a_manifest() {
        let f = fixture().await;
        let config = directory_dataset(&f.server.url("/gone/"), r"^(?P<year>\d{4})\.zip$", "");

        let err = run(&f.ctx, &config, None).await.unwrap_err();

        assert!(matches!(err, SyncError::Listing(_)));
        assert!(stored_manifest(&f.ctx).await.is_none());
    }

    #[tokio::test]
    async fn failed_resource_degrades_to_partial_success() {
        let f = fixture().await;
        f.server.route("/files/", vec![Reply::ok(index_page(&["2022.zip", "2023.zip", "2024.zip"]))]);
        f.server.route("/files/2022.zip", vec![Reply::ok("a")]);
        f.server.route("/files/2024.zip", vec![Reply::ok("c")]);
        let config = directory_dataset(&f.server.url("/files/"), r"^(?P<year>\d{4})\.zip$", "");

        let outcome = run(&f.ctx, &config, None).await.unwrap();

        assert_eq!(outcome.manifest.items.len(), 2);
        assert_eq!(outcome.status(), RunStatus::PartialSuccess);
        let meta = outcome.manifest.meta.as_ref().unwrap();
        assert_eq!(meta["status"], "partial_success");
        assert_eq!(meta["discovered"], 3);
        assert_eq!(meta["total_items"], 2);
        assert_eq!(meta["failed"][0]["period"], "2023");
        assert!(stored_manifest(&f.ctx).await.is_some());
    }

    #[tokio::test]
    async fn unchanged_upstream_republishes_the_prior_manifest_verbatim() {
        let f = fixture().await;
        f.server.route("/files/", vec![Reply::ok(index_page(&["2024.zip"]))]);
        f.server.route("/files/2024.zip", vec![Reply::ok(vec![7u8; 1000])]);
        let config = directory_dataset(
            &f.server.url("/files/"),
            r"^(?P<year>\d{4})\.zip$",
            "incremental = true",
        );

        let prior = build_manifest_at(
            &config.identity(),
            vec![ManifestItem {
                kind: ItemKind::Data,
                period: Some("2024".to_string()),
                slot: None,
                title: None,
                filename: "2024.zip".to_string(),
                sha256: "ab".repeat(32),
                size_bytes: 1000,
                storage_path: Some("test/dataset/data/2024/2024.zip".to_string()),
                public_url: "https://cdn.example.com/open-data/test/dataset/data/2024/2024.zip".to_string(),
                source_url: f.server.url("/files/2024.zip"),
            }],
            Some(serde_json::json!({ "status": "success" })),
            "2025-01-01T00:00:00Z".parse().unwrap(),
        );
        let prior_bytes = to_canonical_json(&prior).unwrap();
        f.ctx
            .store
            .upload(&manifest_path("test/dataset"), UploadBody::Bytes(prior_bytes.clone()), "application/json", true)
            .await
            .unwrap();

        let outcome = run(&f.ctx, &config, None).await.unwrap();

        assert!(outcome.republished);
        assert_eq!(stored_manifest(&f.ctx).await.unwrap(), prior_bytes);
        assert_eq!(outcome.manifest.generated_at, prior.generated_at);
        // Only the HEAD probe, no download.
        assert_eq!(f.server.hits("/files/2024.zip"), 1);
    }

    #[tokio::test]
    async fn new_period_rebuilds_and_reuses_unchanged_items() {
        let f = fixture().await;
        f.server.route("/files/", vec![Reply::ok(index_page(&["2024.zip", "2025.zip"]))]);
        f.server.route("/files/2024.zip", vec![Reply::ok(vec![7u8; 1000])]);
        f.server.route("/files/2025.zip", vec![Reply::ok(vec![8u8; 500])]);
        let config = directory_dataset(
            &f.server.url("/files/"),
            r"^(?P<year>\d{4})\.zip$",
            "incremental = true",
        );

        let prior_item = ManifestItem {
            kind: ItemKind::Data,
            period: Some("2024".to_string()),
            slot: None,
            title: None,
            filename: "2024.zip".to_string(),
            sha256: "cd".repeat(32),
            size_bytes: 1000,
            storage_path: Some("test/dataset/data/2024/2024.zip".to_string()),
            public_url: "https://cdn.example.com/open-data/test/dataset/data/2024/2024.zip".to_string(),
            source_url: f.server.url("/files/2024.zip"),
        };
        let prior = build_manifest(&config.identity(), vec![prior_item.clone()], None);
        forest_pipelines_manifest::publish(f.ctx.store.as_ref(), &prior).await.unwrap();

        let outcome = run(&f.ctx, &config, None).await.unwrap();

        assert!(!outcome.republished);
        assert_eq!(outcome.manifest.items.len(), 2);
        assert_eq!(outcome.manifest.items[0].period.as_deref(), Some("2025"));
        assert_eq!(outcome.manifest.items[0].size_bytes, 500);
        assert_eq!(outcome.manifest.items[1], prior_item);
        // HEAD only for the unchanged year, HEAD + GET for the new one.
        assert_eq!(f.server.hits("/files/2024.zip"), 1);
        assert_eq!(f.server.hits("/files/2025.zip"), 2);

        let stored = load_published(f.ctx.store.as_ref(), "test/dataset").await.unwrap().unwrap();
        assert_eq!(stored.manifest, outcome.manifest);
    }

    #[tokio::test]
    async fn external_datasets_link_without_downloading() {
        let f = fixture().await;
        f.server.route("/tif/", vec![Reply::ok(index_page(&["focos1km_202401.tif"]))]);
        f.server.route("/tif/focos1km_202401.tif", vec![Reply::ok(vec![0u8; 4096])]);
        let config = directory_dataset(
            &f.server.url("/tif/"),
            r"^focos1km_(?P<year>\d{4})(?P<month>\d{2})\.tif$",
            "mirror = false",
        );

        let outcome = run(&f.ctx, &config, None).await.unwrap();

        let item = &outcome.manifest.items[0];
        assert_eq!(item.sha256, EXTERNAL_DIGEST);
        assert_eq!(item.size_bytes, 4096);
        assert!(item.storage_path.is_none());
        assert_eq!(item.public_url, f.server.url("/tif/focos1km_202401.tif"));
        assert_eq!(f.server.hits("/tif/focos1km_202401.tif"), 1);
    }

    #[tokio::test]
    async fn metadata_item_follows_the_data_items() {
        let f = fixture().await;
        let page = format!(
            r#"<a class="resource-url-analytics" href="{}">x</a>
               <a class="resource-url-analytics" href="{}">x</a>
               <a class="resource-url-analytics" href="{}">x</a>"#,
            f.server.url("/dados/extrato_fi_2024.csv"),
            f.server.url("/dados/extrato_fi.csv"),
            f.server.url("/meta/meta_extrato_fi.txt"),
        );
        f.server.route("/dataset/fi-doc-extrato", vec![Reply::ok(page)]);
        f.server.route("/dados/extrato_fi_2024.csv", vec![Reply::ok("CNPJ;DT\n")]);
        f.server.route("/dados/extrato_fi.csv", vec![Reply::ok("CNPJ;DT\n1;2\n")]);
        f.server.route("/meta/meta_extrato_fi.txt", vec![Reply::ok("layout")]);
        let config = parse_dataset_toml(
            "test",
            &format!(
                r#"
                id = "test_extrato"
                source_dataset_url = "{}"
                bucket_prefix = "test/dataset"
                latest_years = 5

                [lister]
                type = "ckan"
                data_pattern = '(?i)extrato_fi_(?P<year>\d{{4}})\.csv$'
                current_filename = "extrato_fi.csv"
                meta_pattern = '(?i)meta_extrato_fi[^/]*\.txt$'
                "#,
                f.server.url("/dataset/fi-doc-extrato")
            ),
        )
        .unwrap()
        .resolve()
        .unwrap();

        let outcome = run(&f.ctx, &config, None).await.unwrap();

        let kinds: Vec<(ItemKind, Option<&str>)> = outcome
            .manifest
            .items
            .iter()
            .map(|i| (i.kind, i.period.as_deref()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ItemKind::Data, Some("Atual")),
                (ItemKind::Data, Some("2024")),
                (ItemKind::Meta, None),
            ]
        );
        assert_eq!(
            outcome.manifest.items[0].storage_path.as_deref(),
            Some("test/dataset/data/atual/extrato_fi.csv")
        );
        assert_eq!(
            outcome.manifest.items[2].storage_path.as_deref(),
            Some("test/dataset/meta/meta_extrato_fi.txt")
        );
        assert_eq!(outcome.manifest.meta.as_ref().unwrap()["total_items"], 2);
    }

    #[tokio::test]
    async fn failed_upload_degrades_to_partial_success() {
        let f = fixture().await;
        f.server.route("/files/", vec![Reply::ok(index_page(&["2022.zip", "2023.zip"]))]);
        f.server.route("/files/2022.zip", vec![Reply::ok("a")]);
        f.server.route("/files/2023.zip", vec![Reply::ok("b")]);
        let config = directory_dataset(&f.server.url("/files/"), r"^(?P<year>\d{4})\.zip$", "");
        let dir = TempDir::new().unwrap();
        let ctx = rejecting_context(&dir, "test/dataset/data/2023/2023.zip");

        let outcome = run(&ctx, &config, None).await.unwrap();

        let periods: Vec<_> = outcome.manifest.items.iter().map(|i| i.period.as_deref()).collect();
        assert_eq!(periods, vec![Some("2022")]);
        assert_eq!(outcome.status(), RunStatus::PartialSuccess);
        assert_eq!(f.server.hits("/files/2023.zip"), 1);

        let meta = outcome.manifest.meta.as_ref().unwrap();
        assert_eq!(meta["status"], "partial_success");
        assert_eq!(meta["discovered"], 2);
        assert_eq!(meta["failed"][0]["period"], "2023");
        assert!(meta["failed"][0]["error"].as_str().unwrap().starts_with("upload failed"));
        assert!(stored_manifest(&ctx).await.is_some());
    }

    #[tokio::test]
    async fn failed_manifest_publish_aborts_the_run() {
        let f = fixture().await;
        f.server.route("/files/", vec![Reply::ok(index_page(&["2024.zip"]))]);
        f.server.route("/files/2024.zip", vec![Reply::ok("c")]);
        let config = directory_dataset(&f.server.url("/files/"), r"^(?P<year>\d{4})\.zip$", "");
        let dir = TempDir::new().unwrap();
        let ctx = rejecting_context(&dir, "test/dataset/manifest.json");

        let err = run(&ctx, &config, None).await.unwrap_err();

        assert!(matches!(err, SyncError::Publish(_)));
        assert!(stored_manifest(&ctx).await.is_none());
    }
}
