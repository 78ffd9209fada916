//! Config-driven dataset definition.
//!
//! A [`DatasetDefinition`] is the raw TOML shape. [`DatasetDefinition::resolve`]
//! validates it into a [`DatasetConfig`], deriving the landing page URL,
//! the recency default and the lister, so configuration errors surface
//! before any network activity.

use forest_pipelines_manifest_models::DatasetIdentity;
use serde::Deserialize;

use crate::ckan::CkanLister;
use crate::directory_index::DirectoryIndexLister;
use crate::eia_release_table::EiaReleaseTableLister;
use crate::eia_series_select::EiaSeriesSelectLister;
use crate::eia_series_table::EiaSeriesTableLister;
use crate::{ConfigError, ResourceLister};

/// CVM open-data portal dataset pages, used with `dataset_slug`.
pub const CVM_DATASET_BASE_URL: &str = "https://dados.cvm.gov.br/dataset";

/// Anchor selector of CKAN resource download links.
pub const DEFAULT_CKAN_SELECTOR: &str = "a.resource-url-analytics";

// ── Raw definition ───────────────────────────────────────────────────────

/// A dataset definition as written in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetDefinition {
    /// Unique identifier (e.g. `"cvm_fi_inf_diario"`).
    pub id: String,
    /// Human-readable title. Defaults to `id`.
    #[serde(default)]
    pub title: Option<String>,
    /// Landing page URL.
    #[serde(default)]
    pub source_dataset_url: Option<String>,
    /// Alternative spelling of `source_dataset_url`.
    #[serde(default)]
    pub source_url: Option<String>,
    /// CVM dataset slug; derives the landing page URL.
    #[serde(default)]
    pub dataset_slug: Option<String>,
    /// Root path in the bucket.
    #[serde(default)]
    pub bucket_prefix: Option<String>,
    /// Recency default in months.
    #[serde(default)]
    pub latest_months: Option<usize>,
    /// Recency default in years.
    #[serde(default)]
    pub latest_years: Option<usize>,
    /// Whether the undated current file is synced. Defaults to `true`.
    #[serde(default)]
    pub include_current: Option<bool>,
    /// Whether payloads are copied into the bucket (`true`) or only linked.
    #[serde(default)]
    pub mirror: Option<bool>,
    /// Whether unchanged resources are detected from the prior manifest.
    #[serde(default)]
    pub incremental: Option<bool>,
    /// Cache sub-directory under the data dir. Defaults to `id`.
    #[serde(default)]
    pub local_dir: Option<String>,
    /// Static facts merged into the manifest `meta` object.
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// How to scrape the listing page.
    pub lister: ListerConfig,
}

/// Lister selection and its parameters, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ListerConfig {
    /// CKAN dataset page with marked resource anchors.
    Ckan {
        /// Anchor selector.
        #[serde(default = "default_ckan_selector")]
        selector: String,
        /// File-name regex with a `year` (and optional `month`) group.
        #[serde(default)]
        data_pattern: Option<String>,
        /// File name of the undated current file (`Atual`).
        #[serde(default)]
        current_filename: Option<String>,
        /// File name of the single data file, for undated datasets.
        #[serde(default)]
        data_filename: Option<String>,
        /// File-name regex of the metadata file.
        #[serde(default)]
        meta_pattern: Option<String>,
    },
    /// Plain directory listing or page of links.
    DirectoryIndex {
        /// File-name regex with a `year` (and optional `month`) group.
        data_pattern: String,
    },
    /// EIA table of series linking to per-series pages.
    EiaSeriesTable,
    /// EIA weekly report table with release-time columns.
    EiaReleaseTable,
    /// EIA series page with series and frequency drop-downs.
    EiaSeriesSelect,
}

fn default_ckan_selector() -> String {
    DEFAULT_CKAN_SELECTOR.to_string()
}

impl ListerConfig {
    /// The `type` tag of this lister.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ckan { .. } => "ckan",
            Self::DirectoryIndex { .. } => "directory_index",
            Self::EiaSeriesTable => "eia_series_table",
            Self::EiaReleaseTable => "eia_release_table",
            Self::EiaSeriesSelect => "eia_series_select",
        }
    }
}

/// Parses a dataset definition from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Toml`] if the text is not a valid definition.
pub fn parse_dataset_toml(name: &str, text: &str) -> Result<DatasetDefinition, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Toml {
        name: name.to_string(),
        source,
    })
}

// ── Resolved config ──────────────────────────────────────────────────────

/// How many dated periods a run syncs by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    /// The `n` most recent monthly periods.
    Months(usize),
    /// The `n` most recent yearly periods.
    Years(usize),
    /// Every period listed.
    All,
}

impl Recency {
    /// Number of periods, or `None` for all.
    #[must_use]
    pub const fn limit(self) -> Option<usize> {
        match self {
            Self::Months(n) | Self::Years(n) => Some(n),
            Self::All => None,
        }
    }
}

impl std::fmt::Display for Recency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Months(n) => write!(f, "{n} months"),
            Self::Years(n) => write!(f, "{n} years"),
            Self::All => f.write_str("all"),
        }
    }
}

/// A validated dataset definition.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Unique identifier.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Landing page URL.
    pub source_dataset_url: String,
    /// Root path in the bucket, without a trailing slash.
    pub bucket_prefix: String,
    /// Recency default.
    pub recency: Recency,
    /// Whether the undated current file is synced.
    pub include_current: bool,
    /// Whether payloads are copied into the bucket.
    pub mirror: bool,
    /// Whether unchanged resources are detected from the prior manifest.
    pub incremental: bool,
    /// Cache sub-directory under the data dir.
    pub local_dir: String,
    /// Static manifest meta.
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// Lister parameters.
    pub lister: ListerConfig,
}

impl DatasetDefinition {
    /// Validates the definition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no source URL can be derived, the bucket
    /// prefix is missing, or the lister parameters are invalid.
    pub fn resolve(self) -> Result<DatasetConfig, ConfigError> {
        let id = self.id.trim().to_string();

        let source_dataset_url = non_empty(self.source_dataset_url)
            .or_else(|| non_empty(self.source_url))
            .or_else(|| {
                non_empty(self.dataset_slug).map(|slug| format!("{CVM_DATASET_BASE_URL}/{slug}"))
            })
            .ok_or_else(|| ConfigError::MissingSourceUrl { id: id.clone() })?;

        let bucket_prefix = non_empty(self.bucket_prefix)
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::MissingBucketPrefix { id: id.clone() })?;

        let recency = match (self.latest_months, self.latest_years) {
            (Some(n), _) => Recency::Months(n),
            (None, Some(n)) => Recency::Years(n),
            (None, None) => Recency::All,
        };

        let config = DatasetConfig {
            title: non_empty(self.title).unwrap_or_else(|| id.clone()),
            local_dir: non_empty(self.local_dir).unwrap_or_else(|| id.clone()),
            source_dataset_url,
            bucket_prefix,
            recency,
            include_current: self.include_current.unwrap_or(true),
            mirror: self.mirror.unwrap_or(true),
            incremental: self.incremental.unwrap_or(false),
            meta: self.meta,
            lister: self.lister,
            id,
        };

        // Compile patterns now so a bad definition fails before any request.
        config.lister()?;
        Ok(config)
    }
}

impl DatasetConfig {
    /// Identity fields stamped on every manifest of this dataset.
    #[must_use]
    pub fn identity(&self) -> DatasetIdentity {
        DatasetIdentity {
            dataset_id: self.id.clone(),
            title: self.title.clone(),
            source_dataset_url: self.source_dataset_url.clone(),
            bucket_prefix: self.bucket_prefix.clone(),
        }
    }

    /// Builds the lister named by the `[lister]` table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a pattern is invalid or the table is
    /// inconsistent.
    pub fn lister(&self) -> Result<Box<dyn ResourceLister>, ConfigError> {
        build_lister(&self.id, &self.lister)
    }
}

/// Builds the [`ResourceLister`] for `config`.
///
/// # Errors
///
/// Returns [`ConfigError`] if a pattern is invalid or the table is
/// inconsistent.
pub fn build_lister(
    id: &str,
    config: &ListerConfig,
) -> Result<Box<dyn ResourceLister>, ConfigError> {
    Ok(match config {
        ListerConfig::Ckan {
            selector,
            data_pattern,
            current_filename,
            data_filename,
            meta_pattern,
        } => {
            if data_pattern.is_none() && data_filename.is_none() {
                return Err(ConfigError::InvalidLister {
                    id: id.to_string(),
                    reason: "ckan lister needs 'data_pattern' or 'data_filename'".to_string(),
                });
            }
            Box::new(CkanLister::new(
                selector,
                data_pattern.as_deref(),
                current_filename.as_deref(),
                data_filename.as_deref(),
                meta_pattern.as_deref(),
            )?)
        }
        ListerConfig::DirectoryIndex { data_pattern } => {
            Box::new(DirectoryIndexLister::new(data_pattern)?)
        }
        ListerConfig::EiaSeriesTable => Box::new(EiaSeriesTableLister),
        ListerConfig::EiaReleaseTable => Box::new(EiaReleaseTableLister),
        ListerConfig::EiaSeriesSelect => Box::new(EiaSeriesSelectLister),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> DatasetDefinition {
        parse_dataset_toml("test", text).unwrap()
    }

    #[test]
    fn slug_derives_cvm_url_and_title_defaults_to_id() {
        let config = parse(
            r#"
            id = "cvm_fi_inf_diario"
            dataset_slug = "fi-doc-inf_diario"
            bucket_prefix = "cvm/fi/inf_diario/"
            latest_months = 12

            [lister]
            type = "ckan"
            data_pattern = '(?i)inf_diario_fi_(?P<year>\d{4})(?P<month>\d{2})\.zip$'
            "#,
        )
        .resolve()
        .unwrap();

        assert_eq!(config.source_dataset_url, "https://dados.cvm.gov.br/dataset/fi-doc-inf_diario");
        assert_eq!(config.title, "cvm_fi_inf_diario");
        assert_eq!(config.bucket_prefix, "cvm/fi/inf_diario");
        assert_eq!(config.recency, Recency::Months(12));
        assert!(config.include_current);
        assert!(config.mirror);
        assert!(!config.incremental);
        assert_eq!(config.local_dir, "cvm_fi_inf_diario");
    }

    #[test]
    fn invalid_ckan_selector_fails_resolution() {
        let err = parse(
            r#"
            id = "cvm_fi_doc_extrato"
            dataset_slug = "fi-doc-extrato"
            bucket_prefix = "cvm/fi/doc/extrato"

            [lister]
            type = "ckan"
            selector = "a:::["
            data_pattern = '(?i)extrato_fi_(?P<year>\d{4})\.csv$'
            "#,
        )
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn missing_source_url_is_a_config_error() {
        let err = parse(
            r#"
            id = "x"
            bucket_prefix = "x"
            [lister]
            type = "eia_series_table"
            "#,
        )
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSourceUrl { .. }));
    }

    #[test]
    fn missing_bucket_prefix_is_a_config_error() {
        let err = parse(
            r#"
            id = "x"
            source_url = "https://www.eia.gov/petroleum/supply/weekly/"
            bucket_prefix = "  "
            [lister]
            type = "eia_release_table"
            "#,
        )
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingBucketPrefix { .. }));
    }

    #[test]
    fn invalid_pattern_fails_resolution() {
        let err = parse(
            r#"
            id = "x"
            source_url = "https://example.com/"
            bucket_prefix = "x"
            [lister]
            type = "directory_index"
            data_pattern = '(?P<year>\d{4}'
            "#,
        )
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn ckan_without_data_rule_is_rejected() {
        let err = parse(
            r#"
            id = "x"
            dataset_slug = "x"
            bucket_prefix = "x"
            [lister]
            type = "ckan"
            meta_pattern = 'meta'
            "#,
        )
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLister { .. }));
    }

    #[test]
    fn static_meta_table_is_kept() {
        let config = parse(
            r#"
            id = "inmet_dados_historicos"
            source_url = "https://portal.inmet.gov.br/dadoshistoricos"
            bucket_prefix = "inmet/dados_historicos"
            [meta]
            source = "INMET - Instituto Nacional de Meteorologia"
            [lister]
            type = "directory_index"
            data_pattern = '(?i)(?P<year>\d{4})\.zip$'
            "#,
        )
        .resolve()
        .unwrap();
        assert_eq!(config.meta["source"], "INMET - Instituto Nacional de Meteorologia");
        assert_eq!(config.recency, Recency::All);
        assert_eq!(config.lister.kind(), "directory_index");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(
            parse_dataset_toml(
                "x",
                r#"
                id = "x"
                bucket = "oops"
                [lister]
                type = "eia_series_table"
                "#
            )
            .is_err()
        );
    }
}
