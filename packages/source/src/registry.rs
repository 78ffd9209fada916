//! Dataset registry. Loads all dataset definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/datasets/` is baked into the binary
//! at compile time via [`include_str!`]. Adding a dataset means writing a new
//! TOML file and adding it to the list below.

use crate::ConfigError;
use crate::dataset_def::{DatasetConfig, DatasetDefinition, parse_dataset_toml};

/// TOML configs embedded at compile time.
const DATASET_TOMLS: &[(&str, &str)] = &[
    // ── CVM (CKAN portal) ────────────────────────────────────────────
    (
        "cvm_fi_inf_diario",
        include_str!("../datasets/cvm_fi_inf_diario.toml"),
    ),
    (
        "cvm_fi_doc_entrega",
        include_str!("../datasets/cvm_fi_doc_entrega.toml"),
    ),
    (
        "cvm_fi_doc_extrato",
        include_str!("../datasets/cvm_fi_doc_extrato.toml"),
    ),
    (
        "cvm_fii_doc_inf_mensal",
        include_str!("../datasets/cvm_fii_doc_inf_mensal.toml"),
    ),
    (
        "cvm_fii_doc_inf_trimestral",
        include_str!("../datasets/cvm_fii_doc_inf_trimestral.toml"),
    ),
    (
        "cvm_fi_cad_icvm555_hist",
        include_str!("../datasets/cvm_fi_cad_icvm555_hist.toml"),
    ),
    // ── INMET / INPE (directory listings) ────────────────────────────
    (
        "inmet_dados_historicos",
        include_str!("../datasets/inmet_dados_historicos.toml"),
    ),
    (
        "inpe_bdqueimadas_focos",
        include_str!("../datasets/inpe_bdqueimadas_focos.toml"),
    ),
    (
        "inpe_area_queimada_focos1km",
        include_str!("../datasets/inpe_area_queimada_focos1km.toml"),
    ),
    // ── EIA ──────────────────────────────────────────────────────────
    (
        "eia_petroleum_monthly",
        include_str!("../datasets/eia_petroleum_monthly.toml"),
    ),
    (
        "eia_petroleum_weekly",
        include_str!("../datasets/eia_petroleum_weekly.toml"),
    ),
    (
        "eia_heating_oil_propane",
        include_str!("../datasets/eia_heating_oil_propane.toml"),
    ),
];

/// Total number of configured datasets (used in tests).
#[cfg(test)]
const EXPECTED_DATASET_COUNT: usize = 12;

/// Returns all configured dataset definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_datasets() -> Vec<DatasetDefinition> {
    DATASET_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_dataset_toml(name, toml).unwrap_or_else(|e| panic!("{e}"))
        })
        .collect()
}

/// Ids of all registered datasets, in registry order.
#[must_use]
pub fn ids() -> Vec<&'static str> {
    DATASET_TOMLS.iter().map(|(name, _)| *name).collect()
}

/// Looks up and resolves the dataset `id`.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownDataset`] if no dataset has this id, or
/// any resolution error of its definition.
pub fn find(id: &str) -> Result<DatasetConfig, ConfigError> {
    let (name, toml) = DATASET_TOMLS
        .iter()
        .find(|(name, _)| *name == id)
        .ok_or_else(|| ConfigError::UnknownDataset { id: id.to_string() })?;
    parse_dataset_toml(name, toml)?.resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset_def::{ListerConfig, Recency};

    #[test]
    fn loads_all_datasets() {
        assert_eq!(all_datasets().len(), EXPECTED_DATASET_COUNT);
    }

    #[test]
    fn dataset_ids_are_unique() {
        let datasets = all_datasets();
        let mut ids: Vec<&str> = datasets.iter().map(|d| d.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), EXPECTED_DATASET_COUNT);
    }

    #[test]
    fn registry_names_match_ids() {
        for (definition, name) in all_datasets().iter().zip(ids()) {
            assert_eq!(definition.id, name, "{name}.toml declares a different id");
        }
    }

    #[test]
    fn all_datasets_resolve() {
        for definition in all_datasets() {
            let id = definition.id.clone();
            let config = definition
                .resolve()
                .unwrap_or_else(|e| panic!("{id} does not resolve: {e}"));
            assert!(!config.bucket_prefix.ends_with('/'), "{id}: trailing slash");
            assert!(config.source_dataset_url.starts_with("https://"), "{id}");
        }
    }

    #[test]
    fn recency_defaults_follow_the_dataset_cadence() {
        assert_eq!(find("cvm_fi_inf_diario").unwrap().recency, Recency::Months(12));
        assert_eq!(find("cvm_fi_doc_extrato").unwrap().recency, Recency::Years(5));
        assert_eq!(find("inmet_dados_historicos").unwrap().recency, Recency::All);
    }

    #[test]
    fn external_datasets_are_not_mirrored() {
        let focos = find("inpe_area_queimada_focos1km").unwrap();
        assert!(!focos.mirror);
        assert!(focos.incremental);
        assert!(!find("eia_petroleum_monthly").unwrap().mirror);
        assert!(find("eia_petroleum_weekly").unwrap().mirror);
    }

    #[test]
    fn icvm555_tracks_a_single_current_file() {
        let config = find("cvm_fi_cad_icvm555_hist").unwrap();
        assert_eq!(config.source_dataset_url, "https://dados.cvm.gov.br/dataset/fi-cad");
        assert!(matches!(
            config.lister,
            ListerConfig::Ckan { data_filename: Some(ref f), .. } if f == "cad_fi_hist.zip"
        ));
    }

    #[test]
    fn unknown_dataset_is_a_config_error() {
        assert!(matches!(
            find("nope"),
            Err(ConfigError::UnknownDataset { .. })
        ));
    }
}
