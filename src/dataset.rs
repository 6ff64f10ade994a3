//! Derivation of circle entities from provider output
//!
//! Everything here is pure: a [`Dataset`] is computed in full before the
//! controller tears anything down, so a failing provider never leaves a half
//! rebuilt cartogram behind.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::config::DorlingConfig;
use crate::io::{
    Centroid, GeometryProvider, ProviderError, ProviderResult, Statistics, StatisticsProvider,
};
use crate::model::{country_code, CircleEntity, TooltipInfo};
use crate::radius::{default_legend_values, RadiusModel};

/// Aggregate codes that are never drawn
const AGGREGATES: &[&str] = &["EU28", "EU27_2020"];

/// Country names keyed by two-letter prefix
const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("BE", "Belgium"),
    ("BG", "Bulgaria"),
    ("CZ", "Czechia"),
    ("DK", "Denmark"),
    ("DE", "Germany"),
    ("EE", "Estonia"),
    ("IE", "Ireland"),
    ("EL", "Greece"),
    ("ES", "Spain"),
    ("FR", "France"),
    ("HR", "Croatia"),
    ("IT", "Italy"),
    ("CY", "Cyprus"),
    ("LV", "Latvia"),
    ("LT", "Lithuania"),
    ("LU", "Luxembourg"),
    ("HU", "Hungary"),
    ("MT", "Malta"),
    ("NL", "Netherlands"),
    ("AT", "Austria"),
    ("PL", "Poland"),
    ("PT", "Portugal"),
    ("RO", "Romania"),
    ("SI", "Slovenia"),
    ("SK", "Slovakia"),
    ("FI", "Finland"),
    ("SE", "Sweden"),
    ("IS", "Iceland"),
    ("LI", "Liechtenstein"),
    ("NO", "Norway"),
    ("CH", "Switzerland"),
    ("ME", "Montenegro"),
    ("MK", "North Macedonia"),
    ("AL", "Albania"),
    ("RS", "Serbia"),
    ("TR", "Turkey"),
    ("BA", "Bosnia and Herzegovina"),
    ("XK", "Kosovo"),
    ("UK", "United Kingdom"),
];

/// Country name for a two-letter prefix
pub fn country_name(code: &str) -> Option<&'static str> {
    COUNTRY_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// One size legend entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LegendEntry {
    pub value: f64,
    pub radius: f64,
}

/// Entities and lookup tables for one generation
#[derive(Debug, Clone)]
pub struct Dataset {
    /// One entity per drawn region, resting on its target
    pub entities: Vec<CircleEntity>,
    /// Size value per region, after exclusion
    pub size: HashMap<String, Option<f64>>,
    /// Color value per region
    pub color: HashMap<String, Option<f64>>,
    /// Sum of the size values per country prefix
    pub country_totals: HashMap<String, f64>,
    /// Smallest and largest size values
    pub size_extent: Option<(f64, f64)>,
    /// Size legend, either configured or derived from the data
    pub size_legend: Vec<LegendEntry>,
}

impl Dataset {
    /// Fetch from the providers and derive everything for `config`
    pub fn load(
        config: &DorlingConfig,
        geometry: &dyn GeometryProvider,
        statistics: &dyn StatisticsProvider,
    ) -> ProviderResult<Self> {
        let centroids = geometry.centroids(config.nuts_level)?;
        let stats = statistics.statistics(config.nuts_level)?;
        Self::derive(config, centroids, stats)
    }

    /// Derive entities from already fetched centroids and statistics
    pub fn derive(
        config: &DorlingConfig,
        centroids: Vec<Centroid>,
        statistics: Statistics,
    ) -> ProviderResult<Self> {
        let excluded = |id: &str| config.exclude.iter().any(|code| code == country_code(id));

        // totals are taken before exclusion, as shares refer to the whole country
        let country_totals = totals_by_country(&statistics.size);

        let size: HashMap<String, Option<f64>> = statistics
            .size
            .into_iter()
            .filter(|(id, _)| !excluded(id) && !AGGREGATES.contains(&id.as_str()))
            .collect();
        let color = statistics.color;

        let model = config.radius_model();
        let mut seen = HashSet::new();
        let mut entities = Vec::with_capacity(centroids.len());
        for centroid in centroids {
            if excluded(&centroid.id) {
                continue;
            }
            if !centroid.x.is_finite() || !centroid.y.is_finite() {
                return Err(ProviderError::Malformed(format!(
                    "region {} has a non-finite position",
                    centroid.id
                )));
            }
            if !seen.insert(centroid.id.clone()) {
                return Err(ProviderError::Malformed(format!(
                    "region {} appears twice",
                    centroid.id
                )));
            }

            let value = size.get(&centroid.id).copied().flatten();
            let color_value = color.get(&centroid.id).copied().flatten();
            let mut entity = CircleEntity::new(centroid.id, centroid.x, centroid.y)
                .with_value(value)
                .with_color_value(color_value)
                .with_radius(model.radius(value));
            entity.name = centroid.name;
            entities.push(entity);
        }

        let size_extent = extent(size.values().filter_map(|v| *v));
        let legend_values = if config.size_legend_values.is_empty() {
            size_extent
                .map(|(_, max)| default_legend_values(max))
                .unwrap_or_default()
        } else {
            config.size_legend_values.clone()
        };
        let size_legend = legend_entries(&model, &legend_values);

        Ok(Self {
            entities,
            size,
            color,
            country_totals,
            size_extent,
            size_legend,
        })
    }

    /// Tooltip data for a region
    pub fn tooltip(&self, id: &str) -> Option<TooltipInfo> {
        let entity = self.entities.iter().find(|e| e.id == id)?;
        let code = country_code(id);
        let size_value = entity.value;
        let share_percent = match (size_value, self.country_totals.get(code)) {
            (Some(v), Some(total)) if *total > 0.0 => Some((v / total * 100.0).round() as i64),
            _ => None,
        };
        Some(TooltipInfo {
            id: entity.id.clone(),
            name: entity.name.clone(),
            country: country_name(code),
            size_value,
            share_percent,
            color_value: entity.color_value,
        })
    }
}

fn totals_by_country(size: &HashMap<String, Option<f64>>) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for (id, value) in size {
        if AGGREGATES.contains(&id.as_str()) {
            continue;
        }
        if let Some(v) = value.filter(|v| v.is_finite()) {
            *totals.entry(country_code(id).to_string()).or_insert(0.0) += v;
        }
    }
    totals
}

fn extent(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn legend_entries(model: &RadiusModel, values: &[f64]) -> Vec<LegendEntry> {
    values
        .iter()
        .map(|&value| LegendEntry {
            value,
            radius: model.radius(Some(value)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radius::MissingValuePolicy;

    fn statistics(size: &[(&str, Option<f64>)]) -> Statistics {
        Statistics {
            size: size.iter().map(|(id, v)| (id.to_string(), *v)).collect(),
            color: size
                .iter()
                .map(|(id, _)| (id.to_string(), Some(1.5)))
                .collect(),
        }
    }

    fn centroids(ids: &[&str]) -> Vec<Centroid> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Centroid::new(*id, i as f64 * 10.0, 5.0))
            .collect()
    }

    #[test]
    fn derives_entities_on_their_targets() {
        let config = DorlingConfig::default().with_radius_scale(1.0).with_exaggeration(1.0);
        let data = Dataset::derive(
            &config,
            centroids(&["DE11", "DE12"]),
            statistics(&[("DE11", Some(100.0)), ("DE12", Some(400.0))]),
        )
        .unwrap();

        assert_eq!(data.entities.len(), 2);
        let e = &data.entities[1];
        assert_eq!((e.x, e.y), (e.target_x, e.target_y));
        assert_eq!(e.radius, 20.0);
        assert_eq!(e.color_value, Some(1.5));
        assert_eq!(data.size_extent, Some((100.0, 400.0)));
    }

    #[test]
    fn missing_values_get_policy_radius() {
        let config = DorlingConfig::default()
            .with_missing_value(MissingValuePolicy::Minimum { radius: 2.0 });
        let data = Dataset::derive(
            &config,
            centroids(&["FR10", "FR21"]),
            statistics(&[("FR10", None)]),
        )
        .unwrap();

        for e in &data.entities {
            assert_eq!(e.value, None);
            assert_eq!(e.radius, 2.0);
        }
    }

    #[test]
    fn excludes_countries_and_aggregates() {
        let config = DorlingConfig::default().with_exclude(["TR"]);
        let data = Dataset::derive(
            &config,
            centroids(&["TR10", "EL30"]),
            statistics(&[
                ("TR10", Some(10.0)),
                ("EL30", Some(20.0)),
                ("EU28", Some(1000.0)),
            ]),
        )
        .unwrap();

        assert_eq!(data.entities.len(), 1);
        assert_eq!(data.entities[0].id, "EL30");
        assert!(!data.size.contains_key("TR10"));
        assert!(!data.size.contains_key("EU28"));
        assert_eq!(data.size_extent, Some((20.0, 20.0)));
    }

    #[test]
    fn tooltip_reports_share_of_country() {
        let config = DorlingConfig::default();
        let mut cs = centroids(&["AT11", "AT12", "AT13"]);
        cs[2] = cs[2].clone().with_name("Wien");
        let data = Dataset::derive(
            &config,
            cs,
            statistics(&[
                ("AT11", Some(25.0)),
                ("AT12", Some(25.0)),
                ("AT13", Some(50.0)),
            ]),
        )
        .unwrap();

        let tip = data.tooltip("AT13").unwrap();
        assert_eq!(tip.name.as_deref(), Some("Wien"));
        assert_eq!(tip.country, Some("Austria"));
        assert_eq!(tip.share_percent, Some(50));
        assert!(data.tooltip("XX99").is_none());
    }

    #[test]
    fn rejects_duplicate_regions() {
        let err = Dataset::derive(
            &DorlingConfig::default(),
            centroids(&["NL11", "NL11"]),
            Statistics::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn rejects_non_finite_positions() {
        let err = Dataset::derive(
            &DorlingConfig::default(),
            vec![Centroid::new("NL11", f64::NAN, 0.0)],
            Statistics::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn legend_derived_from_max() {
        let config = DorlingConfig::default();
        let data = Dataset::derive(
            &config,
            centroids(&["SE11"]),
            statistics(&[("SE11", Some(2_000_000.0))]),
        )
        .unwrap();

        let values: Vec<f64> = data.size_legend.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![2_000_000.0, 1_000_000.0, 200_000.0]);
        assert!(data.size_legend[0].radius > data.size_legend[1].radius);
    }

    #[test]
    fn country_names_lookup() {
        assert_eq!(country_name("EL"), Some("Greece"));
        assert_eq!(country_name("ZZ"), None);
    }
}
