//! Geometry and statistics providers
//!
//! The cartogram core only sees two opaque lookups: projected centroids per
//! region and statistical values per region. This module defines those traits,
//! an in-memory implementation and a file-backed one reading Nuts2json-style
//! centroid GeoJSON and Eurostat JSON-stat datasets.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::config::{ConfigError, NutsLevel};
use crate::projection::{BoundingBox, IdentityFit};

/// Errors raised by geometry or statistics providers
#[derive(Error, Debug)]
pub enum ProviderError {
    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// A document parsed but its content is unusable
    #[error("malformed data: {0}")]
    Malformed(String),

    /// Nothing is available for the requested level
    #[error("no dataset available: {0}")]
    MissingDataset(String),

    /// The configuration asked for cannot be built
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A region centroid, already projected to planar viewbox coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Centroid {
    pub id: String,
    pub name: Option<String>,
    pub x: f64,
    pub y: f64,
}

impl Centroid {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            x,
            y,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Statistical values keyed by region id. `None` marks a region without a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    /// Values driving the circle size
    pub size: HashMap<String, Option<f64>>,
    /// Values driving the circle color
    pub color: HashMap<String, Option<f64>>,
}

/// Supplies projected region centroids
pub trait GeometryProvider {
    /// Centroids of every region at the given level
    fn centroids(&self, level: NutsLevel) -> ProviderResult<Vec<Centroid>>;
}

/// Supplies statistical values
pub trait StatisticsProvider {
    /// Size and color values of every region at the given level
    fn statistics(&self, level: NutsLevel) -> ProviderResult<Statistics>;
}

/// Geometry held in memory, one centroid list per level
#[derive(Debug, Clone, Default)]
pub struct StaticGeometry {
    levels: HashMap<NutsLevel, Vec<Centroid>>,
}

impl StaticGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: NutsLevel, centroids: Vec<Centroid>) -> Self {
        self.levels.insert(level, centroids);
        self
    }
}

impl GeometryProvider for StaticGeometry {
    fn centroids(&self, level: NutsLevel) -> ProviderResult<Vec<Centroid>> {
        self.levels
            .get(&level)
            .cloned()
            .ok_or_else(|| ProviderError::MissingDataset(format!("centroids for {level}")))
    }
}

/// Statistics held in memory, one set per level
#[derive(Debug, Clone, Default)]
pub struct StaticStatistics {
    levels: HashMap<NutsLevel, Statistics>,
}

impl StaticStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: NutsLevel, statistics: Statistics) -> Self {
        self.levels.insert(level, statistics);
        self
    }
}

impl StatisticsProvider for StaticStatistics {
    fn statistics(&self, level: NutsLevel) -> ProviderResult<Statistics> {
        self.levels
            .get(&level)
            .cloned()
            .ok_or_else(|| ProviderError::MissingDataset(format!("statistics for {level}")))
    }
}

/// Reads `nutspt_{level}.json` point collections from a directory and fits
/// them to the viewbox
#[derive(Debug, Clone)]
pub struct FileGeometry {
    dir: PathBuf,
    width: f64,
    padding: f64,
}

impl FileGeometry {
    pub fn new(dir: impl Into<PathBuf>, width: f64, padding: f64) -> Self {
        Self {
            dir: dir.into(),
            width,
            padding,
        }
    }

    /// Path of the centroid file for a level
    pub fn path_for(&self, level: NutsLevel) -> PathBuf {
        self.dir.join(format!("nutspt_{}.json", level.as_u8()))
    }
}

impl GeometryProvider for FileGeometry {
    fn centroids(&self, level: NutsLevel) -> ProviderResult<Vec<Centroid>> {
        let content = read_dataset(&self.path_for(level))?;
        parse_centroids(&content, self.width, self.padding)
    }
}

/// Reads `size_{geo}.json` and `color_{geo}.json` JSON-stat datasets from a
/// directory, where `{geo}` is `country` or `nuts{n}`
#[derive(Debug, Clone)]
pub struct FileStatistics {
    dir: PathBuf,
}

impl FileStatistics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Paths of the size and color datasets for a level
    pub fn paths_for(&self, level: NutsLevel) -> (PathBuf, PathBuf) {
        let geo = level.geo_level_param();
        (
            self.dir.join(format!("size_{geo}.json")),
            self.dir.join(format!("color_{geo}.json")),
        )
    }
}

impl StatisticsProvider for FileStatistics {
    fn statistics(&self, level: NutsLevel) -> ProviderResult<Statistics> {
        let (size_path, color_path) = self.paths_for(level);
        Ok(Statistics {
            size: index_statistic(&read_dataset(&size_path)?)?,
            color: index_statistic(&read_dataset(&color_path)?)?,
        })
    }
}

fn read_dataset(path: &Path) -> ProviderResult<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            ProviderError::MissingDataset(path.display().to_string())
        }
        _ => ProviderError::Io(e),
    })
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<PointGeometry>,
    properties: FeatureProperties,
}

#[derive(Deserialize)]
struct PointGeometry {
    coordinates: Vec<f64>,
}

#[derive(Deserialize)]
struct FeatureProperties {
    id: String,
    #[serde(default)]
    na: Option<String>,
}

/// Parse a GeoJSON point collection and fit it into a viewbox of `width`
pub fn parse_centroids(content: &str, width: f64, padding: f64) -> ProviderResult<Vec<Centroid>> {
    let collection: FeatureCollection =
        serde_json::from_str(content).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let mut planar = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let id = feature.properties.id;
        let coordinates = feature
            .geometry
            .map(|g| g.coordinates)
            .ok_or_else(|| ProviderError::Malformed(format!("region {id} has no geometry")))?;
        let [x, y] = coordinates[..] else {
            return Err(ProviderError::Malformed(format!(
                "region {id} is not a 2D point"
            )));
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(ProviderError::Malformed(format!(
                "region {id} has non-finite coordinates"
            )));
        }
        planar.push((id, feature.properties.na, x, y));
    }

    let bounds = BoundingBox::of_points(planar.iter().map(|(_, _, x, y)| (*x, *y)));
    let fit = IdentityFit::fit(&bounds, width, padding);

    Ok(planar
        .into_iter()
        .map(|(id, name, x, y)| {
            let (px, py) = fit.project(x, y);
            Centroid {
                id,
                name,
                x: px,
                y: py,
            }
        })
        .collect())
}

#[derive(Deserialize)]
struct JsonStat {
    dimension: JsonStatDimensions,
    #[serde(default)]
    value: JsonStatValues,
}

#[derive(Deserialize)]
struct JsonStatDimensions {
    geo: JsonStatDimension,
}

#[derive(Deserialize)]
struct JsonStatDimension {
    category: JsonStatCategory,
}

#[derive(Deserialize)]
struct JsonStatCategory {
    index: CategoryIndex,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryIndex {
    Positions(HashMap<String, usize>),
    Ordered(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonStatValues {
    Sparse(HashMap<String, Option<f64>>),
    Dense(Vec<Option<f64>>),
}

impl Default for JsonStatValues {
    fn default() -> Self {
        JsonStatValues::Sparse(HashMap::new())
    }
}

impl JsonStatValues {
    fn get(&self, position: usize) -> Option<f64> {
        match self {
            JsonStatValues::Sparse(values) => values.get(&position.to_string()).copied().flatten(),
            JsonStatValues::Dense(values) => values.get(position).copied().flatten(),
        }
    }
}

/// Index a JSON-stat dataset by its `geo` dimension.
///
/// Every geo category appears in the result; categories without a value map to `None`.
pub fn index_statistic(content: &str) -> ProviderResult<HashMap<String, Option<f64>>> {
    let dataset: JsonStat =
        serde_json::from_str(content).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let positions: Vec<(String, usize)> = match dataset.dimension.geo.category.index {
        CategoryIndex::Positions(map) => map.into_iter().collect(),
        CategoryIndex::Ordered(ids) => ids.into_iter().enumerate().map(|(i, id)| (id, i)).collect(),
    };

    Ok(positions
        .into_iter()
        .map(|(id, position)| {
            let value = dataset.value.get(position).filter(|v| v.is_finite());
            (id, value)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENTROIDS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [4000000, 3000000]},
             "properties": {"id": "BE10", "na": "Région de Bruxelles-Capitale"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [5000000, 2000000]},
             "properties": {"id": "AT13", "na": "Wien"}}
        ]
    }"#;

    #[test]
    fn parses_and_fits_centroids() {
        let centroids = parse_centroids(CENTROIDS, 1000.0, 0.0).unwrap();

        assert_eq!(centroids.len(), 2);
        assert_eq!(centroids[0].id, "BE10");
        assert_eq!(centroids[1].name.as_deref(), Some("Wien"));
        // north-west corner at the origin, south-east at the far corner
        assert!((centroids[0].x - 0.0).abs() < 1e-6);
        assert!((centroids[0].y - 0.0).abs() < 1e-6);
        assert!((centroids[1].x - 1000.0).abs() < 1e-6);
        assert!((centroids[1].y - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_non_point_geometry() {
        let content = r#"{"features": [{"geometry": {"coordinates": [1.0]}, "properties": {"id": "X"}}]}"#;
        let err = parse_centroids(content, 100.0, 0.0).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = parse_centroids("{not json", 100.0, 0.0).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn indexes_sparse_json_stat() {
        let content = r#"{
            "value": {"0": 1200.5, "2": 300},
            "dimension": {"geo": {"category": {"index": {"BE10": 0, "BE21": 1, "BE22": 2}}}}
        }"#;
        let index = index_statistic(content).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index["BE10"], Some(1200.5));
        assert_eq!(index["BE21"], None);
        assert_eq!(index["BE22"], Some(300.0));
    }

    #[test]
    fn indexes_dense_json_stat() {
        let content = r#"{
            "value": [5, null, 7],
            "dimension": {"geo": {"category": {"index": ["DK01", "DK02", "DK03"]}}}
        }"#;
        let index = index_statistic(content).unwrap();

        assert_eq!(index["DK01"], Some(5.0));
        assert_eq!(index["DK02"], None);
        assert_eq!(index["DK03"], Some(7.0));
    }

    #[test]
    fn static_providers_report_missing_levels() {
        let geometry = StaticGeometry::new().with_level(NutsLevel::Nuts2, vec![Centroid::new("A", 0.0, 0.0)]);
        assert_eq!(geometry.centroids(NutsLevel::Nuts2).unwrap().len(), 1);
        assert!(matches!(
            geometry.centroids(NutsLevel::Nuts3),
            Err(ProviderError::MissingDataset(_))
        ));

        let statistics = StaticStatistics::new();
        assert!(statistics.statistics(NutsLevel::Country).is_err());
    }

    #[test]
    fn file_providers_report_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = FileGeometry::new(dir.path(), 1000.0, 0.0);
        assert!(matches!(
            geometry.centroids(NutsLevel::Nuts1),
            Err(ProviderError::MissingDataset(_))
        ));

        let statistics = FileStatistics::new(dir.path());
        let (size, color) = statistics.paths_for(NutsLevel::Country);
        assert!(size.ends_with("size_country.json"));
        assert!(color.ends_with("color_country.json"));
    }
}
