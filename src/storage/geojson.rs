//! GeoJSON file backend.
//!
//! Simplified datasets are written as a `FeatureCollection` whose `bbox` is
//! the grid envelope, so that a reader can rebuild the exact grid. The
//! envelope's coordinate-system tag goes into a top-level `crs` member.

use super::{FeatureRecord, FeatureSchema, FeatureSink, FeatureSource, bounds_of};
use crate::error::{LabelGridError, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use labelgrid_types::envelope::Envelope;
use serde_json::Map;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const CRS_MEMBER: &str = "crs";

/// Reads polygon features from a GeoJSON file.
///
/// The file is parsed on first use and the collection is kept, so records
/// can be iterated more than once. Non-polygonal features are skipped with a
/// warning.
#[derive(Debug, Clone)]
pub struct GeoJsonSource {
    path: PathBuf,
    collection: OnceLock<FeatureCollection>,
}

impl GeoJsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            collection: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn collection(&self) -> Result<&FeatureCollection> {
        if let Some(collection) = self.collection.get() {
            return Ok(collection);
        }
        let parsed = self.parse()?;
        log::debug!(
            "Parsed {} GeoJSON features from {}",
            parsed.features.len(),
            self.path.display()
        );
        Ok(self.collection.get_or_init(|| parsed))
    }

    fn parse(&self) -> Result<FeatureCollection> {
        let text = fs::read_to_string(&self.path)?;
        match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => Ok(collection),
            GeoJson::Feature(feature) => Ok(FeatureCollection {
                bbox: None,
                features: vec![feature],
                foreign_members: None,
            }),
            GeoJson::Geometry(_) => Err(LabelGridError::InvalidInput(format!(
                "{} holds a bare geometry, expected features",
                self.path.display()
            ))),
        }
    }

    /// Planar part of a 2D or 3D `bbox` member.
    fn bbox_envelope(&self, bbox: &[f64]) -> Result<Envelope> {
        match *bbox {
            [min_x, min_y, max_x, max_y] | [min_x, min_y, _, max_x, max_y, _] => {
                Ok(Envelope::new(min_x, min_y, max_x, max_y))
            }
            _ => Err(LabelGridError::InvalidInput(format!(
                "{} has a bbox of {} values, expected 4 or 6",
                self.path.display(),
                bbox.len()
            ))),
        }
    }
}

impl FeatureSource for GeoJsonSource {
    fn bounds(&self) -> Result<Option<Envelope>> {
        let collection = self.collection()?;
        if let Some(bbox) = &collection.bbox {
            let mut envelope = self.bbox_envelope(bbox)?;
            if let Some(serde_json::Value::String(crs)) = collection
                .foreign_members
                .as_ref()
                .and_then(|members| members.get(CRS_MEMBER))
            {
                envelope = envelope.with_crs(crs.clone());
            }
            return Ok(Some(envelope));
        }

        let records: Vec<FeatureRecord> = collection
            .features
            .iter()
            .filter_map(|f| feature_to_record(f).transpose())
            .collect::<Result<_>>()?;
        Ok(bounds_of(records.iter().map(|r| &r.geometry)))
    }

    fn attribute_names(&self) -> Result<Vec<String>> {
        let collection = self.collection()?;
        let mut names: Vec<String> = Vec::new();
        for feature in &collection.features {
            for key in feature.properties.iter().flat_map(|p| p.keys()) {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        Ok(names)
    }

    fn records(&self) -> Result<Box<dyn Iterator<Item = Result<FeatureRecord>> + '_>> {
        let collection = self.collection()?;
        Ok(Box::new(
            collection
                .features
                .iter()
                .filter_map(|f| feature_to_record(f).transpose()),
        ))
    }
}

/// Writes features to a GeoJSON file, replacing it.
#[derive(Debug, Clone)]
pub struct GeoJsonSink {
    path: PathBuf,
}

impl GeoJsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureSink for GeoJsonSink {
    fn write(
        &mut self,
        schema: &FeatureSchema,
        records: &mut dyn Iterator<Item = FeatureRecord>,
    ) -> Result<usize> {
        let features: Vec<Feature> = records.map(|r| record_to_feature(&r)).collect();
        let count = features.len();

        let env = &schema.envelope;
        let foreign_members = env.crs.as_ref().map(|crs| {
            let mut members = Map::new();
            members.insert(CRS_MEMBER.to_string(), crs.clone().into());
            members
        });
        let collection = FeatureCollection {
            bbox: Some(vec![env.min_x(), env.min_y(), env.max_x(), env.max_y()]),
            features,
            foreign_members,
        };

        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(&mut writer, &GeoJson::FeatureCollection(collection))?;
        writer.flush()?;
        log::info!("Wrote {} features to {}", count, self.path.display());
        Ok(count)
    }
}

fn feature_to_record(feature: &Feature) -> Result<Option<FeatureRecord>> {
    let Some(geometry) = &feature.geometry else {
        log::warn!("Skipping GeoJSON feature without geometry");
        return Ok(None);
    };
    let Some(geometry) = value_to_multipolygon(&geometry.value)? else {
        log::warn!("Skipping non-polygonal GeoJSON feature");
        return Ok(None);
    };
    Ok(Some(FeatureRecord {
        geometry,
        attributes: feature.properties.clone().unwrap_or_default(),
    }))
}

fn record_to_feature(record: &FeatureRecord) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(multipolygon_to_value(&record.geometry))),
        id: None,
        properties: Some(record.attributes.clone()),
        foreign_members: None,
    }
}

/// A single-member multipolygon is written as a plain `Polygon`.
fn multipolygon_to_value(geometry: &MultiPolygon) -> Value {
    match geometry.0.as_slice() {
        [polygon] => Value::Polygon(polygon_rings(polygon)),
        polygons => Value::MultiPolygon(polygons.iter().map(polygon_rings).collect()),
    }
}

fn polygon_rings(polygon: &Polygon) -> Vec<Vec<Vec<f64>>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect())
        .collect()
}

fn value_to_multipolygon(value: &Value) -> Result<Option<MultiPolygon>> {
    match value {
        Value::Polygon(rings) => Ok(Some(MultiPolygon::new(vec![rings_to_polygon(rings)?]))),
        Value::MultiPolygon(polygons) => Ok(Some(MultiPolygon::new(
            polygons
                .iter()
                .map(|rings| rings_to_polygon(rings))
                .collect::<Result<_>>()?,
        ))),
        _ => Ok(None),
    }
}

fn rings_to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon> {
    let mut rings = rings.iter().map(|ring| positions_to_ring(ring));
    let exterior = rings.next().ok_or_else(|| {
        LabelGridError::InvalidInput("Polygon must have at least one ring".to_string())
    })??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn positions_to_ring(positions: &[Vec<f64>]) -> Result<LineString> {
    positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(LabelGridError::InvalidInput(
                "Coordinate must have at least 2 values".to_string(),
            )),
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::from)
}
