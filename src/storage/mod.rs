//! Dataset sources and sinks.
//!
//! The simplifier reads polygon records with string attributes from a
//! [`FeatureSource`] and writes its output to a [`FeatureSink`]. Two backends
//! are provided: an in-memory store and GeoJSON files.

use crate::error::{LabelGridError, Result};
use crate::grid::{ADDRESS_ATTRIBUTE_PREFIX, CellGrid};
use geo::{BoundingRect, MultiPolygon};
use labelgrid_types::envelope::Envelope;
use serde_json::{Map, Value};

mod memory;
pub use memory::MemoryFeatures;

#[cfg(feature = "geojson")]
mod geojson;
#[cfg(feature = "geojson")]
pub use self::geojson::{GeoJsonSink, GeoJsonSource};

/// One polygon record with its attribute values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub geometry: MultiPolygon,
    pub attributes: Map<String, Value>,
}

impl FeatureRecord {
    pub fn new(geometry: impl Into<MultiPolygon>) -> Self {
        Self {
            geometry: geometry.into(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attribute value as text. Null and missing attributes are `None`;
    /// numbers and booleans are rendered as their JSON text.
    pub fn text_attribute(&self, name: &str) -> Option<String> {
        match self.attributes.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Layout of a simplified dataset: where labels and cell addresses live and
/// the envelope of the grid the addresses refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    pub label_attribute: String,
    pub address_attribute: String,
    pub envelope: Envelope,
}

impl FeatureSchema {
    /// Schema of the output written for `grid`.
    pub fn for_grid(grid: &CellGrid, label_attribute: impl Into<String>) -> Self {
        Self {
            label_attribute: label_attribute.into(),
            address_attribute: grid.attribute_name(),
            envelope: grid.envelope().clone(),
        }
    }

    /// Discover the schema of a previously simplified dataset.
    ///
    /// # Errors
    ///
    /// `SchemaMissingAttribute` if the label attribute or a `GI*` address
    /// attribute is absent; `InvalidInput` if the source has no bounds.
    pub fn from_source(source: &dyn FeatureSource, label_attribute: &str) -> Result<Self> {
        let names = source.attribute_names()?;
        if !names.iter().any(|n| n == label_attribute) {
            return Err(LabelGridError::SchemaMissingAttribute(
                label_attribute.to_string(),
            ));
        }
        let address_attribute = names
            .iter()
            .find(|n| n.starts_with(ADDRESS_ATTRIBUTE_PREFIX))
            .cloned()
            .ok_or_else(|| {
                LabelGridError::SchemaMissingAttribute(format!("{}*", ADDRESS_ATTRIBUTE_PREFIX))
            })?;
        let envelope = source.bounds()?.ok_or_else(|| {
            LabelGridError::InvalidInput("Dataset has no bounds".to_string())
        })?;
        Ok(Self {
            label_attribute: label_attribute.to_string(),
            address_attribute,
            envelope,
        })
    }

    /// Attribute names in output order.
    pub fn attribute_names(&self) -> Vec<String> {
        vec![self.label_attribute.clone(), self.address_attribute.clone()]
    }

    /// Rebuild the grid the stored addresses refer to.
    pub fn grid(&self) -> Result<CellGrid> {
        CellGrid::from_attribute_name(self.envelope.clone(), &self.address_attribute)
    }
}

/// A readable polygon dataset.
pub trait FeatureSource {
    /// Bounding envelope of the whole dataset, `None` when empty.
    fn bounds(&self) -> Result<Option<Envelope>>;

    /// Names of the attributes carried by the records.
    fn attribute_names(&self) -> Result<Vec<String>>;

    /// Iterate the records. May be called more than once.
    fn records(&self) -> Result<Box<dyn Iterator<Item = Result<FeatureRecord>> + '_>>;
}

/// A writable polygon dataset.
pub trait FeatureSink {
    /// Replace the sink's contents with `records`, returning how many were
    /// written.
    fn write(
        &mut self,
        schema: &FeatureSchema,
        records: &mut dyn Iterator<Item = FeatureRecord>,
    ) -> Result<usize>;
}

/// Union of the bounding rectangles of `geometries`.
pub(crate) fn bounds_of<'a>(
    geometries: impl IntoIterator<Item = &'a MultiPolygon>,
) -> Option<Envelope> {
    geometries
        .into_iter()
        .filter_map(|g| g.bounding_rect())
        .map(Envelope::from_rect)
        .reduce(|acc, env| acc.union(&env))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Rect, coord};

    fn square(min: f64, max: f64) -> MultiPolygon {
        Rect::new(coord! { x: min, y: min }, coord! { x: max, y: max })
            .to_polygon()
            .into()
    }

    #[test]
    fn test_text_attribute() {
        let record = FeatureRecord::new(square(0.0, 1.0))
            .with_attribute("name", "Europe/Paris")
            .with_attribute("code", 33)
            .with_attribute("nothing", Value::Null);
        assert_eq!(record.text_attribute("name").as_deref(), Some("Europe/Paris"));
        assert_eq!(record.text_attribute("code").as_deref(), Some("33"));
        assert_eq!(record.text_attribute("nothing"), None);
        assert_eq!(record.text_attribute("missing"), None);
    }

    #[test]
    fn test_schema_discovery() {
        let mut source = MemoryFeatures::new(vec![
            FeatureRecord::new(square(0.0, 1.0))
                .with_attribute("tzid", "A")
                .with_attribute("GI2_2", "0,0;"),
        ]);
        source.set_bounds(Envelope::new(0.0, 0.0, 4.0, 4.0));

        let schema = FeatureSchema::from_source(&source, "tzid").unwrap();
        assert_eq!(schema.address_attribute, "GI2_2");
        assert_eq!(schema.attribute_names(), vec!["tzid", "GI2_2"]);
        let grid = schema.grid().unwrap();
        assert_eq!(grid.branching(), &[2, 2]);
        assert_eq!(grid.envelope().max_x(), 4.0);

        let err = FeatureSchema::from_source(&source, "label").unwrap_err();
        assert!(matches!(err, LabelGridError::SchemaMissingAttribute(ref a) if a == "label"));
    }

    #[test]
    fn test_schema_requires_address_attribute() {
        let source = MemoryFeatures::new(vec![
            FeatureRecord::new(square(0.0, 1.0)).with_attribute("tzid", "A"),
        ]);
        let err = FeatureSchema::from_source(&source, "tzid").unwrap_err();
        assert!(matches!(err, LabelGridError::SchemaMissingAttribute(_)));
    }

    #[test]
    fn test_bounds_of() {
        let env = bounds_of([&square(0.0, 1.0), &square(2.0, 5.0)]).unwrap();
        assert_eq!(env, Envelope::new(0.0, 0.0, 5.0, 5.0));
        assert!(bounds_of(std::iter::empty()).is_none());
    }
}
