//! Labeled polygon features tied to grid cells.

use crate::compute::validation::validate_coordinate;
use crate::error::Result;
use crate::grid::{CellAddress, CellGrid};
use crate::storage::{FeatureRecord, FeatureSource};
use geo::{CoordsIter, MultiPolygon};
use serde_json::Value;
use std::sync::Arc;

/// A label value, shared between the many features that carry it.
pub type Label = Arc<str>;

/// An immutable polygon with a label, a weak flag and the cell it belongs
/// to.
///
/// A weak label is a guess (from gap filling) that yields to non-weak labels.
/// `label` is `None` for features that carry no label at all.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledFeature<'g> {
    address: CellAddress<'g>,
    label_key: Arc<str>,
    label: Option<Label>,
    weak: bool,
    geometry: MultiPolygon,
}

impl<'g> LabeledFeature<'g> {
    pub fn address(&self) -> &CellAddress<'g> {
        &self.address
    }

    /// Name of the attribute the label is stored under.
    pub fn label_key(&self) -> &str {
        &self.label_key
    }

    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    pub fn geometry(&self) -> &MultiPolygon {
        &self.geometry
    }

    pub fn into_geometry(self) -> MultiPolygon {
        self.geometry
    }

    /// New feature with the same address and label key.
    pub fn sibling(
        &self,
        label: Option<Label>,
        weak: bool,
        geometry: impl Into<MultiPolygon>,
    ) -> Self {
        Self {
            address: self.address.clone(),
            label_key: self.label_key.clone(),
            label,
            weak,
            geometry: geometry.into(),
        }
    }

    /// Same feature moved to another cell.
    pub fn with_address(mut self, address: CellAddress<'g>) -> Self {
        self.address = address;
        self
    }

    /// Same label and weakness in another cell with another geometry.
    pub(crate) fn relocate(&self, address: CellAddress<'g>, geometry: MultiPolygon) -> Self {
        Self {
            address,
            label_key: self.label_key.clone(),
            label: self.label.clone(),
            weak: self.weak,
            geometry,
        }
    }

    /// Attribute lookup by name: the label key yields the label (or null),
    /// the grid's address attribute yields the serialized address.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if name == &*self.label_key {
            return Some(
                self.label
                    .as_ref()
                    .map_or(Value::Null, |l| Value::String(l.to_string())),
            );
        }
        if name == self.address.grid().attribute_name() {
            return Some(Value::String(self.address.to_attribute_value()));
        }
        None
    }

    /// Record carrying the label and the serialized address.
    pub fn to_record(&self) -> FeatureRecord {
        let label = self
            .label
            .as_ref()
            .map_or(Value::Null, |l| Value::String(l.to_string()));
        FeatureRecord::new(self.geometry.clone())
            .with_attribute(self.label_key.to_string(), label)
            .with_attribute(
                self.address.grid().attribute_name(),
                self.address.to_attribute_value(),
            )
    }
}

/// Creates features for one grid and label attribute.
#[derive(Debug, Clone)]
pub struct FeatureFactory<'g> {
    grid: &'g CellGrid,
    label_key: Arc<str>,
    address_attribute: String,
}

impl<'g> FeatureFactory<'g> {
    pub fn new(grid: &'g CellGrid, label_attribute: &str) -> Self {
        Self {
            grid,
            label_key: Arc::from(label_attribute),
            address_attribute: grid.attribute_name(),
        }
    }

    pub fn grid(&self) -> &'g CellGrid {
        self.grid
    }

    pub fn label_attribute(&self) -> &str {
        &self.label_key
    }

    /// Feature at the grid root.
    pub fn feature(
        &self,
        label: Option<Label>,
        weak: bool,
        geometry: impl Into<MultiPolygon>,
    ) -> LabeledFeature<'g> {
        self.feature_at(self.grid.root(), label, weak, geometry)
    }

    pub fn feature_at(
        &self,
        address: CellAddress<'g>,
        label: Option<Label>,
        weak: bool,
        geometry: impl Into<MultiPolygon>,
    ) -> LabeledFeature<'g> {
        LabeledFeature {
            address,
            label_key: self.label_key.clone(),
            label,
            weak,
            geometry: geometry.into(),
        }
    }

    /// Feature from a stored record. The address is read from the grid's
    /// address attribute when present and non-null, otherwise it is the root.
    ///
    /// # Errors
    ///
    /// `MalformedAddress` if the stored address does not parse,
    /// `InvalidInput` if a vertex is not finite.
    pub fn from_record(&self, record: &FeatureRecord) -> Result<LabeledFeature<'g>> {
        for vertex in record.geometry.coords_iter() {
            validate_coordinate(vertex)?;
        }
        let address = match record.text_attribute(&self.address_attribute) {
            Some(value) => CellAddress::from_attribute_value(self.grid, &value)?,
            None => self.grid.root(),
        };
        let label = record.text_attribute(&self.label_key).map(Label::from);
        Ok(self.feature_at(address, label, false, record.geometry.clone()))
    }

    /// All features of a source, in source order.
    pub fn from_source(&self, source: &dyn FeatureSource) -> Result<Vec<LabeledFeature<'g>>> {
        source
            .records()?
            .map(|record| self.from_record(&record?))
            .collect()
    }
}
