use super::{FeatureRecord, FeatureSchema, FeatureSink, FeatureSource, bounds_of};
use crate::error::Result;
use labelgrid_types::envelope::Envelope;

/// In-memory dataset usable as both source and sink.
///
/// Declared bounds and attribute names take precedence; otherwise they are
/// derived from the records. Writing replaces the records and records the
/// schema's envelope and attribute names.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeatures {
    records: Vec<FeatureRecord>,
    bounds: Option<Envelope>,
    attribute_names: Option<Vec<String>>,
}

impl MemoryFeatures {
    pub fn new(records: Vec<FeatureRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn push(&mut self, record: FeatureRecord) {
        self.records.push(record);
    }

    pub fn set_bounds(&mut self, bounds: Envelope) {
        self.bounds = Some(bounds);
    }

    pub fn set_attribute_names(&mut self, names: Vec<String>) {
        self.attribute_names = Some(names);
    }

    pub fn as_slice(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FeatureRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FeatureSource for MemoryFeatures {
    fn bounds(&self) -> Result<Option<Envelope>> {
        if let Some(bounds) = &self.bounds {
            return Ok(Some(bounds.clone()));
        }
        Ok(bounds_of(self.records.iter().map(|r| &r.geometry)))
    }

    fn attribute_names(&self) -> Result<Vec<String>> {
        if let Some(names) = &self.attribute_names {
            return Ok(names.clone());
        }
        let mut names: Vec<String> = Vec::new();
        for record in &self.records {
            for key in record.attributes.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        Ok(names)
    }

    fn records(&self) -> Result<Box<dyn Iterator<Item = Result<FeatureRecord>> + '_>> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }
}

impl FeatureSink for MemoryFeatures {
    fn write(
        &mut self,
        schema: &FeatureSchema,
        records: &mut dyn Iterator<Item = FeatureRecord>,
    ) -> Result<usize> {
        self.records = records.collect();
        self.bounds = Some(schema.envelope.clone());
        self.attribute_names = Some(schema.attribute_names());
        log::debug!("Stored {} records in memory", self.records.len());
        Ok(self.records.len())
    }
}
