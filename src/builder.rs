//! Pipeline builder and the batch simplification pipeline.
//!
//! A [`Pipeline`] reads a polygon dataset, optionally infers weak labels for
//! the uncovered regions, simplifies everything onto a [`CellGrid`] spanning
//! the dataset bounds, and writes the result to a sink. The same pipeline can
//! later open the written dataset and index it for lookups.

use crate::compute::engine::{GeometryEngine, PlanarEngine};
use crate::compute::gap_fill::GapFiller;
use crate::compute::simplify::{GridSimplifier, Simplified, SimplifyStats};
use crate::config::{Config, IndexOptions};
use crate::error::{LabelGridError, Result};
use crate::feature::{FeatureFactory, LabeledFeature};
use crate::grid::CellGrid;
use crate::index::SpatialIndex;
use crate::storage::{FeatureSchema, FeatureSink, FeatureSource};
use labelgrid_types::envelope::Envelope;

/// Builder for a [`Pipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    config: Config,
}

impl PipelineBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn branching(mut self, branching: impl Into<Vec<u32>>) -> Self {
        self.config = self.config.with_branching(branching);
        self
    }

    pub fn label_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.config = self.config.with_label_attribute(attribute);
        self
    }

    pub fn simplify_single_label_cells(mut self, enabled: bool) -> Self {
        self.config = self.config.with_simplify_single_label_cells(enabled);
        self
    }

    pub fn fill_gaps(mut self, enabled: bool) -> Self {
        self.config = self.config.with_fill_gaps(enabled);
        self
    }

    pub fn index_options(mut self, options: IndexOptions) -> Self {
        self.config = self.config.with_index_options(options);
        self
    }

    /// Validate the configuration and build the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        self.build_with_engine(PlanarEngine)
    }

    pub fn build_with_engine<E: GeometryEngine + Clone>(self, engine: E) -> Result<Pipeline<E>> {
        Pipeline::with_engine(self.config, engine)
    }
}

/// Counts reported by [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Features read from the source.
    pub input_features: usize,
    /// Weak features added by gap filling.
    pub gap_features: usize,
    pub stats: SimplifyStats,
    /// Records accepted by the sink.
    pub written: usize,
}

/// Source → gap filling → simplification → sink.
#[derive(Debug, Clone)]
pub struct Pipeline<E: GeometryEngine = PlanarEngine> {
    config: Config,
    engine: E,
}

impl Pipeline<PlanarEngine> {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_engine(config, PlanarEngine)
    }
}

impl<E: GeometryEngine + Clone> Pipeline<E> {
    pub fn with_engine(config: Config, engine: E) -> Result<Self> {
        config.validate().map_err(LabelGridError::Config)?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Grid with the configured branching over `envelope`.
    pub fn grid_for(&self, envelope: Envelope) -> Result<CellGrid> {
        CellGrid::new(envelope, self.config.branching.clone())
    }

    /// Read `source` and simplify it onto `grid`, filling gaps first when
    /// configured.
    pub fn simplify_features<'g>(
        &self,
        grid: &'g CellGrid,
        source: &dyn FeatureSource,
    ) -> Result<Simplified<'g>> {
        let (features, _) = self.prepare(grid, source)?;
        self.simplifier(grid).simplify(features)
    }

    /// Simplify `source` onto a grid spanning its bounds and write the result
    /// to `sink`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the source has no bounds; storage errors from the
    /// source or sink. A failed gap fill is logged and skipped.
    pub fn run(
        &self,
        source: &dyn FeatureSource,
        sink: &mut dyn FeatureSink,
    ) -> Result<PipelineReport> {
        let envelope = source.bounds()?.ok_or_else(|| {
            LabelGridError::InvalidInput("Source dataset has no bounds".to_string())
        })?;
        let grid = self.grid_for(envelope)?;
        log::info!(
            "Simplifying onto grid {} over {:?}",
            grid.attribute_name(),
            grid.envelope().rect
        );

        let (features, gap_features) = self.prepare(&grid, source)?;
        let input_features = features.len() - gap_features;
        let simplified = self.simplifier(&grid).simplify(features)?;

        let schema = FeatureSchema::for_grid(&grid, self.config.label_attribute.as_str());
        let mut records = simplified.features.iter().map(LabeledFeature::to_record);
        let written = sink.write(&schema, &mut records)?;

        let report = PipelineReport {
            input_features,
            gap_features,
            stats: simplified.stats,
            written,
        };
        log::info!(
            "Pipeline finished: {} input, {} gap, {} written",
            report.input_features,
            report.gap_features,
            report.written
        );
        Ok(report)
    }

    /// Rebuild the grid a simplified dataset was written with.
    pub fn open_grid(&self, source: &dyn FeatureSource) -> Result<CellGrid> {
        FeatureSchema::from_source(source, &self.config.label_attribute)?.grid()
    }

    /// Index a simplified dataset written for `grid`. Cells are only
    /// collapsed to a bare label when simplification is on.
    pub fn load_index<'g>(
        &self,
        grid: &'g CellGrid,
        source: &dyn FeatureSource,
    ) -> Result<SpatialIndex<'g, E>> {
        SpatialIndex::load_with_engine(
            grid,
            source,
            &self.config.label_attribute,
            self.config.effective_index_options(),
            self.engine.clone(),
        )
    }

    fn simplifier<'g>(&self, grid: &'g CellGrid) -> GridSimplifier<'g, E> {
        GridSimplifier::with_engine(grid, self.engine.clone())
            .simplify_single_label_cells(self.config.simplify_single_label_cells)
    }

    // Input features followed by gap features, and the gap feature count.
    fn prepare<'g>(
        &self,
        grid: &'g CellGrid,
        source: &dyn FeatureSource,
    ) -> Result<(Vec<LabeledFeature<'g>>, usize)> {
        let factory = FeatureFactory::new(grid, &self.config.label_attribute);
        let mut features = factory.from_source(source)?;
        log::debug!("Read {} input features", features.len());
        if !self.config.fill_gaps {
            return Ok((features, 0));
        }

        match GapFiller::with_engine(grid, self.engine.clone()).fill(&factory, &features) {
            Ok(filled) => {
                let added = filled.features.len();
                features.extend(filled.features);
                Ok((features, added))
            }
            Err(e) => {
                log::warn!("Gap filling failed, continuing without gap features: {}", e);
                Ok((features, 0))
            }
        }
    }
}
