//! Hierarchical grid simplification and point lookup for labeled polygons.
//!
//! Polygons carrying a label (a time zone, a country code) are cut along a
//! fixed grid of nested cells. Cells covered by a single label collapse into
//! rectangles, so a later lookup only has to locate the cell and read its
//! label. Optional gap filling infers weak labels for regions no polygon
//! covers.
//!
//! ```rust
//! use labelgrid::prelude::*;
//! use geo::{Rect, coord};
//!
//! let strip = |min_x: f64, max_x: f64, label: &str| {
//!     let rect = Rect::new(coord! { x: min_x, y: 0.0 }, coord! { x: max_x, y: 4.0 });
//!     FeatureRecord::new(rect.to_polygon()).with_attribute("label", label)
//! };
//! let source = MemoryFeatures::new(vec![strip(0.0, 2.0, "A"), strip(2.0, 4.0, "B")]);
//! let mut output = MemoryFeatures::default();
//!
//! let pipeline = PipelineBuilder::new().branching(vec![2, 2]).build()?;
//! let report = pipeline.run(&source, &mut output)?;
//! assert_eq!(report.written, 4);
//!
//! let grid = pipeline.open_grid(&output)?;
//! let index = pipeline.load_index(&grid, &output)?;
//! let lookup = index.with(LabelFilter::BoundingBox(grid.envelope().clone()));
//! assert_eq!(lookup.label_for(coord! { x: 1.0, y: 1.0 }).as_deref(), Some("A"));
//! assert_eq!(lookup.label_for(coord! { x: 9.0, y: 1.0 }), None);
//! # Ok::<(), labelgrid::LabelGridError>(())
//! ```

pub mod builder;
pub mod compute;
pub mod config;
pub mod error;
pub mod feature;
pub mod filter;
pub mod grid;
pub mod index;
pub mod storage;

pub use builder::{Pipeline, PipelineBuilder, PipelineReport};
pub use compute::{
    GapFillStats, GapFilled, GapFiller, GeometryEngine, GridSimplifier, PlanarEngine, Simplified,
    SimplifyStats,
};
pub use config::{Config, IndexOptions};
pub use error::{LabelGridError, Result};
pub use feature::{FeatureFactory, Label, LabeledFeature};
pub use filter::{FilterChain, LabelFilter, NearestBy};
pub use grid::{CellAddress, CellGrid};
pub use index::{CellContent, LabelQuery, SpatialIndex};
pub use labelgrid_types::envelope::Envelope;

pub use storage::{FeatureRecord, FeatureSchema, FeatureSink, FeatureSource, MemoryFeatures};

#[cfg(feature = "geojson")]
pub use storage::{GeoJsonSink, GeoJsonSource};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{LabelGridError, PipelineBuilder, Result};

    pub use crate::{CellAddress, CellGrid, Envelope};

    pub use crate::{FeatureFactory, Label, LabeledFeature};

    pub use crate::{FilterChain, LabelFilter, LabelQuery, NearestBy, SpatialIndex};

    pub use crate::{Config, IndexOptions};

    pub use crate::{FeatureRecord, FeatureSink, FeatureSource, MemoryFeatures};

    #[cfg(feature = "geojson")]
    pub use crate::{GeoJsonSink, GeoJsonSource};
}
