//! Point lookup over simplified features.
//!
//! A [`SpatialIndex`] maps cell addresses to their content. A lookup locates
//! the deepest cell containing the coordinate and walks up through its
//! ancestors until it finds a stored cell, so a rectangle stored for a coarse
//! cell answers for every point inside it.

use crate::compute::engine::{GeometryEngine, PlanarEngine};
use crate::config::IndexOptions;
use crate::error::{LabelGridError, Result};
use crate::feature::{FeatureFactory, Label, LabeledFeature};
use crate::filter::{FilterChain, LabelFilter};
use crate::grid::{CellAddress, CellGrid};
use crate::storage::FeatureSource;
use geo::Coord;
use rustc_hash::FxHashMap;

/// Answers "which label covers this coordinate?".
pub trait LabelQuery {
    /// Label at `coordinate`, or `None` when nothing covers it.
    fn label_for(&self, coordinate: Coord) -> Option<Label>;

    /// Features stored in the cell that answers for `coordinate`.
    fn colocated_features(&self, coordinate: Coord) -> &[LabeledFeature<'_>];

    /// Wrap this query in a [`FilterChain`] holding `filter`.
    fn with(self, filter: LabelFilter) -> FilterChain<Self>
    where
        Self: Sized,
    {
        FilterChain::new(self).with(filter)
    }
}

impl<Q: LabelQuery + ?Sized> LabelQuery for &Q {
    fn label_for(&self, coordinate: Coord) -> Option<Label> {
        (**self).label_for(coordinate)
    }

    fn colocated_features(&self, coordinate: Coord) -> &[LabeledFeature<'_>] {
        (**self).colocated_features(coordinate)
    }
}

/// Content of one indexed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent<'g> {
    /// The cell is known to carry no label.
    Empty,
    /// The whole cell resolves to this feature's label.
    Single(LabeledFeature<'g>),
    /// Features that split the cell; lookups test containment in order.
    Features(Vec<LabeledFeature<'g>>),
}

impl<'g> CellContent<'g> {
    fn from_group(mut members: Vec<LabeledFeature<'g>>, options: IndexOptions) -> Self {
        if members.iter().all(|m| m.label().is_none()) {
            return CellContent::Empty;
        }
        if options.collapse_single_label_cells
            && members.len() == 1
            && let Some(only) = members.pop()
        {
            return CellContent::Single(only);
        }
        CellContent::Features(members)
    }

    pub fn features(&self) -> &[LabeledFeature<'g>] {
        match self {
            CellContent::Empty => &[],
            CellContent::Single(feature) => std::slice::from_ref(feature),
            CellContent::Features(features) => features,
        }
    }

    /// Label this content assigns to `coordinate`: the single label, or the
    /// label of the first feature covering the coordinate.
    pub fn label_at<E: GeometryEngine>(&self, engine: &E, coordinate: Coord) -> Option<Label> {
        match self {
            CellContent::Empty => None,
            CellContent::Single(feature) => feature.label().cloned(),
            CellContent::Features(features) => features
                .iter()
                .find(|f| engine.covers(f.geometry(), coordinate))
                .and_then(|f| f.label().cloned()),
        }
    }
}

/// Read-only cell index built once from simplified features.
///
/// # Examples
///
/// ```rust
/// use labelgrid::{CellGrid, Envelope, FeatureFactory, IndexOptions, LabelQuery, SpatialIndex};
/// use geo::{Rect, coord};
///
/// let grid = CellGrid::new(Envelope::new(0.0, 0.0, 4.0, 4.0), vec![2])?;
/// let factory = FeatureFactory::new(&grid, "name");
/// let cell = grid.root().child(0, 0)?;
/// let square = cell.envelope_polygon();
/// let feature = factory.feature_at(cell, Some("A".into()), false, square);
///
/// let index = SpatialIndex::build(&grid, vec![feature], IndexOptions::default())?;
/// assert_eq!(index.label_for(coord! { x: 1.0, y: 1.0 }).as_deref(), Some("A"));
/// assert_eq!(index.label_for(coord! { x: 3.0, y: 3.0 }), None);
/// # Ok::<(), labelgrid::LabelGridError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SpatialIndex<'g, E: GeometryEngine = PlanarEngine> {
    grid: &'g CellGrid,
    cells: FxHashMap<CellAddress<'g>, CellContent<'g>>,
    engine: E,
}

impl<'g> SpatialIndex<'g, PlanarEngine> {
    /// Group `features` by cell address.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if a feature belongs to another grid.
    pub fn build(
        grid: &'g CellGrid,
        features: impl IntoIterator<Item = LabeledFeature<'g>>,
        options: IndexOptions,
    ) -> Result<Self> {
        Self::build_with_engine(grid, features, options, PlanarEngine)
    }

    /// Index a previously simplified dataset.
    ///
    /// # Errors
    ///
    /// `SchemaMissingAttribute` if the source lacks `label_attribute` or the
    /// grid's address attribute; `MalformedAddress` if a stored address does
    /// not parse.
    pub fn load(
        grid: &'g CellGrid,
        source: &dyn FeatureSource,
        label_attribute: &str,
        options: IndexOptions,
    ) -> Result<Self> {
        Self::load_with_engine(grid, source, label_attribute, options, PlanarEngine)
    }
}

impl<'g, E: GeometryEngine> SpatialIndex<'g, E> {
    pub fn load_with_engine(
        grid: &'g CellGrid,
        source: &dyn FeatureSource,
        label_attribute: &str,
        options: IndexOptions,
        engine: E,
    ) -> Result<Self> {
        let names = source.attribute_names()?;
        for required in [label_attribute.to_string(), grid.attribute_name()] {
            if !names.contains(&required) {
                return Err(LabelGridError::SchemaMissingAttribute(required));
            }
        }
        let features = FeatureFactory::new(grid, label_attribute).from_source(source)?;
        log::info!("Loaded {} features for indexing", features.len());
        Self::build_with_engine(grid, features, options, engine)
    }

    pub fn build_with_engine(
        grid: &'g CellGrid,
        features: impl IntoIterator<Item = LabeledFeature<'g>>,
        options: IndexOptions,
        engine: E,
    ) -> Result<Self> {
        let mut groups: FxHashMap<CellAddress<'g>, Vec<LabeledFeature<'g>>> =
            FxHashMap::default();
        let mut count = 0usize;
        for feature in features {
            if feature.address().grid() != grid {
                return Err(LabelGridError::InvalidInput(format!(
                    "Feature at {} belongs to a different grid",
                    feature.address()
                )));
            }
            count += 1;
            groups
                .entry(feature.address().clone())
                .or_default()
                .push(feature);
        }

        let cells: FxHashMap<CellAddress<'g>, CellContent<'g>> = groups
            .into_iter()
            .map(|(address, members)| (address, CellContent::from_group(members, options)))
            .collect();
        log::debug!("Indexed {} features in {} cells", count, cells.len());

        Ok(Self {
            grid,
            cells,
            engine,
        })
    }

    pub fn grid(&self) -> &'g CellGrid {
        self.grid
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Number of stored cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Content stored for exactly `address`, without walking up.
    pub fn cell(&self, address: &CellAddress<'g>) -> Option<&CellContent<'g>> {
        self.cells.get(address)
    }

    /// The stored cell that answers for `coordinate`, with its address.
    pub fn resolve(&self, coordinate: Coord) -> Option<(CellAddress<'g>, &CellContent<'g>)> {
        self.grid
            .locate(coordinate)
            .ancestors()
            .find_map(|address| self.cells.get_key_value(&address))
            .map(|(address, content)| (address.clone(), content))
    }
}

impl<E: GeometryEngine> LabelQuery for SpatialIndex<'_, E> {
    fn label_for(&self, coordinate: Coord) -> Option<Label> {
        self.resolve(coordinate)?
            .1
            .label_at(&self.engine, coordinate)
    }

    fn colocated_features(&self, coordinate: Coord) -> &[LabeledFeature<'_>] {
        match self.resolve(coordinate) {
            Some((_, content)) => content.features(),
            None => &[],
        }
    }
}
