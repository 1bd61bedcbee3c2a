//! Post-processing of looked-up labels.
//!
//! A [`FilterChain`] wraps any [`LabelQuery`] with a list of [`LabelFilter`]s.
//! Each filter sees the coordinate and a `next` lookup (the rest of the
//! chain). It may call `next`, replace its answer, or answer on its own
//! without calling it. The filter added last is the outermost one and runs
//! first.
//!
//! ```rust
//! use labelgrid::{CellGrid, Envelope, IndexOptions, LabelFilter, LabelQuery, SpatialIndex};
//! use geo::coord;
//!
//! let grid = CellGrid::new(Envelope::new(-180.0, -90.0, 180.0, 90.0), vec![4])?;
//! let index = SpatialIndex::build(&grid, Vec::new(), IndexOptions::default())?;
//! let chain = index
//!     .with(LabelFilter::timezone_band())
//!     .with(LabelFilter::BoundingBox(Envelope::new(-180.0, -90.0, 180.0, 90.0)));
//!
//! assert_eq!(chain.label_for(coord! { x: 31.0, y: 0.0 }).as_deref(), Some("Etc/GMT-2"));
//! assert_eq!(chain.label_for(coord! { x: 200.0, y: 0.0 }), None);
//! # Ok::<(), labelgrid::LabelGridError>(())
//! ```

use crate::compute::engine::{GeometryEngine, PlanarEngine};
use crate::feature::{Label, LabeledFeature};
use crate::index::LabelQuery;
use geo::Coord;
use labelgrid_types::envelope::Envelope;
use rustc_hash::FxHashSet;

/// How [`LabelFilter::NearestFeature`] ranks co-located features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NearestBy {
    /// Distance from the coordinate to the feature geometry.
    GeometryDistance,
    /// Distance from the coordinate to the feature centroid.
    CentroidDistance,
    /// Smallest bounding box that covers the coordinate.
    SmallestBoundingBox,
}

/// One post-processing step.
#[derive(Debug, Clone)]
pub enum LabelFilter {
    /// Labels outside `valid` (and null labels) become `default`.
    ValidLabels {
        valid: FxHashSet<Label>,
        default: Option<Label>,
    },
    /// Null labels become this label.
    DefaultLabel(Label),
    /// Null labels become a value computed from the coordinate.
    Derived(fn(Coord) -> Label),
    /// Coordinates outside the envelope get no label; the rest of the chain
    /// is not consulted for them.
    BoundingBox(Envelope),
    /// Null labels are replaced by the label of the best co-located feature.
    NearestFeature(NearestBy),
}

impl LabelFilter {
    pub fn valid_labels<I, L>(valid: I, default: Option<Label>) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        LabelFilter::ValidLabels {
            valid: valid.into_iter().map(Into::into).collect(),
            default,
        }
    }

    /// Fill null labels with the `Etc/GMT±N` zone of the nearest 15° meridian.
    pub fn timezone_band() -> Self {
        LabelFilter::Derived(timezone_band)
    }

    /// Label for `coordinate`, where `next` answers for the rest of the chain
    /// and `colocated` provides the features of the coordinate's cell.
    pub fn apply<N, Q, E>(
        &self,
        coordinate: Coord,
        next: N,
        colocated: &Q,
        engine: &E,
    ) -> Option<Label>
    where
        N: FnOnce(Coord) -> Option<Label>,
        Q: LabelQuery + ?Sized,
        E: GeometryEngine,
    {
        match self {
            LabelFilter::ValidLabels { valid, default } => match next(coordinate) {
                Some(label) if valid.contains(&label) => Some(label),
                _ => default.clone(),
            },
            LabelFilter::DefaultLabel(default) => {
                next(coordinate).or_else(|| Some(default.clone()))
            }
            LabelFilter::Derived(derive) => next(coordinate).or_else(|| Some(derive(coordinate))),
            LabelFilter::BoundingBox(envelope) => {
                if envelope.covers(coordinate) {
                    next(coordinate)
                } else {
                    None
                }
            }
            LabelFilter::NearestFeature(by) => next(coordinate).or_else(|| {
                nearest_label(*by, coordinate, colocated.colocated_features(coordinate), engine)
            }),
        }
    }
}

/// `Etc/GMT±N` zone of the meridian nearest to `coordinate`.
///
/// The `Etc` zones are named with inverted signs: east of Greenwich is
/// `Etc/GMT-N`.
pub fn timezone_band(coordinate: Coord) -> Label {
    let closest = -((coordinate.x / 15.0 + 0.5).floor() as i64);
    if closest > 0 {
        format!("Etc/GMT+{}", closest).into()
    } else {
        format!("Etc/GMT{}", closest).into()
    }
}

fn nearest_label<E: GeometryEngine>(
    by: NearestBy,
    coordinate: Coord,
    features: &[LabeledFeature<'_>],
    engine: &E,
) -> Option<Label> {
    let mut best = f64::MAX;
    let mut best_label = None;
    for feature in features {
        let score = match by {
            NearestBy::GeometryDistance => Some(engine.distance(feature.geometry(), coordinate)),
            NearestBy::CentroidDistance => engine
                .centroid(feature.geometry())
                .map(|c| (c.x - coordinate.x).hypot(c.y - coordinate.y)),
            NearestBy::SmallestBoundingBox => engine
                .bounding_rect(feature.geometry())
                .map(Envelope::from_rect)
                .filter(|env| env.covers(coordinate))
                .map(|env| env.area()),
        };
        if let Some(score) = score
            && score < best
        {
            best = score;
            best_label = feature.label().cloned();
        }
    }
    best_label
}

/// A [`LabelQuery`] wrapped in filters.
#[derive(Debug, Clone)]
pub struct FilterChain<Q, E: GeometryEngine = PlanarEngine> {
    inner: Q,
    // outermost first
    filters: Vec<LabelFilter>,
    engine: E,
}

impl<Q: LabelQuery> FilterChain<Q, PlanarEngine> {
    pub fn new(inner: Q) -> Self {
        Self::with_engine(inner, PlanarEngine)
    }
}

impl<Q: LabelQuery, E: GeometryEngine> FilterChain<Q, E> {
    pub fn with_engine(inner: Q, engine: E) -> Self {
        Self {
            inner,
            filters: Vec::new(),
            engine,
        }
    }

    /// Wrap the chain in `filter`, which becomes the outermost filter.
    pub fn with(mut self, filter: LabelFilter) -> Self {
        self.filters.insert(0, filter);
        self
    }

    /// Filters in application order, outermost first.
    pub fn filters(&self) -> &[LabelFilter] {
        &self.filters
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }

    pub fn into_inner(self) -> Q {
        self.inner
    }

    fn label_from(&self, layer: usize, coordinate: Coord) -> Option<Label> {
        match self.filters.get(layer) {
            Some(filter) => filter.apply(
                coordinate,
                |c| self.label_from(layer + 1, c),
                &self.inner,
                &self.engine,
            ),
            None => self.inner.label_for(coordinate),
        }
    }
}

impl<Q: LabelQuery, E: GeometryEngine> LabelQuery for FilterChain<Q, E> {
    fn label_for(&self, coordinate: Coord) -> Option<Label> {
        self.label_from(0, coordinate)
    }

    fn colocated_features(&self, coordinate: Coord) -> &[LabeledFeature<'_>] {
        self.inner.colocated_features(coordinate)
    }
}
