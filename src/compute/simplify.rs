//! Iterative level-by-level grid simplification.
//!
//! Each round pushes features one level down the grid: features are split
//! along the child cells of their current cell, grouped by cell, and every
//! group is reduced. A group whose non-weak members agree on a label becomes
//! a single rectangle covering the cell; a group of only weak members
//! disappears; anything else is deferred to the next, finer round. In the
//! last round the remaining mixed groups are unioned per label.
//!
//! Running the simplifier on its own output changes nothing: features that
//! already sit deeper than the current round join their ancestor's group
//! without being split again.

use crate::compute::engine::{GeometryEngine, PlanarEngine};
use crate::compute::validation::is_degenerate;
use crate::error::{LabelGridError, Result};
use crate::feature::{Label, LabeledFeature};
use crate::grid::{CellAddress, CellGrid};
use geo::MultiPolygon;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Counters collected during one simplification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    pub rounds: usize,
    pub input_features: usize,
    pub output_features: usize,
    /// Cells collapsed into one rectangle.
    pub rectangles: usize,
    /// Features passed on to a finer round.
    pub deferred: usize,
    /// Cells dropped because every member was weak.
    pub weak_cells_dropped: usize,
    pub degenerate_dropped: usize,
    /// Features kept whole because splitting failed.
    pub split_fallbacks: usize,
    /// Label groups emitted un-unioned because the union failed.
    pub union_fallbacks: usize,
    /// Features still deferred after the last round.
    pub leftover: usize,
}

/// Simplified features together with the run's counters.
#[derive(Debug, Clone)]
pub struct Simplified<'g> {
    pub features: Vec<LabeledFeature<'g>>,
    pub stats: SimplifyStats,
}

/// Reduces a feature set level by level over a [`CellGrid`].
///
/// # Examples
///
/// ```rust
/// use labelgrid::{CellGrid, Envelope, FeatureFactory, GridSimplifier};
/// use geo::{Rect, coord};
///
/// let grid = CellGrid::new(Envelope::new(0.0, 0.0, 4.0, 4.0), vec![2, 2])?;
/// let factory = FeatureFactory::new(&grid, "name");
/// let west = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 2.0, y: 4.0 }).to_polygon();
/// let east = Rect::new(coord! { x: 2.0, y: 0.0 }, coord! { x: 4.0, y: 4.0 }).to_polygon();
///
/// let simplified = GridSimplifier::new(&grid).simplify(vec![
///     factory.feature(Some("west".into()), false, west),
///     factory.feature(Some("east".into()), false, east),
/// ])?;
///
/// // each half collapses into two depth-1 rectangles
/// assert_eq!(simplified.features.len(), 4);
/// assert_eq!(simplified.stats.rectangles, 4);
/// # Ok::<(), labelgrid::LabelGridError>(())
/// ```
#[derive(Debug, Clone)]
pub struct GridSimplifier<'g, E: GeometryEngine = PlanarEngine> {
    grid: &'g CellGrid,
    engine: E,
    simplify_single_label_cells: bool,
}

impl<'g> GridSimplifier<'g, PlanarEngine> {
    pub fn new(grid: &'g CellGrid) -> Self {
        Self::with_engine(grid, PlanarEngine)
    }
}

enum Reduced<'g> {
    Finished(Vec<LabeledFeature<'g>>),
    Deferred(Vec<LabeledFeature<'g>>),
}

impl<'g, E: GeometryEngine> GridSimplifier<'g, E> {
    pub fn with_engine(grid: &'g CellGrid, engine: E) -> Self {
        Self {
            grid,
            engine,
            simplify_single_label_cells: true,
        }
    }

    /// Whether single-label cells collapse into rectangles (default `true`).
    /// When disabled every cell keeps its precise geometry.
    pub fn simplify_single_label_cells(mut self, enabled: bool) -> Self {
        self.simplify_single_label_cells = enabled;
        self
    }

    pub fn grid(&self) -> &'g CellGrid {
        self.grid
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run every round over `features`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if a feature belongs to another grid. Geometry failures
    /// never surface here; they are handled by local fallbacks and counted in
    /// [`SimplifyStats`].
    pub fn simplify(&self, features: Vec<LabeledFeature<'g>>) -> Result<Simplified<'g>> {
        if let Some(stranger) = features
            .iter()
            .find(|f| f.address().grid() != self.grid)
        {
            return Err(LabelGridError::InvalidInput(format!(
                "Feature at {} belongs to a different grid",
                stranger.address()
            )));
        }

        let mut stats = SimplifyStats {
            input_features: features.len(),
            ..Default::default()
        };
        let num_levels = self.grid.num_levels();
        let mut finished = Vec::new();
        let mut current = features;

        for round in 0..num_levels {
            let final_round = round + 1 == num_levels;
            let incoming = current.len();
            let groups = self.split_and_group(current, round, &mut stats);
            log::info!(
                "Simplify round {}/{}: {} features in {} cells",
                round + 1,
                num_levels,
                incoming,
                groups.len()
            );

            let mut deferred = Vec::new();
            for (address, members) in groups {
                match self.reduce(&address, members, final_round, &mut stats) {
                    Reduced::Finished(out) => finished.extend(out),
                    Reduced::Deferred(members) => deferred.extend(members),
                }
            }
            stats.rounds += 1;
            current = deferred;
        }

        stats.leftover = current.len();
        finished.extend(current);
        stats.output_features = finished.len();
        log::info!(
            "Simplified {} features into {} ({} rectangles, {} split fallbacks, {} union fallbacks)",
            stats.input_features,
            stats.output_features,
            stats.rectangles,
            stats.split_fallbacks,
            stats.union_fallbacks
        );

        Ok(Simplified {
            features: finished,
            stats,
        })
    }

    fn split_and_group(
        &self,
        features: Vec<LabeledFeature<'g>>,
        round: usize,
        stats: &mut SimplifyStats,
    ) -> BTreeMap<CellAddress<'g>, Vec<LabeledFeature<'g>>> {
        let mut groups: BTreeMap<CellAddress<'g>, Vec<LabeledFeature<'g>>> = BTreeMap::new();
        for feature in features {
            if feature.address().depth() > round {
                if let Some(key) = feature.address().ancestor(round + 1) {
                    groups.entry(key).or_default().push(feature);
                }
                continue;
            }
            if is_degenerate(feature.geometry()) {
                log::debug!("Dropping degenerate geometry at {}", feature.address());
                stats.degenerate_dropped += 1;
                continue;
            }
            for piece in self.split(feature, stats) {
                groups
                    .entry(piece.address().clone())
                    .or_default()
                    .push(piece);
            }
        }
        groups
    }

    /// Pieces of `feature` in the child cells of its address.
    fn split(
        &self,
        feature: LabeledFeature<'g>,
        stats: &mut SimplifyStats,
    ) -> Vec<LabeledFeature<'g>> {
        let address = feature.address().clone();
        let Some(size) = self.grid.branching_at(address.depth()) else {
            return vec![feature];
        };
        let Some(bounds) = self.engine.bounding_rect(feature.geometry()) else {
            return Vec::new();
        };
        let cell = address.envelope();
        let (x_lo, x_hi) =
            child_span(bounds.min().x, bounds.max().x, cell.min_x(), cell.width(), size);
        let (y_lo, y_hi) =
            child_span(bounds.min().y, bounds.max().y, cell.min_y(), cell.height(), size);

        let mut pieces = Vec::new();
        for x in x_lo..=x_hi {
            for y in y_lo..=y_hi {
                let piece = address.child(x, y).and_then(|child| {
                    self.engine
                        .intersection(&child.envelope_geometry(), feature.geometry())
                        .map(|geometry| (child, geometry))
                });
                match piece {
                    Ok((child, geometry)) => {
                        if !geometry.0.is_empty() {
                            pieces.push(feature.relocate(child, geometry));
                        }
                    }
                    Err(e) => {
                        log::warn!("Cannot split feature at {}, keeping it whole: {}", address, e);
                        stats.split_fallbacks += 1;
                        return vec![feature];
                    }
                }
            }
        }
        pieces
    }

    fn reduce(
        &self,
        address: &CellAddress<'g>,
        members: Vec<LabeledFeature<'g>>,
        final_round: bool,
        stats: &mut SimplifyStats,
    ) -> Reduced<'g> {
        let Some(first) = members.first() else {
            return Reduced::Finished(Vec::new());
        };
        let template = first.clone();
        let mut authoritative = members.iter().filter(|m| !m.is_weak());
        let Some(leader) = authoritative.next() else {
            stats.weak_cells_dropped += 1;
            return Reduced::Finished(Vec::new());
        };

        if self.simplify_single_label_cells {
            let label = leader.label().cloned();
            if authoritative.all(|m| m.label() == label.as_ref()) {
                stats.rectangles += 1;
                let rectangle = template
                    .sibling(label, false, address.envelope_geometry())
                    .with_address(address.clone());
                return Reduced::Finished(vec![rectangle]);
            }
        }

        if !final_round {
            stats.deferred += members.len();
            return Reduced::Deferred(members);
        }

        let outcome = union_by_label(
            &self.engine,
            members
                .into_iter()
                .map(|m| LabeledPiece {
                    label: m.label().cloned(),
                    weak: m.is_weak(),
                    geometry: m.into_geometry(),
                }),
        );
        stats.union_fallbacks += outcome.fallbacks;
        Reduced::Finished(
            outcome
                .pieces
                .into_iter()
                .map(|piece| {
                    template
                        .sibling(piece.label, piece.weak, piece.geometry)
                        .with_address(address.clone())
                })
                .collect(),
        )
    }
}

/// Range of child indices along one axis touched by `[lo, hi]` in a cell
/// starting at `origin` with the given extent, clamped to `0..size`.
fn child_span(lo: f64, hi: f64, origin: f64, extent: f64, size: u32) -> (u32, u32) {
    let step = extent / f64::from(size);
    let index = |v: f64| {
        let raw = ((v - origin) / step).floor();
        if raw.is_nan() || raw < 0.0 {
            0
        } else if raw >= f64::from(size - 1) {
            size - 1
        } else {
            raw as u32
        }
    };
    (index(lo), index(hi))
}

/// A label with a geometry, as fed into and produced by [`union_by_label`].
#[derive(Debug, Clone)]
pub(crate) struct LabeledPiece {
    pub label: Option<Label>,
    pub weak: bool,
    pub geometry: MultiPolygon,
}

pub(crate) struct UnionOutcome {
    pub pieces: Vec<LabeledPiece>,
    pub fallbacks: usize,
}

/// Union geometries per label, labels in first-seen order.
///
/// Degenerate geometries are dropped and null-labeled pieces skipped. A
/// label's result is weak only when all of its pieces were weak. If the
/// union of a label group fails its pieces are emitted separately.
pub(crate) fn union_by_label<E: GeometryEngine>(
    engine: &E,
    pieces: impl IntoIterator<Item = LabeledPiece>,
) -> UnionOutcome {
    let mut order: Vec<(Label, bool, Vec<MultiPolygon>)> = Vec::new();
    let mut slots: FxHashMap<Label, usize> = FxHashMap::default();
    let mut unlabeled = 0usize;

    for piece in pieces {
        if is_degenerate(&piece.geometry) {
            continue;
        }
        let Some(label) = piece.label else {
            unlabeled += 1;
            continue;
        };
        let slot = *slots.entry(label.clone()).or_insert_with(|| {
            order.push((label, true, Vec::new()));
            order.len() - 1
        });
        let entry = &mut order[slot];
        entry.1 &= piece.weak;
        entry.2.push(piece.geometry);
    }
    if unlabeled > 0 {
        log::warn!("Skipped {} geometries without a label during union", unlabeled);
    }

    let mut outcome = UnionOutcome {
        pieces: Vec::with_capacity(order.len()),
        fallbacks: 0,
    };
    for (label, weak, geometries) in order {
        if geometries.len() == 1 {
            outcome.pieces.extend(geometries.into_iter().map(|geometry| LabeledPiece {
                label: Some(label.clone()),
                weak,
                geometry,
            }));
            continue;
        }
        match engine.union(&geometries) {
            Ok(geometry) => outcome.pieces.push(LabeledPiece {
                label: Some(label),
                weak,
                geometry,
            }),
            Err(e) => {
                log::warn!(
                    "Union of {} geometries labeled {} failed, emitting them separately: {}",
                    geometries.len(),
                    label,
                    e
                );
                outcome.fallbacks += 1;
                outcome.pieces.extend(geometries.into_iter().map(|geometry| LabeledPiece {
                    label: Some(label.clone()),
                    weak,
                    geometry,
                }));
            }
        }
    }
    outcome
}
