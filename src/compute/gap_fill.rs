//! Weak labels for uncovered regions.
//!
//! Regions of the grid envelope that no labeled feature covers (typically
//! water) are triangulated, and every triangle inherits labels from the
//! features that touch its corners. The result is a set of weak features the
//! simplifier can reduce together with the authoritative ones.
//!
//! This is an approximation. Where a triangle's corners disagree the
//! triangle is cut at edge midpoints, and every label keeps the convex hull
//! of its corners and midpoints. Ambiguous choices take the first label in
//! feature order.

use crate::compute::engine::{GeometryEngine, PlanarEngine};
use crate::compute::simplify::{LabeledPiece, union_by_label};
use crate::compute::validation::is_degenerate;
use crate::error::Result;
use crate::feature::{FeatureFactory, Label, LabeledFeature};
use crate::grid::CellGrid;
use geo::{Coord, CoordsIter, MultiPolygon, Triangle, coord};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Vertex match tolerance relative to the grid extent.
const VERTEX_TOLERANCE: f64 = 1e-9;

type Owners = SmallVec<[usize; 4]>;
type Labels = SmallVec<[Label; 4]>;

/// Counters collected during one gap-filling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapFillStats {
    pub gap_polygons: usize,
    pub degenerate_dropped: usize,
    pub triangulation_failures: usize,
    pub triangles: usize,
    /// Triangles whose corners all share a label.
    pub uniform_triangles: usize,
    /// Triangles discarded because they overlap labeled land.
    pub overlapping_skipped: usize,
    /// Triangles cut into per-label slices.
    pub decomposed_triangles: usize,
    pub union_fallbacks: usize,
    pub output_features: usize,
}

#[derive(Debug, Clone)]
pub struct GapFilled<'g> {
    pub features: Vec<LabeledFeature<'g>>,
    pub stats: GapFillStats,
}

/// Infers weak labels for the parts of the grid envelope no labeled
/// feature covers.
#[derive(Debug, Clone)]
pub struct GapFiller<'g, E: GeometryEngine = PlanarEngine> {
    grid: &'g CellGrid,
    engine: E,
}

impl<'g> GapFiller<'g, PlanarEngine> {
    pub fn new(grid: &'g CellGrid) -> Self {
        Self::with_engine(grid, PlanarEngine)
    }
}

impl<'g, E: GeometryEngine> GapFiller<'g, E> {
    pub fn with_engine(grid: &'g CellGrid, engine: E) -> Self {
        Self { grid, engine }
    }

    /// Weak root-level features covering the gaps between the labeled,
    /// non-weak members of `features`.
    ///
    /// # Errors
    ///
    /// `GeometryOperationFailed` if the land union or the envelope difference
    /// fails. Failures on single gap polygons or triangles only skip them.
    pub fn fill(
        &self,
        factory: &FeatureFactory<'g>,
        features: &[LabeledFeature<'g>],
    ) -> Result<GapFilled<'g>> {
        let mut stats = GapFillStats::default();
        let land: Vec<&LabeledFeature<'g>> = features
            .iter()
            .filter(|f| f.label().is_some() && !f.is_weak())
            .collect();

        let geometries: Vec<MultiPolygon> = land.iter().map(|f| f.geometry().clone()).collect();
        let covered = self.engine.union(&geometries)?;
        let gap = self
            .engine
            .difference(&self.grid.root().envelope_geometry(), &covered)?;
        log::info!(
            "Gap filling: {} labeled features, {} gap polygons",
            land.len(),
            gap.0.len()
        );

        let vertices = VertexIndex::build(&land, self.grid.envelope().extent() * VERTEX_TOLERANCE);
        let mut pieces = Vec::new();
        for polygon in gap.0 {
            stats.gap_polygons += 1;
            if is_degenerate(&MultiPolygon::new(vec![polygon.clone()])) {
                stats.degenerate_dropped += 1;
                continue;
            }
            let triangles = match self.engine.triangulate(&polygon) {
                Ok(triangles) => triangles,
                Err(e) => {
                    log::warn!("Skipping gap polygon that cannot be triangulated: {}", e);
                    stats.triangulation_failures += 1;
                    continue;
                }
            };
            for triangle in &triangles {
                stats.triangles += 1;
                self.label_triangle(triangle, &land, &vertices, &mut stats, &mut pieces);
            }
        }

        let outcome = union_by_label(&self.engine, pieces);
        stats.union_fallbacks = outcome.fallbacks;
        let features: Vec<LabeledFeature<'g>> = outcome
            .pieces
            .into_iter()
            .map(|piece| factory.feature(piece.label, true, piece.geometry))
            .collect();
        stats.output_features = features.len();
        log::info!(
            "Gap filling produced {} weak features from {} triangles ({} uniform, {} cut, {} over land)",
            stats.output_features,
            stats.triangles,
            stats.uniform_triangles,
            stats.decomposed_triangles,
            stats.overlapping_skipped
        );
        Ok(GapFilled { features, stats })
    }

    fn label_triangle(
        &self,
        triangle: &Triangle,
        land: &[&LabeledFeature<'g>],
        vertices: &VertexIndex,
        stats: &mut GapFillStats,
        pieces: &mut Vec<LabeledPiece>,
    ) {
        let corners = triangle.to_array();
        let owners: [Owners; 3] = std::array::from_fn(|i| vertices.features_at(corners[i]));
        let labels: [Labels; 3] = std::array::from_fn(|i| labels_of(&owners[i], land));
        let shape = MultiPolygon::new(vec![triangle.to_polygon()]);

        if let Some(common) = labels[0]
            .iter()
            .find(|l| labels[1].contains(l) && labels[2].contains(l))
        {
            stats.uniform_triangles += 1;
            pieces.push(LabeledPiece {
                label: Some(common.clone()),
                weak: true,
                geometry: shape,
            });
            return;
        }

        let mut checked: SmallVec<[usize; 8]> = SmallVec::new();
        for &id in owners.iter().flatten() {
            if checked.contains(&id) {
                continue;
            }
            checked.push(id);
            match self.engine.overlaps(land[id].geometry(), &shape) {
                Ok(false) => {}
                Ok(true) => {
                    stats.overlapping_skipped += 1;
                    return;
                }
                Err(e) => {
                    log::warn!("Skipping triangle with undecidable overlap: {}", e);
                    stats.overlapping_skipped += 1;
                    return;
                }
            }
        }

        let mut slices = Slices::new();
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            if let Some(shared) = labels[i].iter().find(|l| labels[j].contains(l)) {
                add_point(&mut slices, shared, corners[i]);
                add_point(&mut slices, shared, corners[j]);
            } else if let (Some(left), Some(right)) = (labels[i].first(), labels[j].first()) {
                let middle = coord! {
                    x: (corners[i].x + corners[j].x) / 2.0,
                    y: (corners[i].y + corners[j].y) / 2.0,
                };
                add_point(&mut slices, left, corners[i]);
                add_point(&mut slices, left, middle);
                add_point(&mut slices, right, corners[j]);
                add_point(&mut slices, right, middle);
            }
        }
        if slices.is_empty() {
            return;
        }

        stats.decomposed_triangles += 1;
        for (label, points) in slices {
            if points.len() < 3 {
                continue;
            }
            match self.engine.convex_hull(&points) {
                Ok(hull) => pieces.push(LabeledPiece {
                    label: Some(label),
                    weak: true,
                    geometry: hull.into(),
                }),
                Err(e) => log::debug!("No slice for {}: {}", label, e),
            }
        }
    }
}

type Slices = SmallVec<[(Label, SmallVec<[Coord; 6]>); 3]>;

fn add_point(slices: &mut Slices, label: &Label, point: Coord) {
    match slices.iter_mut().find(|(l, _)| l == label) {
        Some((_, points)) => {
            if !points.contains(&point) {
                points.push(point);
            }
        }
        None => slices.push((label.clone(), smallvec::smallvec![point])),
    }
}

fn labels_of(owners: &[usize], land: &[&LabeledFeature<'_>]) -> Labels {
    let mut labels = Labels::new();
    for &id in owners {
        if let Some(label) = land[id].label()
            && !labels.contains(label)
        {
            labels.push(label.clone());
        }
    }
    labels
}

/// Vertex → feature lookup over every vertex of the labeled features.
///
/// Exact coordinate matches come first; otherwise the R-tree returns the
/// owners of vertices within `tolerance`, since the overlay may move a
/// shared vertex by a few ulps.
struct VertexIndex {
    exact: FxHashMap<(u64, u64), Owners>,
    tree: RTree<GeomWithData<[f64; 2], usize>>,
    tolerance: f64,
}

impl VertexIndex {
    fn build(land: &[&LabeledFeature<'_>], tolerance: f64) -> Self {
        let mut exact: FxHashMap<(u64, u64), Owners> = FxHashMap::default();
        let mut entries = Vec::new();
        for (id, feature) in land.iter().enumerate() {
            for c in feature.geometry().coords_iter() {
                let owners = exact.entry(vertex_key(c)).or_default();
                if !owners.contains(&id) {
                    owners.push(id);
                    entries.push(GeomWithData::new([c.x, c.y], id));
                }
            }
        }
        log::debug!("Vertex index over {} distinct vertices", exact.len());
        Self {
            exact,
            tree: RTree::bulk_load(entries),
            tolerance,
        }
    }

    /// Indices of features with a vertex at `c`, in feature order.
    fn features_at(&self, c: Coord) -> Owners {
        if let Some(owners) = self.exact.get(&vertex_key(c)) {
            return owners.clone();
        }
        let mut found: Owners = self
            .tree
            .locate_within_distance([c.x, c.y], self.tolerance * self.tolerance)
            .map(|entry| entry.data)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }
}

fn vertex_key(c: Coord) -> (u64, u64) {
    // -0.0 and 0.0 are the same vertex
    let bits = |v: f64| if v == 0.0 { 0u64 } else { v.to_bits() };
    (bits(c.x), bits(c.y))
}
