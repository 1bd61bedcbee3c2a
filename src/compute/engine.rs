//! Planar geometry primitives behind a swappable engine.
//!
//! The simplifier, gap filler, index and filters only ever touch geometry
//! through [`GeometryEngine`]. [`PlanarEngine`] implements it with `geo`.
//! Operations that can fail report `GeometryOperationFailed`; callers decide
//! on a fallback.

use crate::compute::validation::validate_finite;
use crate::error::{LabelGridError, Result};
use geo::{
    Area, BooleanOps, BoundingRect, Centroid, ConvexHull, Coord, CoordsIter, Distance, Euclidean,
    Intersects, MultiPoint, MultiPolygon, Point, Polygon, Rect, Triangle, TriangulateDelaunay,
};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Relative area below which an intersection counts as touching only.
const OVERLAP_TOLERANCE: f64 = 1e-9;

/// Planar geometry operations used by the crate.
pub trait GeometryEngine {
    /// Shared area of `a` and `b`.
    fn intersection(&self, a: &MultiPolygon, b: &MultiPolygon) -> Result<MultiPolygon>;

    /// Union of all inputs. An empty slice yields an empty geometry.
    fn union(&self, geometries: &[MultiPolygon]) -> Result<MultiPolygon>;

    /// Part of `a` outside `b`.
    fn difference(&self, a: &MultiPolygon, b: &MultiPolygon) -> Result<MultiPolygon>;

    /// Whether the interiors of `a` and `b` share positive area.
    fn overlaps(&self, a: &MultiPolygon, b: &MultiPolygon) -> Result<bool>;

    /// Whether `coord` lies in the interior or on the boundary.
    fn covers(&self, geometry: &MultiPolygon, coord: Coord) -> bool;

    /// Euclidean distance from `coord` to the geometry, zero when covered.
    fn distance(&self, geometry: &MultiPolygon, coord: Coord) -> f64;

    fn centroid(&self, geometry: &MultiPolygon) -> Option<Coord>;

    fn bounding_rect(&self, geometry: &MultiPolygon) -> Option<Rect>;

    fn area(&self, geometry: &MultiPolygon) -> f64;

    /// Convex hull of at least three distinct points.
    fn convex_hull(&self, points: &[Coord]) -> Result<Polygon>;

    /// Delaunay triangulation of the polygon's vertices.
    fn triangulate(&self, polygon: &Polygon) -> Result<Vec<Triangle>>;
}

/// [`GeometryEngine`] on plain `f64` coordinates, backed by `geo`.
///
/// Boolean operations reject non-finite coordinates up front and turn a
/// panic inside the overlay into `GeometryOperationFailed`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarEngine;

impl PlanarEngine {
    pub fn new() -> Self {
        Self
    }
}

fn guarded<T>(operation: &str, op: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(op)).map_err(|panic| {
        let detail = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        LabelGridError::GeometryOperationFailed(format!("{}: {}", operation, detail))
    })
}

impl GeometryEngine for PlanarEngine {
    fn intersection(&self, a: &MultiPolygon, b: &MultiPolygon) -> Result<MultiPolygon> {
        validate_finite("intersection", a)?;
        validate_finite("intersection", b)?;
        guarded("intersection", || a.intersection(b))
    }

    fn union(&self, geometries: &[MultiPolygon]) -> Result<MultiPolygon> {
        for geometry in geometries {
            validate_finite("union", geometry)?;
        }
        guarded("union", || {
            // pairwise rounds keep operands balanced in size
            let mut layer: Vec<MultiPolygon> = geometries.to_vec();
            while layer.len() > 1 {
                let mut next = Vec::with_capacity(layer.len().div_ceil(2));
                let mut iter = layer.into_iter();
                while let Some(a) = iter.next() {
                    match iter.next() {
                        Some(b) => next.push(a.union(&b)),
                        None => next.push(a),
                    }
                }
                layer = next;
            }
            layer.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
        })
    }

    fn difference(&self, a: &MultiPolygon, b: &MultiPolygon) -> Result<MultiPolygon> {
        validate_finite("difference", a)?;
        validate_finite("difference", b)?;
        guarded("difference", || a.difference(b))
    }

    fn overlaps(&self, a: &MultiPolygon, b: &MultiPolygon) -> Result<bool> {
        let shared = self.intersection(a, b)?.unsigned_area();
        let smaller = a.unsigned_area().min(b.unsigned_area());
        Ok(shared > OVERLAP_TOLERANCE * smaller)
    }

    fn covers(&self, geometry: &MultiPolygon, coord: Coord) -> bool {
        geometry.intersects(&Point::from(coord))
    }

    fn distance(&self, geometry: &MultiPolygon, coord: Coord) -> f64 {
        let point = Point::from(coord);
        if geometry.intersects(&point) {
            return 0.0;
        }
        geometry
            .0
            .iter()
            .map(|polygon| Euclidean.distance(&point, polygon))
            .fold(f64::INFINITY, f64::min)
    }

    fn centroid(&self, geometry: &MultiPolygon) -> Option<Coord> {
        geometry.centroid().map(|p| p.0)
    }

    fn bounding_rect(&self, geometry: &MultiPolygon) -> Option<Rect> {
        geometry.bounding_rect()
    }

    fn area(&self, geometry: &MultiPolygon) -> f64 {
        geometry.unsigned_area()
    }

    fn convex_hull(&self, points: &[Coord]) -> Result<Polygon> {
        let mut distinct: Vec<Coord> = Vec::with_capacity(points.len());
        for p in points {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(LabelGridError::GeometryOperationFailed(format!(
                    "convex hull: non-finite point ({}, {})",
                    p.x, p.y
                )));
            }
            if !distinct.contains(p) {
                distinct.push(*p);
            }
        }
        if distinct.len() < 3 {
            return Err(LabelGridError::GeometryOperationFailed(format!(
                "convex hull needs 3 distinct points, got {}",
                distinct.len()
            )));
        }
        let points: MultiPoint = distinct.into_iter().map(Point::from).collect();
        guarded("convex hull", || points.convex_hull())
    }

    fn triangulate(&self, polygon: &Polygon) -> Result<Vec<Triangle>> {
        if polygon.exterior().coords_count() < 4 {
            return Err(LabelGridError::GeometryOperationFailed(
                "triangulation needs at least 3 vertices".to_string(),
            ));
        }
        validate_finite("triangulation", &MultiPolygon::new(vec![polygon.clone()]))?;
        guarded("triangulation", || polygon.unconstrained_triangulation())?.map_err(|e| {
            LabelGridError::GeometryOperationFailed(format!("triangulation: {:?}", e))
        })
    }
}
