//! Engine double that fails selected operations.

use super::engine::{GeometryEngine, PlanarEngine};
use crate::error::{LabelGridError, Result};
use geo::{Coord, MultiPolygon, Polygon, Rect, Triangle};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FailingEngine {
    pub intersection: bool,
    pub union: bool,
    pub difference: bool,
    pub triangulate: bool,
}

impl FailingEngine {
    pub fn failing_intersection() -> Self {
        Self {
            intersection: true,
            ..Default::default()
        }
    }

    pub fn failing_union() -> Self {
        Self {
            union: true,
            ..Default::default()
        }
    }

    pub fn failing_difference() -> Self {
        Self {
            difference: true,
            ..Default::default()
        }
    }

    pub fn failing_triangulation() -> Self {
        Self {
            triangulate: true,
            ..Default::default()
        }
    }
}

fn fail<T>(operation: &str) -> Result<T> {
    Err(LabelGridError::GeometryOperationFailed(format!(
        "{}: injected failure",
        operation
    )))
}

impl GeometryEngine for FailingEngine {
    fn intersection(&self, a: &MultiPolygon, b: &MultiPolygon) -> Result<MultiPolygon> {
        if self.intersection {
            return fail("intersection");
        }
        PlanarEngine.intersection(a, b)
    }

    fn union(&self, geometries: &[MultiPolygon]) -> Result<MultiPolygon> {
        if self.union {
            return fail("union");
        }
        PlanarEngine.union(geometries)
    }

    fn difference(&self, a: &MultiPolygon, b: &MultiPolygon) -> Result<MultiPolygon> {
        if self.difference {
            return fail("difference");
        }
        PlanarEngine.difference(a, b)
    }

    fn overlaps(&self, a: &MultiPolygon, b: &MultiPolygon) -> Result<bool> {
        if self.intersection {
            return fail("overlaps");
        }
        PlanarEngine.overlaps(a, b)
    }

    fn covers(&self, geometry: &MultiPolygon, coord: Coord) -> bool {
        PlanarEngine.covers(geometry, coord)
    }

    fn distance(&self, geometry: &MultiPolygon, coord: Coord) -> f64 {
        PlanarEngine.distance(geometry, coord)
    }

    fn centroid(&self, geometry: &MultiPolygon) -> Option<Coord> {
        PlanarEngine.centroid(geometry)
    }

    fn bounding_rect(&self, geometry: &MultiPolygon) -> Option<Rect> {
        PlanarEngine.bounding_rect(geometry)
    }

    fn area(&self, geometry: &MultiPolygon) -> f64 {
        PlanarEngine.area(geometry)
    }

    fn convex_hull(&self, points: &[Coord]) -> Result<Polygon> {
        PlanarEngine.convex_hull(points)
    }

    fn triangulate(&self, polygon: &Polygon) -> Result<Vec<Triangle>> {
        if self.triangulate {
            return fail("triangulation");
        }
        PlanarEngine.triangulate(polygon)
    }
}
