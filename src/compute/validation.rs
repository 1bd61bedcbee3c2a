//! Validation for input geometries and coordinates.

use crate::error::{LabelGridError, Result};
use geo::{Area, Coord, CoordsIter, MultiPolygon};

/// A geometry with at most this many points cannot enclose any area.
pub const IMPOSSIBLY_LOW_POINTS: usize = 2;

/// Geometries with at most this many points are checked against
/// [`DEGENERATE_AREA`].
pub const SUSPICIOUSLY_LOW_POINTS: usize = 10;

/// Area below which a low-point geometry is treated as a sliver.
pub const DEGENERATE_AREA: f64 = 1e-7;

/// Whether a geometry is too small to be worth keeping: at most two points,
/// or at most ten points enclosing less than `1e-7` square units.
///
/// # Examples
///
/// ```
/// use labelgrid::compute::validation::is_degenerate;
/// use geo::{MultiPolygon, Rect, coord};
///
/// let square: MultiPolygon = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 })
///     .to_polygon()
///     .into();
/// assert!(!is_degenerate(&square));
///
/// let sliver: MultiPolygon = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1e-4, y: 1e-4 })
///     .to_polygon()
///     .into();
/// assert!(is_degenerate(&sliver));
/// assert!(is_degenerate(&MultiPolygon::new(vec![])));
/// ```
pub fn is_degenerate(geometry: &MultiPolygon) -> bool {
    let points = geometry.coords_count();
    points <= IMPOSSIBLY_LOW_POINTS
        || (points <= SUSPICIOUSLY_LOW_POINTS && geometry.unsigned_area() < DEGENERATE_AREA)
}

/// Validates that every coordinate of `geometry` is finite.
pub fn validate_finite(operation: &str, geometry: &MultiPolygon) -> Result<()> {
    match geometry
        .coords_iter()
        .find(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        Some(c) => Err(LabelGridError::GeometryOperationFailed(format!(
            "{}: non-finite coordinate ({}, {})",
            operation, c.x, c.y
        ))),
        None => Ok(()),
    }
}

/// Validates a query or vertex coordinate.
pub fn validate_coordinate(coord: Coord) -> Result<()> {
    if !coord.x.is_finite() || !coord.y.is_finite() {
        return Err(LabelGridError::InvalidInput(format!(
            "Coordinate must be finite, got ({}, {})",
            coord.x, coord.y
        )));
    }
    Ok(())
}
