//! Hierarchical cell addressing.
//!
//! A [`CellGrid`] fixes an envelope and a branching factor per level. A
//! [`CellAddress`] is a path of `(x, y)` child indices from the grid root and
//! borrows the grid it was derived from, so the grid must outlive every
//! address, feature and index built on top of it.
//!
//! ```rust
//! use labelgrid::{CellGrid, Envelope};
//!
//! let grid = CellGrid::new(Envelope::new(0.0, 0.0, 10.0, 20.0), vec![2, 2])?;
//! let cell = grid.root().child(1, 0)?.child(1, 1)?;
//!
//! assert_eq!(cell.to_attribute_value(), "1,0;1,1;");
//! assert_eq!(cell.envelope().max_x(), 10.0);
//! # Ok::<(), labelgrid::LabelGridError>(())
//! ```

use crate::error::{LabelGridError, Result};
use geo::{Coord, MultiPolygon, Polygon};
use labelgrid_types::envelope::Envelope;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Prefix of the attribute name that carries serialized cell addresses.
pub const ADDRESS_ATTRIBUTE_PREFIX: &str = "GI";

/// Largest per-axis cell count at the deepest level. Keeps every cell
/// boundary an exactly representable fraction of the envelope.
const MAX_RESOLUTION: u64 = 1 << 53;

/// Shared configuration for a family of cell addresses: the bounding
/// envelope and the 2D branching factor at each level.
///
/// A branching factor `b` at level `i` splits every cell at depth `i` into
/// `b × b` children.
#[derive(Debug, Clone)]
pub struct CellGrid {
    envelope: Envelope,
    branching: Vec<u32>,
    fingerprint: u64,
}

impl CellGrid {
    /// Create a grid over `envelope` with one branching factor per level.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if there are no levels, a factor is zero, the envelope
    /// has a non-finite or zero-sized side, or the deepest level would have
    /// more than 2^53 cells per axis.
    pub fn new(envelope: Envelope, branching: impl Into<Vec<u32>>) -> Result<Self> {
        let branching = branching.into();
        if branching.is_empty() {
            return Err(LabelGridError::InvalidInput(
                "Grid needs at least one level".to_string(),
            ));
        }
        if let Some(level) = branching.iter().position(|&b| b == 0) {
            return Err(LabelGridError::InvalidInput(format!(
                "Branching factor at level {} must be positive",
                level
            )));
        }
        let bounds = [
            envelope.min_x(),
            envelope.min_y(),
            envelope.max_x(),
            envelope.max_y(),
        ];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(LabelGridError::InvalidInput(format!(
                "Grid envelope must be finite, got {:?}",
                bounds
            )));
        }
        if envelope.width() <= 0.0 || envelope.height() <= 0.0 {
            return Err(LabelGridError::InvalidInput(format!(
                "Grid envelope must have positive width and height, got {} x {}",
                envelope.width(),
                envelope.height()
            )));
        }
        let mut resolution: u64 = 1;
        for &b in &branching {
            resolution = resolution
                .checked_mul(u64::from(b))
                .filter(|r| *r <= MAX_RESOLUTION)
                .ok_or_else(|| {
                    LabelGridError::InvalidInput(format!(
                        "Branching factors {:?} produce too many cells per axis",
                        branching
                    ))
                })?;
        }

        let mut hasher = FxHasher::default();
        for v in bounds {
            v.to_bits().hash(&mut hasher);
        }
        envelope.crs.hash(&mut hasher);
        branching.hash(&mut hasher);
        let fingerprint = hasher.finish();

        log::debug!(
            "CellGrid over {:?} with branching {:?} ({} cells per axis)",
            bounds,
            branching,
            resolution
        );

        Ok(Self {
            envelope,
            branching,
            fingerprint,
        })
    }

    /// Rebuild a grid from an address attribute name such as `GI40_2_2_2`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the name lacks the prefix or a factor does not parse,
    /// plus any error from [`CellGrid::new`].
    pub fn from_attribute_name(envelope: Envelope, attribute_name: &str) -> Result<Self> {
        let Some(sizes) = attribute_name.strip_prefix(ADDRESS_ATTRIBUTE_PREFIX) else {
            return Err(LabelGridError::InvalidInput(format!(
                "{} does not start with expected prefix {}",
                attribute_name, ADDRESS_ATTRIBUTE_PREFIX
            )));
        };
        let branching = sizes
            .split('_')
            .map(|s| {
                s.parse::<u32>().map_err(|e| {
                    LabelGridError::InvalidInput(format!(
                        "{} has a bad branching factor {:?}: {}",
                        attribute_name, s, e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(envelope, branching)
    }

    /// Attribute name under which addresses of this grid are stored,
    /// e.g. `GI40_2_2_2`. A reader can rebuild the grid from it.
    pub fn attribute_name(&self) -> String {
        let sizes: Vec<String> = self.branching.iter().map(u32::to_string).collect();
        format!("{}{}", ADDRESS_ATTRIBUTE_PREFIX, sizes.join("_"))
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn branching(&self) -> &[u32] {
        &self.branching
    }

    /// Maximum depth of the hierarchy.
    pub fn num_levels(&self) -> usize {
        self.branching.len()
    }

    /// Branching factor of cells at `depth`, i.e. how many children per axis
    /// a cell at that depth has. `None` at the deepest level.
    pub fn branching_at(&self, depth: usize) -> Option<u32> {
        self.branching.get(depth).copied()
    }

    /// The depth-0 address covering the whole envelope.
    pub fn root(&self) -> CellAddress<'_> {
        CellAddress {
            grid: self,
            path: SmallVec::new(),
        }
    }

    /// Deepest address whose cell contains `coord`.
    ///
    /// Coordinates outside the envelope are clamped to the nearest edge cell
    /// at every level, so this never fails.
    pub fn locate(&self, coord: Coord) -> CellAddress<'_> {
        let mut path = SmallVec::with_capacity(self.num_levels());
        let (mut gx, mut gy) = (0u64, 0u64);
        let mut resolution = 1u64;
        for &b in &self.branching {
            let b = u64::from(b);
            resolution *= b;
            let ix = self.locate_axis(
                coord.x,
                self.envelope.min_x(),
                self.envelope.max_x(),
                gx * b,
                b,
                resolution,
            );
            let iy = self.locate_axis(
                coord.y,
                self.envelope.min_y(),
                self.envelope.max_y(),
                gy * b,
                b,
                resolution,
            );
            gx = gx * b + ix;
            gy = gy * b + iy;
            path.push((ix as u32, iy as u32));
        }
        CellAddress { grid: self, path }
    }

    /// Child index along one axis, relative to the first child `first` of
    /// the parent cell.
    fn locate_axis(
        &self,
        value: f64,
        min: f64,
        max: f64,
        first: u64,
        branch: u64,
        resolution: u64,
    ) -> u64 {
        let last = first + branch - 1;
        let raw = ((value - min) / (max - min) * resolution as f64).floor();
        let mut index = if raw.is_nan() || raw <= first as f64 {
            first
        } else if raw >= last as f64 {
            last
        } else {
            raw as u64
        };
        // Settle against the exact cell bounds so the located cell always
        // covers the coordinate.
        while index > first && value < cell_bound(min, max, index, resolution) {
            index -= 1;
        }
        while index < last && value >= cell_bound(min, max, index + 1, resolution) {
            index += 1;
        }
        index - first
    }

    fn is_same(&self, other: &CellGrid) -> bool {
        std::ptr::eq(self, other) || self == other
    }
}

impl PartialEq for CellGrid {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.branching == other.branching
            && self.envelope == other.envelope
    }
}

impl Eq for CellGrid {}

impl Hash for CellGrid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

/// Boundary `index` of `resolution` equal slices of `[min, max]`.
///
/// Computed from the exact fraction `index / resolution`, so the same
/// boundary reached from different depths is bit-identical.
fn cell_bound(min: f64, max: f64, index: u64, resolution: u64) -> f64 {
    if index == 0 {
        min
    } else if index >= resolution {
        max
    } else {
        min + (max - min) * (index as f64 / resolution as f64)
    }
}

/// Location of a cell in a [`CellGrid`], as the path of child indices taken
/// from the root.
///
/// Equality and hashing include the owning grid: identical paths in two
/// different grids are different addresses.
#[derive(Clone)]
pub struct CellAddress<'g> {
    grid: &'g CellGrid,
    path: SmallVec<[(u32, u32); 8]>,
}

impl<'g> CellAddress<'g> {
    /// Parse a serialized address (see [`CellAddress::to_attribute_value`]).
    ///
    /// The empty string is the root.
    ///
    /// # Errors
    ///
    /// `MalformedAddress` when the level count exceeds the grid's depth, a
    /// level does not hold exactly two integers, or an index is out of range.
    pub fn from_attribute_value(grid: &'g CellGrid, value: &str) -> Result<Self> {
        if value.is_empty() {
            return Ok(grid.root());
        }
        let body = value.strip_suffix(';').unwrap_or(value);
        let groups: Vec<&str> = body.split(';').collect();
        if groups.len() > grid.num_levels() {
            return Err(LabelGridError::malformed(
                value,
                format!(
                    "{} levels but grid has {}",
                    groups.len(),
                    grid.num_levels()
                ),
            ));
        }

        let mut path = SmallVec::with_capacity(groups.len());
        for (level, group) in groups.iter().enumerate() {
            let indices: Vec<&str> = group.split(',').collect();
            let [x, y] = indices.as_slice() else {
                return Err(LabelGridError::malformed(
                    value,
                    format!("level {} has {} indices", level, indices.len()),
                ));
            };
            let parse = |token: &str| {
                token.parse::<u32>().map_err(|e| {
                    LabelGridError::malformed(
                        value,
                        format!("level {} index {:?}: {}", level, token, e),
                    )
                })
            };
            let (x, y) = (parse(x)?, parse(y)?);
            let size = grid.branching[level];
            if x >= size || y >= size {
                return Err(LabelGridError::malformed(
                    value,
                    format!("level {} index ({}, {}) outside 0..{}", level, x, y, size),
                ));
            }
            path.push((x, y));
        }
        Ok(Self { grid, path })
    }

    /// Serialized form: `x,y;` per level, e.g. `1,0;1,1;`. The root is `""`.
    pub fn to_attribute_value(&self) -> String {
        let mut out = String::with_capacity(self.path.len() * 4);
        for (x, y) in &self.path {
            out.push_str(&x.to_string());
            out.push(',');
            out.push_str(&y.to_string());
            out.push(';');
        }
        out
    }

    pub fn grid(&self) -> &'g CellGrid {
        self.grid
    }

    /// Number of levels descended from the root.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// The `(x, y)` index pairs from the root down.
    pub fn indices(&self) -> &[(u32, u32)] {
        &self.path
    }

    /// Child cell at `(x, y)`.
    ///
    /// # Errors
    ///
    /// `UnsupportedDepth` at the deepest level; `InvalidInput` when an index
    /// is not below this level's branching factor.
    pub fn child(&self, x: u32, y: u32) -> Result<Self> {
        let depth = self.depth();
        let Some(size) = self.grid.branching_at(depth) else {
            return Err(LabelGridError::UnsupportedDepth {
                depth,
                max: self.grid.num_levels(),
            });
        };
        if x >= size || y >= size {
            return Err(LabelGridError::InvalidInput(format!(
                "Child index ({}, {}) outside 0..{} at depth {}",
                x, y, size, depth
            )));
        }
        let mut path = self.path.clone();
        path.push((x, y));
        Ok(Self {
            grid: self.grid,
            path,
        })
    }

    /// The enclosing cell one level up, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.path.is_empty() {
            return None;
        }
        self.ancestor(self.depth() - 1)
    }

    /// The enclosing cell at `depth`, which must not exceed this address's
    /// own depth.
    pub fn ancestor(&self, depth: usize) -> Option<Self> {
        if depth > self.depth() {
            return None;
        }
        Some(Self {
            grid: self.grid,
            path: self.path[..depth].into(),
        })
    }

    /// This address followed by each of its ancestors up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = CellAddress<'g>> + '_ {
        (0..=self.depth())
            .rev()
            .filter_map(move |depth| self.ancestor(depth))
    }

    /// Whether `other` is this cell or lies inside it.
    pub fn contains(&self, other: &CellAddress<'_>) -> bool {
        self.grid.is_same(other.grid)
            && other.depth() >= self.depth()
            && other.path[..self.depth()] == self.path[..]
    }

    /// Column and row of this cell among all cells at its depth, with the
    /// per-axis cell count at that depth.
    pub fn global_index(&self) -> (u64, u64, u64) {
        let (mut gx, mut gy, mut resolution) = (0u64, 0u64, 1u64);
        for (level, (x, y)) in self.path.iter().enumerate() {
            let b = u64::from(self.grid.branching[level]);
            gx = gx * b + u64::from(*x);
            gy = gy * b + u64::from(*y);
            resolution *= b;
        }
        (gx, gy, resolution)
    }

    /// Bounding rectangle of this cell, tagged with the grid's CRS.
    pub fn envelope(&self) -> Envelope {
        let (gx, gy, resolution) = self.global_index();
        let env = &self.grid.envelope;
        let mut cell = Envelope::new(
            cell_bound(env.min_x(), env.max_x(), gx, resolution),
            cell_bound(env.min_y(), env.max_y(), gy, resolution),
            cell_bound(env.min_x(), env.max_x(), gx + 1, resolution),
            cell_bound(env.min_y(), env.max_y(), gy + 1, resolution),
        );
        cell.crs = env.crs.clone();
        cell
    }

    /// The cell envelope as a rectangular polygon.
    pub fn envelope_polygon(&self) -> Polygon {
        self.envelope().to_polygon()
    }

    /// The cell envelope as a single-member multipolygon.
    pub fn envelope_geometry(&self) -> MultiPolygon {
        MultiPolygon::new(vec![self.envelope_polygon()])
    }
}

impl PartialEq for CellAddress<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.grid.is_same(other.grid)
    }
}

impl Eq for CellAddress<'_> {}

impl Hash for CellAddress<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.grid.fingerprint.hash(state);
        self.path.hash(state);
    }
}

impl PartialOrd for CellAddress<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellAddress<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.grid
            .fingerprint
            .cmp(&other.grid.fingerprint)
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl fmt::Display for CellAddress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, (x, y)) in self.path.iter().enumerate() {
            if idx != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{},{}", x, y)?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for CellAddress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellAddress({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    const DELTA: f64 = 1e-8;

    fn grid() -> CellGrid {
        CellGrid::new(Envelope::new(0.0, 0.0, 10.0, 20.0), vec![2, 2]).unwrap()
    }

    #[test]
    fn test_sibling_cells_share_boundaries() {
        let grid = grid();
        let root = grid.root();
        let bottom_left = root.child(0, 0).unwrap().envelope();
        let top_left = root.child(0, 1).unwrap().envelope();
        let top_right = root.child(1, 1).unwrap().envelope();
        let bottom_right = root.child(1, 0).unwrap().envelope();

        assert!((bottom_left.max_x() - 5.0).abs() < DELTA);
        assert!((bottom_left.max_y() - 10.0).abs() < DELTA);
        assert_eq!(bottom_left.max_x(), bottom_right.min_x());
        assert_eq!(top_left.max_x(), top_right.min_x());
        assert_eq!(bottom_left.max_y(), top_left.min_y());
        assert_eq!(bottom_right.max_y(), top_right.min_y());
    }

    #[test]
    fn test_cousin_cells_share_boundaries() {
        let grid =
            CellGrid::new(Envelope::new(-180.0, -90.0, 180.0, 90.0), vec![3, 7, 3]).unwrap();
        let root = grid.root();
        let left = root.child(0, 0).unwrap().child(6, 0).unwrap().child(2, 0).unwrap();
        let right = root.child(1, 0).unwrap().child(0, 0).unwrap().child(0, 0).unwrap();
        assert_eq!(left.envelope().max_x(), right.envelope().min_x());
        assert_eq!(
            root.child(0, 0).unwrap().envelope().max_x(),
            right.envelope().min_x()
        );
    }

    #[test]
    fn test_grandchild_serialization_and_envelope() {
        let grid = grid();
        let cell = grid.root().child(1, 0).unwrap().child(1, 1).unwrap();
        assert_eq!(cell.to_attribute_value(), "1,0;1,1;");
        assert_eq!(cell.envelope().max_x(), 10.0);
        assert_eq!(cell.envelope().min_x(), 7.5);
        assert_eq!(cell.envelope().min_y(), 5.0);
        assert_eq!(cell.envelope().max_y(), 10.0);
        assert_eq!(cell.to_string(), "[1,0 1,1]");
        assert_eq!(grid.root().to_string(), "[]");
    }

    #[test]
    fn test_attribute_value_roundtrip() {
        let grid = grid();
        let root = grid.root();
        assert_eq!(root.to_attribute_value(), "");
        assert_eq!(CellAddress::from_attribute_value(&grid, "").unwrap(), root);

        for x in 0..2 {
            for y in 0..2 {
                let child = root.child(x, y).unwrap();
                for (cx, cy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let grandchild = child.child(cx, cy).unwrap();
                    for address in [&child, &grandchild] {
                        let parsed =
                            CellAddress::from_attribute_value(&grid, &address.to_attribute_value())
                                .unwrap();
                        assert_eq!(&parsed, address);
                    }
                }
            }
        }
    }

    #[test]
    fn test_attribute_value_without_trailing_separator() {
        let grid = grid();
        let parsed = CellAddress::from_attribute_value(&grid, "1,0;0,1").unwrap();
        assert_eq!(parsed.indices(), &[(1, 0), (0, 1)]);
    }

    #[test]
    fn test_malformed_attribute_values() {
        let grid = grid();
        for bad in ["1,0;1,1;0,0;", "1;", "1,0,1;", "a,b;", "2,0;", "0,-1;", ";"] {
            let err = CellAddress::from_attribute_value(&grid, bad).unwrap_err();
            assert!(
                matches!(err, LabelGridError::MalformedAddress { .. }),
                "{} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_parent_child() {
        let grid = grid();
        let root = grid.root();
        assert!(root.parent().is_none());

        let child = root.child(0, 1).unwrap();
        assert_eq!(child.parent().unwrap(), root);
        let grandchild = child.child(1, 0).unwrap();
        assert_eq!(grandchild.parent().unwrap(), child);
        assert_eq!(grandchild.depth(), 2);

        let err = grandchild.child(0, 0).unwrap_err();
        assert!(matches!(
            err,
            LabelGridError::UnsupportedDepth { depth: 2, max: 2 }
        ));
    }

    #[test]
    fn test_child_index_out_of_range() {
        let grid = grid();
        assert!(matches!(
            grid.root().child(2, 0),
            Err(LabelGridError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_ancestors_walk_to_root() {
        let grid = grid();
        let leaf = grid.root().child(1, 1).unwrap().child(0, 1).unwrap();
        let walk: Vec<String> = leaf.ancestors().map(|a| a.to_string()).collect();
        assert_eq!(walk, vec!["[1,1 0,1]", "[1,1]", "[]"]);
        assert!(grid.root().contains(&leaf));
        assert!(leaf.parent().unwrap().contains(&leaf));
        assert!(!leaf.contains(&leaf.parent().unwrap()));
    }

    #[test]
    fn test_equality_includes_grid() {
        let grid1 = grid();
        let grid1_copy = grid();
        let grid2 = CellGrid::new(Envelope::new(1.0, 0.0, 10.0, 20.0), vec![2]).unwrap();

        let a = grid1.root().child(0, 0).unwrap();
        let b = grid1_copy.root().child(0, 0).unwrap();
        let c = grid2.root().child(0, 0).unwrap();

        assert_eq!(grid1.root(), grid1_copy.root());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(grid1.root(), a);

        let hash = |addr: &CellAddress<'_>| {
            let mut h = FxHasher::default();
            addr.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_locate_covers_coordinate() {
        let grid =
            CellGrid::new(Envelope::new(-180.0, -90.0, 180.0, 90.0), vec![40, 2, 2, 2]).unwrap();
        let mut x = -180.0;
        while x <= 180.0 {
            let mut y = -90.0;
            while y <= 90.0 {
                let c = coord! { x: x, y: y };
                let cell = grid.locate(c);
                assert_eq!(cell.depth(), 4);
                assert!(cell.envelope().covers(c), "{:?} not in {}", c, cell);
                y += 7.3;
            }
            x += 3.7;
        }
        let corner = coord! { x: 180.0, y: 90.0 };
        assert!(grid.locate(corner).envelope().covers(corner));
    }

    #[test]
    fn test_locate_clamps_out_of_bounds() {
        let grid = grid();
        let below = grid.locate(coord! { x: -5.0, y: -100.0 });
        assert_eq!(below.indices(), &[(0, 0), (0, 0)]);
        let above = grid.locate(coord! { x: 50.0, y: 100.0 });
        assert_eq!(above.indices(), &[(1, 1), (1, 1)]);
        let nan = grid.locate(coord! { x: f64::NAN, y: 3.0 });
        assert_eq!(nan.depth(), 2);
    }

    #[test]
    fn test_attribute_name_roundtrip() {
        let env = Envelope::new(-180.0, -90.0, 180.0, 90.0);
        let grid = CellGrid::new(env.clone(), vec![40, 2, 2, 2]).unwrap();
        assert_eq!(grid.attribute_name(), "GI40_2_2_2");
        let rebuilt = CellGrid::from_attribute_name(env.clone(), "GI40_2_2_2").unwrap();
        assert_eq!(rebuilt, grid);

        assert!(CellGrid::from_attribute_name(env.clone(), "XX2_2").is_err());
        assert!(CellGrid::from_attribute_name(env, "GI2_x").is_err());
    }

    #[test]
    fn test_invalid_grids() {
        let env = Envelope::new(0.0, 0.0, 1.0, 1.0);
        assert!(CellGrid::new(env.clone(), Vec::<u32>::new()).is_err());
        assert!(CellGrid::new(env.clone(), vec![2, 0]).is_err());
        assert!(CellGrid::new(Envelope::new(0.0, 0.0, 0.0, 1.0), vec![2]).is_err());
        assert!(CellGrid::new(env, vec![u32::MAX, u32::MAX]).is_err());
    }
}
