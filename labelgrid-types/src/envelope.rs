use geo::{Coord, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// A 2D axis-aligned envelope with an optional coordinate-system tag.
///
/// The tag is carried along untouched; no reprojection ever happens. Two
/// envelopes are equal only if their bounds and tags are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The underlying geometric rectangle
    pub rect: Rect,
    /// Opaque coordinate reference system identifier (e.g. `EPSG:4326`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
}

impl Envelope {
    /// Create a new envelope from minimum and maximum coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use labelgrid_types::envelope::Envelope;
    ///
    /// let env = Envelope::new(0.0, 0.0, 10.0, 20.0);
    /// assert_eq!(env.width(), 10.0);
    /// assert_eq!(env.height(), 20.0);
    /// ```
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            rect: Rect::new(
                geo::coord! { x: min_x, y: min_y },
                geo::coord! { x: max_x, y: max_y },
            ),
            crs: None,
        }
    }

    /// Create an envelope from a `geo::Rect`.
    pub fn from_rect(rect: Rect) -> Self {
        Self { rect, crs: None }
    }

    /// Attach a coordinate-system tag.
    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn min_x(&self) -> f64 {
        self.rect.min().x
    }

    pub fn min_y(&self) -> f64 {
        self.rect.min().y
    }

    pub fn max_x(&self) -> f64 {
        self.rect.max().x
    }

    pub fn max_y(&self) -> f64 {
        self.rect.max().y
    }

    pub fn width(&self) -> f64 {
        self.max_x() - self.min_x()
    }

    pub fn height(&self) -> f64 {
        self.max_y() - self.min_y()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Check whether a coordinate lies inside or on the border of this envelope.
    pub fn covers(&self, coord: Coord) -> bool {
        coord.x >= self.min_x()
            && coord.x <= self.max_x()
            && coord.y >= self.min_y()
            && coord.y <= self.max_y()
    }

    /// Smallest envelope covering both inputs. The tag of `self` is kept.
    pub fn union(&self, other: &Envelope) -> Self {
        Self {
            rect: Rect::new(
                geo::coord! {
                    x: self.min_x().min(other.min_x()),
                    y: self.min_y().min(other.min_y()),
                },
                geo::coord! {
                    x: self.max_x().max(other.max_x()),
                    y: self.max_y().max(other.max_y()),
                },
            ),
            crs: self.crs.clone(),
        }
    }

    /// The envelope as a closed rectangular polygon.
    pub fn to_polygon(&self) -> Polygon {
        self.rect.to_polygon()
    }

    /// Largest absolute extent, handy for scale-relative tolerances.
    pub fn extent(&self) -> f64 {
        self.width().abs().max(self.height().abs())
    }
}

impl From<Rect> for Envelope {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}
