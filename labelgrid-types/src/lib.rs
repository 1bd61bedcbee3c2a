//! # labelgrid-types
//!
//! Core envelope types for the labelgrid simplifier and index.
//!
//! - **Envelope**: an axis-aligned bounding rectangle carrying an opaque
//!   coordinate-system tag, used as the extent of a cell grid and as the
//!   bounds of a feature dataset.
//!
//! All types are serializable with Serde and built on top of the `geo` crate's
//! geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use labelgrid_types::envelope::Envelope;
//! use geo::coord;
//!
//! let world = Envelope::new(-180.0, -90.0, 180.0, 90.0).with_crs("EPSG:4326");
//! assert!(world.covers(coord! { x: -74.0060, y: 40.7128 }));
//! ```

pub mod envelope;
