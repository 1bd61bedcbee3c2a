use geo::{Rect, coord};
use labelgrid::{
    CellAddress, CellGrid, Envelope, FeatureFactory, IndexOptions, LabelFilter, LabelGridError,
    LabelQuery, NearestBy, SpatialIndex,
};

fn grid() -> CellGrid {
    CellGrid::new(Envelope::new(0.0, 0.0, 10.0, 20.0), vec![2, 2]).expect("valid grid")
}

/// Test 1: Documented address example
#[test]
fn test_grandchild_address() {
    let grid = grid();
    let address = grid.root().child(1, 0).unwrap().child(1, 1).unwrap();
    assert_eq!(address.to_attribute_value(), "1,0;1,1;");
    assert_eq!(address.envelope().max_x(), 10.0);
    assert_eq!(
        CellAddress::from_attribute_value(&grid, "1,0;1,1;").unwrap(),
        address
    );
}

/// Test 2: Depth limit
#[test]
fn test_child_beyond_deepest_level() {
    let grid = grid();
    let leaf = grid.root().child(0, 0).unwrap().child(0, 0).unwrap();
    assert!(matches!(
        leaf.child(0, 0),
        Err(LabelGridError::UnsupportedDepth { depth: 2, max: 2 })
    ));
    assert_eq!(leaf.parent().unwrap().parent().unwrap(), grid.root());
    assert!(grid.root().parent().is_none());
}

/// Test 3: Addresses from other grids never match
#[test]
fn test_addresses_are_grid_specific() {
    let a = grid();
    let b = CellGrid::new(Envelope::new(0.0, 0.0, 10.0, 21.0), vec![2, 2]).unwrap();
    assert_ne!(a.root().child(0, 0).unwrap(), b.root().child(0, 0).unwrap());
    assert!(CellAddress::from_attribute_value(&a, "0,0;0,0;0,0;").is_err());
    assert!(CellAddress::from_attribute_value(&a, "2,0;").is_err());
}

/// Test 4: Every coordinate in the envelope resolves to a covering leaf
#[test]
fn test_locate_on_grid_lines() {
    let grid =
        CellGrid::new(Envelope::new(-180.0, -90.0, 180.0, 90.0), vec![40, 2, 2, 2]).unwrap();
    for i in 0..=64 {
        let x = -180.0 + 360.0 * f64::from(i) / 64.0;
        let y = -90.0 + 180.0 * f64::from(i) / 64.0;
        let cell = grid.locate(coord! { x: x, y: y });
        assert_eq!(cell.depth(), 4);
        assert!(cell.envelope().covers(coord! { x: x, y: y }), "({}, {}) in {}", x, y, cell);
    }
}

/// Test 5: Out-of-bounds coordinates clamp; a bounding box filter rejects them
#[test]
fn test_clamped_lookup_and_bounding_box_filter() {
    let grid = grid();
    let factory = FeatureFactory::new(&grid, "name");
    let east = grid.root().child(1, 0).unwrap();
    let feature =
        factory.feature_at(east.clone(), Some("East".into()), false, east.envelope_polygon());
    let index = SpatialIndex::build(&grid, vec![feature], IndexOptions::default()).unwrap();

    let outside = coord! { x: 50.0, y: 1.0 };
    assert_eq!(index.label_for(outside).as_deref(), Some("East"));

    let bounded = index.with(LabelFilter::BoundingBox(grid.envelope().clone()));
    assert_eq!(bounded.label_for(outside), None);
    assert_eq!(bounded.label_for(coord! { x: 10.0, y: 0.0 }).as_deref(), Some("East"));
}

/// Test 6: Nearest-feature resolution over a mixed cell
#[test]
fn test_nearest_feature_over_index() {
    let grid = CellGrid::new(Envelope::new(0.0, 0.0, 10.0, 10.0), vec![1]).unwrap();
    let factory = FeatureFactory::new(&grid, "name");
    let leaf = grid.root().child(0, 0).unwrap();
    let square = |min: f64, max: f64| {
        Rect::new(coord! { x: min, y: min }, coord! { x: max, y: max }).to_polygon()
    };
    let features = vec![
        factory.feature_at(leaf.clone(), Some("first".into()), false, square(1.0, 3.0)),
        factory.feature_at(leaf, Some("second".into()), false, square(4.0, 9.0)),
    ];
    let index = SpatialIndex::build(&grid, features, IndexOptions::default()).unwrap();
    let probe = coord! { x: 5.0, y: 3.0 };
    assert_eq!(index.label_for(probe), None);
    assert_eq!(index.colocated_features(probe).len(), 2);

    let by_centroid = (&index).with(LabelFilter::NearestFeature(NearestBy::CentroidDistance));
    let by_edge = (&index).with(LabelFilter::NearestFeature(NearestBy::GeometryDistance));
    assert_eq!(by_centroid.label_for(probe).as_deref(), Some("first"));
    assert_eq!(by_edge.label_for(probe).as_deref(), Some("second"));
    assert_eq!(by_edge.label_for(coord! { x: 2.0, y: 2.0 }).as_deref(), Some("first"));
}

/// Test 7: Concurrent readers share one index
#[test]
fn test_concurrent_lookups() {
    let grid = CellGrid::new(Envelope::new(0.0, 0.0, 8.0, 8.0), vec![2, 2, 2]).unwrap();
    let factory = FeatureFactory::new(&grid, "name");
    let mut features = Vec::new();
    for x in 0..2 {
        for y in 0..2 {
            let cell = grid.root().child(x, y).unwrap();
            let label = format!("Q{}{}", x, y);
            features.push(factory.feature_at(
                cell.clone(),
                Some(label.into()),
                false,
                cell.envelope_polygon(),
            ));
        }
    }
    let index = SpatialIndex::build(&grid, features, IndexOptions::default()).unwrap();
    let chain = index
        .with(LabelFilter::DefaultLabel("none".into()))
        .with(LabelFilter::BoundingBox(grid.envelope().clone()));

    std::thread::scope(|scope| {
        for t in 0..4u32 {
            let chain = &chain;
            scope.spawn(move || {
                for i in 0..200u32 {
                    let x = f64::from((i * 7 + t) % 80) / 10.0 + 0.05;
                    let y = f64::from((i * 13 + t) % 80) / 10.0 + 0.05;
                    let expected = format!("Q{}{}", u8::from(x > 4.0), u8::from(y > 4.0));
                    assert_eq!(
                        chain.label_for(coord! { x: x, y: y }).as_deref(),
                        Some(expected.as_str())
                    );
                }
                assert_eq!(chain.label_for(coord! { x: -1.0, y: 1.0 }), None);
            });
        }
    });
}
