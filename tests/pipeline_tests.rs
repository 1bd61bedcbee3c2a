use geo::{Rect, coord};
use labelgrid::{
    CellAddress, CellGrid, Config, Envelope, FeatureFactory, FeatureRecord, GridSimplifier,
    IndexOptions, LabelQuery, MemoryFeatures, Pipeline, PipelineBuilder,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn rect_record(min_x: f64, min_y: f64, max_x: f64, max_y: f64, label: &str) -> FeatureRecord {
    let rect = Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y });
    FeatureRecord::new(rect.to_polygon()).with_attribute("label", label)
}

/// A splits from B at x = 3.5, inside the deepest cells of a `[2, 2]` grid.
fn two_zones() -> MemoryFeatures {
    MemoryFeatures::new(vec![
        rect_record(0.0, 0.0, 3.5, 4.0, "A"),
        rect_record(3.5, 0.0, 4.0, 4.0, "B"),
    ])
}

fn pipeline() -> Pipeline {
    PipelineBuilder::new()
        .branching(vec![2, 2])
        .build()
        .expect("valid config")
}

#[test]
fn test_end_to_end_lookup() {
    init_logging();
    let pipeline = pipeline();
    let mut output = MemoryFeatures::default();
    let report = pipeline.run(&two_zones(), &mut output).unwrap();

    assert_eq!(report.input_features, 2);
    assert_eq!(report.stats.rounds, 2);
    assert!(report.stats.rectangles >= 2);
    assert_eq!(report.written, output.len());

    let grid = pipeline.open_grid(&output).unwrap();
    let index = pipeline.load_index(&grid, &output).unwrap();
    for (x, y, label) in [
        (0.5, 0.5, "A"),
        (1.9, 3.9, "A"),
        (3.2, 0.5, "A"),
        (3.8, 0.5, "B"),
        (3.8, 3.5, "B"),
    ] {
        assert_eq!(
            index.label_for(coord! { x: x, y: y }).as_deref(),
            Some(label),
            "label at ({}, {})",
            x,
            y
        );
    }
}

#[test]
fn test_homogeneous_cells_become_single_rectangles() {
    init_logging();
    let pipeline = pipeline();
    let mut output = MemoryFeatures::default();
    pipeline.run(&two_zones(), &mut output).unwrap();

    let grid = pipeline.open_grid(&output).unwrap();
    let factory = FeatureFactory::new(&grid, "label");
    let features: Vec<_> = output
        .as_slice()
        .iter()
        .map(|r| factory.from_record(r).unwrap())
        .collect();

    // the left half lies entirely in A
    for y in 0..2 {
        let cell = grid.root().child(0, y).unwrap();
        let in_cell: Vec<_> = features.iter().filter(|f| *f.address() == cell).collect();
        assert_eq!(in_cell.len(), 1);
        assert_eq!(in_cell[0].label().map(|l| &**l), Some("A"));
        assert_eq!(in_cell[0].geometry(), &cell.envelope_geometry());
        assert!(
            features
                .iter()
                .all(|f| f.address() == &cell || !cell.contains(f.address()))
        );
    }
}

#[test]
fn test_pipeline_is_a_fixed_point() {
    init_logging();
    let pipeline = pipeline();
    let mut first = MemoryFeatures::default();
    pipeline.run(&two_zones(), &mut first).unwrap();

    let mut second = MemoryFeatures::default();
    let report = pipeline.run(&first, &mut second).unwrap();

    assert_eq!(report.stats.split_fallbacks, 0);
    assert_eq!(second.len(), first.len());
    for record in second.as_slice() {
        assert!(first.as_slice().contains(record), "new record {:?}", record);
    }
}

#[test]
fn test_weak_only_cells_are_dropped() {
    init_logging();
    let grid = CellGrid::new(Envelope::new(0.0, 0.0, 4.0, 4.0), vec![2, 2]).unwrap();
    let factory = FeatureFactory::new(&grid, "label");
    let left = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 2.0, y: 4.0 }).to_polygon();
    let right = Rect::new(coord! { x: 2.0, y: 0.0 }, coord! { x: 4.0, y: 4.0 }).to_polygon();
    let features = vec![
        factory.feature(Some("A".into()), false, left),
        factory.feature(Some("Sea".into()), true, right),
    ];

    let simplified = GridSimplifier::new(&grid).simplify(features).unwrap();
    assert_eq!(simplified.features.len(), 2);
    assert!(simplified.features.iter().all(|f| f.label().map(|l| &**l) == Some("A")));
    assert_eq!(simplified.stats.weak_cells_dropped, 2);
}

#[test]
fn test_disabled_simplification_keeps_pieces() {
    init_logging();
    let pipeline = PipelineBuilder::new()
        .branching(vec![2, 2])
        .simplify_single_label_cells(false)
        .build()
        .unwrap();
    let mut output = MemoryFeatures::default();
    let report = pipeline.run(&two_zones(), &mut output).unwrap();

    assert_eq!(report.stats.rectangles, 0);
    // every piece is cut down to a deepest-level cell
    let grid = pipeline.open_grid(&output).unwrap();
    for record in output.as_slice() {
        let value = record.text_attribute(&grid.attribute_name()).unwrap();
        let address = CellAddress::from_attribute_value(&grid, &value).unwrap();
        assert_eq!(address.depth(), 2);
    }

    let index = pipeline.load_index(&grid, &output).unwrap();
    assert_eq!(index.label_for(coord! { x: 1.0, y: 1.0 }).as_deref(), Some("A"));
    assert_eq!(index.label_for(coord! { x: 3.9, y: 1.0 }).as_deref(), Some("B"));
}

#[test]
fn test_index_without_collapsed_cells() {
    init_logging();
    let pipeline = Pipeline::new(
        Config::default()
            .with_branching(vec![2, 2])
            .with_index_options(IndexOptions::default().with_collapse_single_label_cells(false)),
    )
    .unwrap();
    let mut output = MemoryFeatures::default();
    pipeline.run(&two_zones(), &mut output).unwrap();

    let grid = pipeline.open_grid(&output).unwrap();
    let index = pipeline.load_index(&grid, &output).unwrap();
    assert_eq!(index.label_for(coord! { x: 1.0, y: 1.0 }).as_deref(), Some("A"));
    assert_eq!(index.colocated_features(coord! { x: 1.0, y: 1.0 }).len(), 1);
    assert_eq!(index.colocated_features(coord! { x: 3.2, y: 0.5 }).len(), 2);
}

#[test]
fn test_gap_filling_labels_the_strait() {
    init_logging();
    let pipeline = PipelineBuilder::new()
        .branching(vec![4, 2])
        .fill_gaps(true)
        .build()
        .unwrap();
    // the strait between x = 3.2 and x = 3.8 lies inside one deepest column
    let source = MemoryFeatures::new(vec![
        rect_record(0.0, 0.0, 3.2, 8.0, "West"),
        rect_record(3.8, 0.0, 8.0, 8.0, "East"),
    ]);
    let mut output = MemoryFeatures::default();
    let report = pipeline.run(&source, &mut output).unwrap();
    assert!(report.gap_features >= 2);

    let grid = pipeline.open_grid(&output).unwrap();
    let index = pipeline.load_index(&grid, &output).unwrap();
    assert_eq!(index.label_for(coord! { x: 3.4, y: 4.5 }).as_deref(), Some("West"));
    assert_eq!(index.label_for(coord! { x: 3.6, y: 4.5 }).as_deref(), Some("East"));
    assert_eq!(index.label_for(coord! { x: 3.1, y: 4.5 }).as_deref(), Some("West"));

    let mut without = MemoryFeatures::default();
    let plain = PipelineBuilder::new().branching(vec![4, 2]).build().unwrap();
    plain.run(&source, &mut without).unwrap();
    let index = plain.load_index(&grid, &without).unwrap();
    assert_eq!(index.label_for(coord! { x: 3.4, y: 4.5 }), None);
    assert_eq!(index.label_for(coord! { x: 3.1, y: 4.5 }).as_deref(), Some("West"));
}
