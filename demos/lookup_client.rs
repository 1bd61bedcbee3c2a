//! Console lookup client
//!
//! Loads a simplified GeoJSON dataset and answers `x y` lookups read from
//! standard input, one per line. Without a path, a small two-zone dataset is
//! simplified in memory first.
//!
//! ```text
//! cargo run --example lookup_client -- simplified.geojson tzid
//! ```

use geo::{Rect, coord};
use labelgrid::prelude::*;
use labelgrid::{NearestBy, Pipeline};
use std::env;
use std::error::Error;
use std::io::{self, BufRead, Write};

fn demo_zones() -> MemoryFeatures {
    let zone = |min_x: f64, min_y: f64, max_x: f64, max_y: f64, tzid: &str| {
        let rect = Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y });
        FeatureRecord::new(rect.to_polygon()).with_attribute("tzid", tzid)
    };
    MemoryFeatures::new(vec![
        zone(-9.5, 37.0, -6.2, 42.1, "Europe/Lisbon"),
        zone(-6.2, 36.0, 3.3, 43.8, "Europe/Madrid"),
    ])
}

fn open(
    pipeline: &Pipeline,
    path: Option<String>,
) -> std::result::Result<Box<dyn FeatureSource>, Box<dyn Error>> {
    match path {
        Some(path) => {
            println!("Loading {}", path);
            Ok(Box::new(GeoJsonSource::new(path)))
        }
        None => {
            println!("No dataset given, simplifying the built-in zones");
            let mut simplified = MemoryFeatures::default();
            let report = pipeline.run(&demo_zones(), &mut simplified)?;
            println!("  {} features simplified into {}", report.input_features, report.written);
            Ok(Box::new(simplified))
        }
    }
}

fn parse_coordinate(line: &str) -> Option<(f64, f64)> {
    let mut parts = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty());
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    parts.next().is_none().then_some((x, y))
}

fn main() -> std::result::Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let path = args.next();
    let label_attribute = args.next().unwrap_or_else(|| "tzid".to_string());

    let pipeline = PipelineBuilder::new()
        .branching(vec![8, 2, 2])
        .label_attribute(label_attribute)
        .build()?;
    let source = open(&pipeline, path)?;
    let grid = pipeline.open_grid(source.as_ref())?;
    let index = pipeline.load_index(&grid, source.as_ref())?;
    println!(
        "Indexed {} cells on grid {}",
        index.len(),
        grid.attribute_name()
    );

    // unlabeled points fall back to the closest feature, then to a GMT band
    let lookup = index
        .with(LabelFilter::NearestFeature(NearestBy::GeometryDistance))
        .with(LabelFilter::timezone_band())
        .with(LabelFilter::BoundingBox(grid.envelope().clone()));

    println!("Enter coordinates as `x y`, one per line");
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_coordinate(&line) {
            Some((x, y)) => match lookup.label_for(coord! { x: x, y: y }) {
                Some(label) => writeln!(out, "{}", label)?,
                None => writeln!(out, "outside {}", grid.attribute_name())?,
            },
            None => writeln!(out, "expected `x y`, got {:?}", line)?,
        }
    }
    Ok(())
}
