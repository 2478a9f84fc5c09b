//! End-to-end detection from files on disk: GeoJSON pipeline geometry plus
//! baseline/current band pairs written as GeoTIFFs in the fetcher's layout.

use seepwatch_algorithms::anomaly::candidates_to_geojson;
use seepwatch_algorithms::imagery::CLASS_GAINED;
use seepwatch_algorithms::pipeline::{BandSource, DetectionParams, LeakDetector, SceneBands};
use seepwatch_algorithms::vector::{load_aoi, BufferParams};
use seepwatch_algorithms::{anomaly::RankParams, imagery::ChangeParams};
use seepwatch_core::crs::UtmZone;
use seepwatch_core::io::write_geotiff;
use seepwatch_core::{Error, GeoTransform, Raster, CRS};
use std::path::Path;

const ORIGIN_X: f64 = 440_000.0;
const ORIGIN_Y: f64 = 4_475_000.0;
const PIXEL: f64 = 10.0;
const SIZE: usize = 60;

fn band(value: f64) -> Raster<f64> {
    let mut r = Raster::filled(SIZE, SIZE, value);
    r.set_transform(GeoTransform::new(ORIGIN_X, ORIGIN_Y, PIXEL, -PIXEL));
    r.set_crs(Some(CRS::from_epsg(32630)));
    r
}

/// A pipeline running west to east through the middle row of the grid.
fn write_pipeline(dir: &Path) -> std::path::PathBuf {
    let zone = UtmZone::from_epsg(32630).unwrap();
    let y = ORIGIN_Y - 30.0 * PIXEL;
    let (lon0, lat0) = zone.inverse(ORIGIN_X + 50.0, y);
    let (lon1, lat1) = zone.inverse(ORIGIN_X + 550.0, y);
    let text = format!(
        r#"{{"type": "FeatureCollection", "features": [{{
            "type": "Feature", "properties": {{}},
            "geometry": {{"type": "LineString", "coordinates": [[{lon0}, {lat0}], [{lon1}, {lat1}]]}}
        }}]}}"#
    );
    let path = dir.join("pipeline.geojson");
    std::fs::write(&path, text).unwrap();
    path
}

fn write_scene(dir: &Path, name: &str, green: &Raster<f64>, nir: &Raster<f64>) -> std::path::PathBuf {
    let green_path = dir.join(format!("{name}_green.tif"));
    write_geotiff(green, &green_path, None).unwrap();
    write_geotiff(nir, dir.join(format!("{name}_nir.tif")), None).unwrap();
    green_path
}

#[test]
fn leak_inside_corridor_is_found_and_outside_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = write_pipeline(dir.path());

    // Dry soil everywhere in the baseline: NDWI = (0.2 - 0.4) / 0.6 < 0
    let baseline = write_scene(dir.path(), "t0", &band(0.2), &band(0.4));

    // A 3x3 pond on the pipeline and another far outside the corridor
    let mut green = band(0.2);
    let mut nir = band(0.4);
    for (r0, c0) in [(29, 20), (2, 2)] {
        for r in r0..r0 + 3 {
            for c in c0..c0 + 3 {
                green.set(r, c, 0.6).unwrap();
                nir.set(r, c, 0.1).unwrap();
            }
        }
    }
    let current = write_scene(dir.path(), "t1", &green, &nir);

    let aoi = load_aoi(&pipeline, &BufferParams { distance: 60.0, segments: 32 }).unwrap();
    assert_eq!(aoi.crs().epsg(), Some(32630));

    let scenes: Vec<SceneBands> = [baseline, current]
        .iter()
        .map(|p| SceneBands::load(&BandSource::resolve(p, 3, 8).unwrap()).unwrap())
        .collect();

    let params = DetectionParams {
        change: ChangeParams {
            threshold: 0.2,
            min_area_pixels: 4,
            ..Default::default()
        },
        rank: RankParams {
            min_area_m2: 25.0,
            top_k: 10,
        },
        ..Default::default()
    };
    let detection = LeakDetector::new(aoi, params).run(&scenes).unwrap();

    assert_eq!(detection.baseline_id, "t0");
    assert_eq!(detection.current_id, "t1");
    assert_eq!(detection.stats.gained_pixels, 9);
    assert_eq!(detection.candidates.len(), 1);

    let leak = &detection.candidates[0];
    assert!((leak.area_m2 - 900.0).abs() < 1e-6);
    assert!((leak.centroid.0 - (ORIGIN_X + 215.0)).abs() < 1e-6);
    assert!((leak.centroid.1 - (ORIGIN_Y - 305.0)).abs() < 1e-6);
    assert_eq!(detection.change_mask.class_at(30, 21), Some(CLASS_GAINED));

    // The pond outside the corridor is excluded, not merely unchanged
    assert!(!detection.current_index.is_valid(3, 3));

    let fc = candidates_to_geojson(&detection.candidates, detection.change_mask.classes().crs());
    assert_eq!(fc.features.len(), 1);
}

#[test]
fn single_scene_is_insufficient_imagery() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = write_pipeline(dir.path());
    let only = write_scene(dir.path(), "t0", &band(0.2), &band(0.4));

    let aoi = load_aoi(&pipeline, &BufferParams::default()).unwrap();
    let scene = SceneBands::load(&BandSource::resolve(&only, 3, 8).unwrap()).unwrap();

    let err = LeakDetector::new(aoi, DetectionParams::default())
        .run(&[scene])
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientImagery { required: 2, obtained: 1 }));
}
