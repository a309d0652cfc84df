use approx::assert_abs_diff_eq;
use hpf_pansharpen::io::{self, RasterMetadata};
use hpf_pansharpen::{
    BandStorage, CancellationToken, PansharpenConfig, PansharpenError, Pansharpener,
    PipelineStage, SpatialFilter,
};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const GEOTRANSFORM: [f64; 6] = [500_000.0, 0.5, 0.0, 4_000_000.0, 0.0, -0.5];

fn write_fixture(path: &Path, bands: &[Array2<f32>], nodata: Option<f64>) {
    let (height, width) = bands[0].dim();
    let metadata = RasterMetadata {
        width,
        height,
        band_count: bands.len(),
        geotransform: GEOTRANSFORM,
        projection: String::new(),
        nodata,
        pixel_width: 0.5,
        pixel_height: 0.5,
    };
    let mut dataset = io::create_output_dataset(path, &metadata, bands.len(), &[]).unwrap();
    for (i, band) in bands.iter().enumerate() {
        io::write_band(&mut dataset, i + 1, band, nodata, "fixture").unwrap();
    }
}

struct Scene {
    dir: TempDir,
    pan: PathBuf,
    mul: PathBuf,
    output: PathBuf,
}

fn scene(pan: Array2<f32>, mul: &[Array2<f32>], nodata: Option<f64>) -> Scene {
    let dir = tempfile::tempdir().unwrap();
    let pan_path = dir.path().join("pan.tif");
    let mul_path = dir.path().join("mul_resized.tif");
    write_fixture(&pan_path, &[pan], nodata);
    write_fixture(&mul_path, mul, nodata);
    let output = dir.path().join("pansharpened.tif");
    Scene {
        pan: pan_path,
        mul: mul_path,
        output,
        dir,
    }
}

fn flat(dim: (usize, usize), value: f32) -> Array2<f32> {
    Array2::from_elem(dim, value)
}

fn is_interior(row: usize, col: usize, dim: (usize, usize), radius: usize) -> bool {
    row >= radius && col >= radius && row + radius < dim.0 && col + radius < dim.1
}

#[test]
fn test_high_pass_run_in_memory() {
    let dim = (9, 9);
    let s = scene(flat(dim, 0.5), &[flat(dim, 0.2), flat(dim, 0.3)], None);

    let mut pansharpener = Pansharpener::new(PansharpenConfig::default());
    let summary = pansharpener.run(&s.pan, &s.mul, &s.output).unwrap();

    assert_eq!(pansharpener.stage(), PipelineStage::Done);
    assert_eq!(summary.band_count, 2);
    assert_eq!((summary.height, summary.width), dim);
    // 9x9 minus the 5x5 interior
    assert_eq!(summary.invalid_pixels, vec![56, 56]);

    let meta = io::read_metadata(&s.output).unwrap();
    assert_eq!(meta.band_count, 2);
    assert_eq!(meta.geotransform, GEOTRANSFORM);

    // Flat pan: spatial component is 0, so fused = mul + pan
    for (band_index, expected) in [(1, 0.7f32), (2, 0.8f32)] {
        let (band, _) = io::read_band(&s.output, band_index, None).unwrap();
        for row in 0..dim.0 {
            for col in 0..dim.1 {
                match band.value(row, col) {
                    Some(v) => {
                        assert!(is_interior(row, col, dim, 2));
                        assert_abs_diff_eq!(v, expected, epsilon = 1e-5);
                    }
                    None => assert!(!is_interior(row, col, dim, 2)),
                }
            }
        }
        assert!(band.data()[[0, 0]].is_nan());
    }
}

#[test]
fn test_nodata_sentinel_propagates_through_window() {
    let dim = (11, 11);
    let mut pan = flat(dim, 0.4);
    pan[[5, 5]] = -9999.0;
    let s = scene(pan, &[flat(dim, 0.1)], Some(-9999.0));

    let config = PansharpenConfig {
        nodata: Some(-9999.0),
        ..PansharpenConfig::default()
    };
    Pansharpener::new(config)
        .run(&s.pan, &s.mul, &s.output)
        .unwrap();

    let meta = io::read_metadata(&s.output).unwrap();
    assert_eq!(meta.nodata, Some(-9999.0));

    let (band, _) = io::read_band(&s.output, 1, None).unwrap();
    for row in 0..dim.0 {
        for col in 0..dim.1 {
            let touches = row.abs_diff(5) <= 2 && col.abs_diff(5) <= 2;
            let expected_valid = is_interior(row, col, dim, 2) && !touches;
            assert_eq!(band.value(row, col).is_some(), expected_valid, "({}, {})", row, col);
            if !expected_valid {
                assert_eq!(band.data()[[row, col]], -9999.0);
            }
        }
    }
}

#[test]
fn test_out_of_range_values_become_nodata() {
    let dim = (7, 7);
    // 0.8 + 0.5 > 1 everywhere
    let s = scene(flat(dim, 0.5), &[flat(dim, 0.8)], None);

    let summary = Pansharpener::new(PansharpenConfig::default())
        .run(&s.pan, &s.mul, &s.output)
        .unwrap();
    assert_eq!(summary.invalid_pixels, vec![49]);
}

#[test]
fn test_low_pass_difference_run() {
    let dim = (6, 6);
    let s = scene(flat(dim, 0.3), &[flat(dim, 0.25)], None);

    let config = PansharpenConfig {
        filter: SpatialFilter::LowPassDifference,
        ..PansharpenConfig::default()
    };
    let summary = Pansharpener::new(config)
        .run(&s.pan, &s.mul, &s.output)
        .unwrap();
    // 3x3 window: only the one-pixel border is invalid
    assert_eq!(summary.invalid_pixels, vec![20]);

    // lowpass - pan = 0 on a flat pan, so fused = mul + pan
    let (band, _) = io::read_band(&s.output, 1, None).unwrap();
    assert_abs_diff_eq!(band.value(2, 3).unwrap(), 0.55, epsilon = 1e-5);
}

#[test]
fn test_band_order_preserved() {
    let dim = (5, 5);
    let mul: Vec<Array2<f32>> = (1..=8).map(|k| flat(dim, k as f32 * 0.05)).collect();
    let s = scene(flat(dim, 0.1), &mul, None);

    Pansharpener::new(PansharpenConfig::default())
        .run(&s.pan, &s.mul, &s.output)
        .unwrap();

    for k in 1..=8 {
        let (band, _) = io::read_band(&s.output, k, None).unwrap();
        // 5x5 kernel on a 5x5 raster: only the center pixel survives
        assert_eq!(band.invalid_count(), 24);
        assert_abs_diff_eq!(
            band.value(2, 2).unwrap(),
            k as f32 * 0.05 + 0.1,
            epsilon = 1e-5
        );
    }
}

#[test]
fn test_spilled_bands_removed_after_success() {
    let dim = (9, 9);
    let s = scene(flat(dim, 0.5), &[flat(dim, 0.1), flat(dim, 0.2), flat(dim, 0.3)], None);
    let spill_dir = s.dir.path().join("spill");

    let config = PansharpenConfig {
        storage: BandStorage::Spill(spill_dir.clone()),
        ..PansharpenConfig::default()
    };
    let summary = Pansharpener::new(config)
        .run(&s.pan, &s.mul, &s.output)
        .unwrap();

    assert_eq!(summary.band_count, 3);
    assert!(s.output.exists());
    assert_eq!(fs::read_dir(&spill_dir).unwrap().count(), 0);

    let (band, _) = io::read_band(&s.output, 3, None).unwrap();
    assert_abs_diff_eq!(band.value(4, 4).unwrap(), 0.8, epsilon = 1e-5);
}

#[test]
fn test_failed_assembly_keeps_spilled_bands() {
    let dim = (9, 9);
    let s = scene(flat(dim, 0.5), &[flat(dim, 0.1), flat(dim, 0.2)], None);
    let spill_dir = s.dir.path().join("spill");
    let output = s.dir.path().join("missing").join("pansharpened.tif");

    let config = PansharpenConfig {
        storage: BandStorage::Spill(spill_dir.clone()),
        ..PansharpenConfig::default()
    };
    let mut pansharpener = Pansharpener::new(config);
    let err = pansharpener.run(&s.pan, &s.mul, &output).unwrap_err();

    assert_eq!(err.stage(), Some(PipelineStage::Assembling));
    assert!(matches!(err.root_cause(), PansharpenError::AssemblyFailure(_)));
    assert_eq!(pansharpener.stage(), PipelineStage::Failed);
    assert!(!output.exists());
    assert!(spill_dir.join("pansharpened_band1.tif").exists());
    assert!(spill_dir.join("pansharpened_band2.tif").exists());
}

#[test]
fn test_cancelled_run_writes_nothing() {
    let dim = (9, 9);
    let s = scene(flat(dim, 0.5), &[flat(dim, 0.1), flat(dim, 0.2)], None);

    let token = CancellationToken::new();
    token.cancel();
    let mut pansharpener =
        Pansharpener::new(PansharpenConfig::default()).with_cancellation(token);
    let err = pansharpener.run(&s.pan, &s.mul, &s.output).unwrap_err();

    assert!(matches!(err.root_cause(), PansharpenError::Cancelled));
    assert!(matches!(err.stage(), Some(PipelineStage::FusingBand(_))));
    assert!(!s.output.exists());
}

#[test]
fn test_grid_shape_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let pan = dir.path().join("pan.tif");
    let mul = dir.path().join("mul.tif");
    write_fixture(&pan, &[flat((9, 9), 0.5)], None);
    write_fixture(&mul, &[flat((8, 9), 0.1)], None);

    let err = Pansharpener::new(PansharpenConfig::default())
        .run(&pan, &mul, &dir.path().join("out.tif"))
        .unwrap_err();

    // The pan loaded fine; the multispectral grid is what failed
    assert_eq!(err.stage(), Some(PipelineStage::FusingBand(1)));
    assert!(matches!(
        err.root_cause(),
        PansharpenError::ShapeMismatch { .. }
    ));
    assert!(!dir.path().join("out.tif").exists());
}

#[test]
fn test_unreadable_multispectral_is_not_a_pan_failure() {
    let dir = tempfile::tempdir().unwrap();
    let pan = dir.path().join("pan.tif");
    write_fixture(&pan, &[flat((9, 9), 0.5)], None);

    let err = Pansharpener::new(PansharpenConfig::default())
        .run(&pan, &dir.path().join("absent.tif"), &dir.path().join("out.tif"))
        .unwrap_err();

    assert_eq!(err.stage(), Some(PipelineStage::FusingBand(1)));
    assert!(matches!(err.root_cause(), PansharpenError::Gdal(_)));
}

#[test]
fn test_declared_nodata_honored_when_unset() {
    let dim = (11, 11);
    let mut pan = flat(dim, 0.4);
    pan[[5, 5]] = -9999.0;
    let mut mul = flat(dim, 0.1);
    mul[[2, 8]] = -9999.0;
    // Both inputs declare -9999; the run itself names no sentinel
    let s = scene(pan, &[mul], Some(-9999.0));

    let config = PansharpenConfig {
        nodata: None,
        ..PansharpenConfig::default()
    };
    let summary = Pansharpener::new(config)
        .run(&s.pan, &s.mul, &s.output)
        .unwrap();

    let meta = io::read_metadata(&s.output).unwrap();
    assert!(meta.nodata.unwrap().is_nan());

    let (band, _) = io::read_band(&s.output, 1, None).unwrap();
    let mut invalid = 0;
    for row in 0..dim.0 {
        for col in 0..dim.1 {
            let touches_pan = row.abs_diff(5) <= 2 && col.abs_diff(5) <= 2;
            let expected_valid =
                is_interior(row, col, dim, 2) && !touches_pan && (row, col) != (2, 8);
            assert_eq!(band.value(row, col).is_some(), expected_valid, "({}, {})", row, col);
            if expected_valid {
                assert_abs_diff_eq!(band.data()[[row, col]], 0.5, epsilon = 1e-5);
            } else {
                assert!(band.data()[[row, col]].is_nan(), "({}, {})", row, col);
                invalid += 1;
            }
        }
    }
    assert_eq!(summary.invalid_pixels, vec![invalid]);
}
