use crate::error::{PansharpenError, Result};
use crate::raster::Band;
use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, RasterBand};
use gdal::{Dataset, DriverManager, Metadata};
use log::{debug, info};
use ndarray::Array2;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub nodata: Option<f64>,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl RasterMetadata {
    /// (rows, cols), the shape of every band array
    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Bounding box and resolution as `[minx, miny, maxx, maxy, resx, resy]`
    pub fn bbox(&self) -> [f64; 6] {
        let res_x = self.geotransform[1];
        let res_y = self.geotransform[5];
        // ulx, uly is the upper left corner, lrx, lry the lower right
        let ulx = self.geotransform[0];
        let uly = self.geotransform[3];
        let lrx = ulx + self.width as f64 * res_x;
        let lry = uly + self.height as f64 * res_y;

        [ulx, lry, lrx, uly, res_x, res_y]
    }

    /// Same geotransform, within a tolerance of 1e-9 per coefficient
    pub fn same_geotransform(&self, other: &RasterMetadata) -> bool {
        self.geotransform
            .iter()
            .zip(other.geotransform.iter())
            .all(|(a, b)| (a - b).abs() <= 1e-9)
    }
}

/// Extract metadata from a dataset without reading any samples
pub fn extract_metadata_from_dataset(dataset: &Dataset) -> Result<RasterMetadata> {
    let band_count = dataset.raster_count() as usize;
    if band_count == 0 {
        return Err(PansharpenError::NoBands);
    }

    let rasterband: RasterBand = dataset.rasterband(1)?;

    let width = rasterband.x_size() as usize;
    let height = rasterband.y_size() as usize;

    if width == 0 || height == 0 {
        return Err(PansharpenError::InvalidDimensions(width, height));
    }

    let nodata = rasterband.no_data_value();
    let geotransform = dataset.geo_transform()?;

    Ok(RasterMetadata {
        width,
        height,
        band_count,
        geotransform,
        projection: dataset.projection(),
        nodata,
        pixel_width: geotransform[1].abs(),
        pixel_height: geotransform[5].abs(),
    })
}

pub fn read_metadata(path: &Path) -> Result<RasterMetadata> {
    let dataset = Dataset::open(path)?;
    extract_metadata_from_dataset(&dataset)
}

/// Read one band (1-based) as Float32. Pixels equal to `nodata`, or to the
/// band's declared no-data value when `nodata` is None, become invalid, as do NaNs.
pub fn read_band(
    path: &Path,
    band_index: usize,
    nodata: Option<f64>,
) -> Result<(Band, RasterMetadata)> {
    debug!("Reading band {} of {}", band_index, path.display());
    let dataset = Dataset::open(path)?;
    let metadata = extract_metadata_from_dataset(&dataset)?;

    if band_index == 0 || band_index > metadata.band_count {
        return Err(PansharpenError::InvalidBandIndex(
            band_index,
            metadata.band_count,
        ));
    }

    let rasterband = dataset.rasterband(band_index)?;
    let (width, height) = (metadata.width, metadata.height);

    let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
    let data_vec: Vec<f32> = buffer.into_iter().collect();
    let data = Array2::from_shape_vec((height, width), data_vec)?;

    let sentinel = nodata.or_else(|| rasterband.no_data_value());
    Ok((Band::from_samples(data, sentinel), metadata))
}

/// Create an output GTiff with Float32 bands, georeferenced like `metadata`
pub fn create_output_dataset(
    path: &Path,
    metadata: &RasterMetadata,
    num_bands: usize,
    options: &[String],
) -> Result<Dataset> {
    info!("Creating output dataset: {}", path.display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let mut dataset = if options.is_empty() {
        driver.create_with_band_type::<f32, _>(path, metadata.width, metadata.height, num_bands)?
    } else {
        let mut gdal_options = CslStringList::new();
        for opt in options {
            gdal_options.add_string(opt)?;
        }

        driver.create_with_band_type_with_options::<f32, _>(
            path,
            metadata.width,
            metadata.height,
            num_bands,
            &gdal_options,
        )?
    };

    dataset.set_geo_transform(&metadata.geotransform)?;
    dataset.set_projection(&metadata.projection)?;

    Ok(dataset)
}

/// Write an already-encoded band array into band `band_index` (1-based)
pub fn write_band(
    dataset: &mut Dataset,
    band_index: usize,
    data: &Array2<f32>,
    nodata: Option<f64>,
    description: &str,
) -> Result<()> {
    let mut raster_band = dataset.rasterband(band_index)?;
    let (height, width) = data.dim();

    // GDAL expects row-major order, which is how a standard-layout Array2 iterates
    let mut buffer = Buffer::new((width, height), data.iter().copied().collect());
    raster_band.write((0, 0), (width, height), &mut buffer)?;

    raster_band.set_description(description)?;
    raster_band.set_no_data_value(Some(nodata.unwrap_or(f64::NAN)))?;

    debug!("Wrote band {} ({}x{})", band_index, width, height);
    Ok(())
}

/// Persist a single band on its own, invalid pixels as NaN
pub fn write_single_band(
    path: &Path,
    band: &Band,
    metadata: &RasterMetadata,
    options: &[String],
) -> Result<()> {
    let mut dataset = create_output_dataset(path, metadata, 1, options)?;
    write_band(&mut dataset, 1, &band.encoded(None), None, "fused")?;
    Ok(())
}

/// GDAL's `.aux.xml` sidecar that may be written next to `path`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".aux.xml");
    PathBuf::from(name)
}
