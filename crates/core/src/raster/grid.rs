//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in row-major order together with
/// the affine transform, CRS and optional no-data value of the grid.
///
/// # Example
///
/// ```ignore
/// use seepwatch_core::Raster;
///
/// let mut band: Raster<f64> = Raster::new(100, 100);
/// band.set(10, 20, 0.42)?;
/// let value = band.get(10, 20)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Wrap `data` in a raster sharing this raster's georeferencing.
    ///
    /// Fails if `data` does not have this raster's shape.
    pub fn derive<U: RasterElement>(&self, data: Array2<U>) -> Result<Raster<U>> {
        if data.dim() != self.shape() {
            return Err(Error::shape_mismatch("derived raster", self.shape(), data.dim()));
        }
        Ok(Raster {
            data,
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        })
    }

    /// Create a raster with the same dimensions and metadata, filled with a value
    pub fn like(&self, fill_value: T) -> Self {
        Self {
            data: Array2::from_elem(self.data.dim(), fill_value),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fail with [`Error::ShapeMismatch`] unless `other` has the same shape.
    pub fn ensure_same_shape<U: RasterElement>(
        &self,
        other: &Raster<U>,
        context: &'static str,
    ) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::shape_mismatch(context, self.shape(), other.shape()));
        }
        Ok(())
    }

    /// Ensure `other` covers the same ground pixels as `self`.
    ///
    /// Shapes must match, the transforms must agree to within a hundredth of
    /// a pixel, and the CRSs must be equivalent when both are known.
    pub fn ensure_same_grid<U: RasterElement>(
        &self,
        other: &Raster<U>,
        context: &'static str,
    ) -> Result<()> {
        self.ensure_same_shape(other, context)?;

        if let (Some(a), Some(b)) = (self.crs(), other.crs()) {
            if !a.is_equivalent(b) {
                return Err(Error::MaskAlignment(format!(
                    "{}: CRS {} does not match {}",
                    context,
                    a.identifier(),
                    b.identifier()
                )));
            }
        }

        let (a, b) = (self.transform, other.transform);
        let tol = 0.01 * a.pixel_width.abs().max(a.pixel_height.abs());
        let close = |x: f64, y: f64| (x - y).abs() <= tol;
        let aligned = close(a.origin_x, b.origin_x)
            && close(a.origin_y, b.origin_y)
            && close(a.pixel_width, b.pixel_width)
            && close(a.pixel_height, b.pixel_height)
            && close(a.row_rotation, b.row_rotation)
            && close(a.col_rotation, b.col_rotation);
        if !aligned {
            return Err(Error::MaskAlignment(format!(
                "{}: grids are offset (origin {:.3},{:.3} vs {:.3},{:.3}, pixel {} vs {})",
                context,
                a.origin_x,
                a.origin_y,
                b.origin_x,
                b.origin_y,
                a.pixel_width,
                b.pixel_width
            )));
        }
        Ok(())
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Consume the raster and return the underlying array
    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Convert pixel coordinates to map coordinates (pixel center)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    // Statistics

    /// Basic statistics (min, max, mean, count of valid cells)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum = 0.0;
        let mut count = 0usize;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }

            if min.is_none_or(|m| value < m) {
                min = Some(value);
            }
            if max.is_none_or(|m| value > m) {
                max = Some(value);
            }

            if let Some(v) = num_traits::cast::<T, f64>(value) {
                sum += v;
                count += 1;
            }
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f64> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        raster.set(5, 5, 0.42).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 0.42);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_statistics_skip_nan() {
        let mut raster: Raster<f64> = Raster::filled(4, 4, 0.5);
        raster.set(0, 0, f64::NAN).unwrap();
        raster.set(1, 1, -0.5).unwrap();

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(-0.5));
        assert_eq!(stats.max, Some(0.5));
        assert_eq!(stats.valid_count, 15);
        assert_eq!(stats.nodata_count, 1);
    }

    #[test]
    fn test_derive_keeps_georeferencing() {
        let mut raster: Raster<f64> = Raster::new(3, 4);
        raster.set_transform(GeoTransform::new(500.0, 900.0, 10.0, -10.0));
        raster.set_crs(Some(CRS::from_epsg(32630)));

        let mask = raster.derive(Array2::<u8>::ones((3, 4))).unwrap();
        assert_eq!(mask.transform(), raster.transform());
        assert_eq!(mask.crs().and_then(CRS::epsg), Some(32630));

        assert!(raster.derive(Array2::<u8>::ones((3, 5))).is_err());
    }

    #[test]
    fn test_shape_check() {
        let a: Raster<f64> = Raster::new(5, 5);
        let b: Raster<f64> = Raster::new(5, 6);
        let err = a.ensure_same_shape(&b, "test").unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { ac: 6, .. }));
    }

    #[test]
    fn test_grid_check() {
        let mut a: Raster<f64> = Raster::new(5, 5);
        a.set_transform(GeoTransform::new(500_000.0, 4_500_000.0, 10.0, -10.0));
        a.set_crs(Some(CRS::from_epsg(32630)));
        let mut b = a.clone();
        b.set_transform(GeoTransform::new(500_000.05, 4_500_000.0, 10.0, -10.0));
        assert!(a.ensure_same_grid(&b, "test").is_ok());

        // Same shape, neighbouring tile
        let mut shifted = a.clone();
        shifted.set_transform(GeoTransform::new(550_000.0, 4_500_000.0, 10.0, -10.0));
        let err = a.ensure_same_grid(&shifted, "test").unwrap_err();
        assert!(matches!(err, Error::MaskAlignment(_)));

        let mut other_zone = a.clone();
        other_zone.set_crs(Some(CRS::from_epsg(32631)));
        let err = a.ensure_same_grid(&other_zone, "test").unwrap_err();
        assert!(matches!(err, Error::MaskAlignment(_)));

        let mut unknown = a.clone();
        unknown.set_crs(None);
        assert!(a.ensure_same_grid(&unknown, "test").is_ok());
    }
}
