//! Area of interest around a pipeline corridor

use crate::crs::{self, CRS, Projection, UtmZone};
use crate::error::{Error, Result};
use geo::{Area, BoundingRect, Centroid, Validation};
use geo_types::{Coord, LineString, Polygon, Rect};

/// The buffered pipeline corridor: a single non-empty, non-self-intersecting
/// polygon together with the CRS its coordinates are expressed in.
///
/// Constructed once per run and shared read-only by masking and clustering.
#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    polygon: Polygon<f64>,
    crs: CRS,
}

impl AreaOfInterest {
    /// Wrap `polygon`, failing with [`Error::InvalidGeometry`] when it is
    /// empty, degenerate or self-intersecting.
    pub fn new(polygon: Polygon<f64>, crs: CRS) -> Result<Self> {
        validate_polygon(&polygon)?;
        Ok(Self { polygon, crs })
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn crs(&self) -> &CRS {
        &self.crs
    }

    /// Axis-aligned bounds in the AOI's own CRS
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        self.polygon.bounding_rect()
    }

    /// Area in square metres.
    ///
    /// Geographic AOIs are measured in the UTM zone of their centroid.
    pub fn area_m2(&self) -> f64 {
        match self.crs.projection() {
            Some(Projection::Geographic) => {
                let Some(c) = self.polygon.centroid() else {
                    return 0.0;
                };
                let zone = UtmZone::for_lon_lat(c.x(), c.y());
                map_polygon(&self.polygon, |x, y| zone.forward(x, y)).unsigned_area()
            }
            _ => self.polygon.unsigned_area(),
        }
    }

    /// Express the AOI in `target`.
    ///
    /// Returns `None` when no transformation between the two CRSs is available.
    pub fn reproject(&self, target: &CRS) -> Option<AreaOfInterest> {
        if self.crs.is_equivalent(target) {
            return Some(self.clone());
        }
        let f = crs::transformer(&self.crs, target)?;
        Some(AreaOfInterest {
            polygon: map_polygon(&self.polygon, f),
            crs: target.clone(),
        })
    }
}

/// Apply a point transformation to every vertex of a polygon.
pub fn map_polygon<F>(polygon: &Polygon<f64>, f: F) -> Polygon<f64>
where
    F: Fn(f64, f64) -> (f64, f64),
{
    let map_ring = |ring: &LineString<f64>| -> LineString<f64> {
        ring.coords()
            .map(|c| {
                let (x, y) = f(c.x, c.y);
                Coord { x, y }
            })
            .collect()
    };
    Polygon::new(
        map_ring(polygon.exterior()),
        polygon.interiors().iter().map(map_ring).collect(),
    )
}

/// Check that a polygon is usable as a corridor: finite coordinates,
/// positive area and no ring crossing itself.
pub fn validate_polygon(polygon: &Polygon<f64>) -> Result<()> {
    let exterior = polygon.exterior();
    if exterior.0.len() < 4 {
        return Err(Error::InvalidGeometry(
            "polygon exterior has fewer than 3 distinct vertices".into(),
        ));
    }
    if polygon
        .exterior()
        .coords()
        .chain(polygon.interiors().iter().flat_map(|r| r.coords()))
        .any(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Err(Error::InvalidGeometry("polygon has non-finite coordinates".into()));
    }
    if polygon.unsigned_area() <= 0.0 {
        return Err(Error::InvalidGeometry("polygon has zero area".into()));
    }
    if !polygon.is_valid() {
        return Err(Error::InvalidGeometry(
            "polygon ring self-intersects or rings overlap".into(),
        ));
    }
    Ok(())
}
