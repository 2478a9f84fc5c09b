//! Coordinate Reference System handling

mod utm;

pub use utm::UtmZone;

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG codes of the geographic (degree based) systems we accept as WGS84
/// equivalents. NAD83/ETRS89/SIRGAS differ from WGS84 by well under a
/// Sentinel-2 pixel.
const GEOGRAPHIC_EPSG: [u32; 4] = [4326, 4258, 4269, 4674];

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// WKT representation, kept for display when no EPSG code is known
    wkt: Option<String>,
}

/// A projection SeepWatch can evaluate without external libraries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Longitude/latitude in degrees on the WGS84 datum
    Geographic,
    /// A UTM zone on the WGS84 datum
    Utm(UtmZone),
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// Parse the identifiers found in GeoJSON `crs` members and STAC metadata:
    /// `"EPSG:32630"`, `"urn:ogc:def:crs:EPSG::32630"`,
    /// `"urn:ogc:def:crs:OGC:1.3:CRS84"`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.ends_with("CRS84") {
            return Some(Self::wgs84());
        }
        let code = name.rsplit(':').next()?;
        code.parse::<u32>().ok().map(Self::from_epsg)
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        self.epsg.is_some_and(|c| GEOGRAPHIC_EPSG.contains(&c))
    }

    /// The projection behind this CRS, if it is one we can evaluate
    pub fn projection(&self) -> Option<Projection> {
        if self.is_geographic() {
            return Some(Projection::Geographic);
        }
        self.epsg.and_then(UtmZone::from_epsg).map(Projection::Utm)
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b || (self.is_geographic() && other.is_geographic());
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", wkt.chars().take(50).collect::<String>());
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

/// Point transformation between two supported projections.
///
/// Returns `None` when either side is outside the geographic/UTM family.
pub fn transformer(from: &CRS, to: &CRS) -> Option<impl Fn(f64, f64) -> (f64, f64) + use<>> {
    let src = from.projection()?;
    let dst = to.projection()?;

    Some(move |x: f64, y: f64| {
        let (lon, lat) = match src {
            Projection::Geographic => (x, y),
            Projection::Utm(zone) => zone.inverse(x, y),
        };
        match dst {
            Projection::Geographic => (lon, lat),
            Projection::Utm(zone) => zone.forward(lon, lat),
        }
    })
}
