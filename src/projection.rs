//! Geographic ↔ planar-metric conversion.
//!
//! Planar coordinates are Universal Transverse Mercator on the WGS84
//! ellipsoid, computed with the 6th-order Krüger series (Karney 2011), which
//! round-trips to well below a millimetre anywhere inside a zone.
//!
//! ## Example
//! ```rust
//! use stage_splits::GeoPoint;
//! use stage_splits::projection::UtmZone;
//!
//! let start = GeoPoint::new(-3.7038, 40.4168);
//! let zone = UtmZone::for_point(&start);
//! let planar = zone.to_planar(&start);
//! let back = zone.to_geographic(&planar);
//! assert!((back.longitude - start.longitude).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::GeoPoint;

/// WGS84 semi-major axis (metres)
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM scale factor on the central meridian
const UTM_K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Hemisphere half of a UTM zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hemisphere {
    North,
    South,
}

/// How the hemisphere of a zone is chosen from a point.
///
/// `Longitude` reproduces the historical rule (east of Greenwich is "north").
/// It only moves the false northing, so distances along a route are the same
/// under either rule.
// TODO: switch the default to `Latitude` once stored split distances no longer
// need to match traces processed with the longitude rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HemisphereRule {
    #[default]
    Longitude,
    Latitude,
}

/// A UTM projection zone: number 1-60 plus hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtmZone {
    number: u8,
    hemisphere: Hemisphere,
}

/// A point in metres within a specific UTM zone.
///
/// Only produced by a [`UtmZone`], so the zone always travels with the
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
    zone: UtmZone,
}

impl PlanarPoint {
    /// Zone these coordinates are expressed in.
    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    pub fn coord(&self) -> geo::Coord<f64> {
        geo::Coord {
            x: self.x,
            y: self.y,
        }
    }

    /// Euclidean distance in metres. Both points must share a zone.
    pub fn distance_to(&self, other: &PlanarPoint) -> f64 {
        debug_assert_eq!(self.zone, other.zone);
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl UtmZone {
    /// Build a zone from its number (1-60) and hemisphere.
    pub fn new(number: u8, hemisphere: Hemisphere) -> Option<Self> {
        if (1..=60).contains(&number) {
            Some(Self { number, hemisphere })
        } else {
            None
        }
    }

    /// Select the zone for a point using the historical longitude rule.
    pub fn for_point(point: &GeoPoint) -> Self {
        Self::for_point_with(point, HemisphereRule::Longitude)
    }

    /// Select the zone for a point.
    ///
    /// zone = floor((lon + 180) / 6) mod 60 + 1
    pub fn for_point_with(point: &GeoPoint, rule: HemisphereRule) -> Self {
        let number = (((point.longitude + 180.0) / 6.0).floor() as i64).rem_euclid(60) as u8 + 1;
        let hemisphere = match rule {
            HemisphereRule::Longitude if point.longitude > 0.0 => Hemisphere::North,
            HemisphereRule::Latitude if point.latitude >= 0.0 => Hemisphere::North,
            _ => Hemisphere::South,
        };
        Self { number, hemisphere }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.hemisphere
    }

    /// EPSG code of the WGS84 / UTM definition: 326xx north, 327xx south.
    pub fn epsg(&self) -> u32 {
        let base = match self.hemisphere {
            Hemisphere::North => 32600,
            Hemisphere::South => 32700,
        };
        base + self.number as u32
    }

    /// Longitude of the central meridian in degrees.
    pub fn central_meridian(&self) -> f64 {
        (self.number as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    fn false_northing(&self) -> f64 {
        match self.hemisphere {
            Hemisphere::North => 0.0,
            Hemisphere::South => FALSE_NORTHING_SOUTH,
        }
    }

    /// Wrap metric coordinates already expressed in this zone.
    pub fn planar(&self, x: f64, y: f64) -> PlanarPoint {
        PlanarPoint { x, y, zone: *self }
    }

    /// Project a geographic point into this zone.
    pub fn to_planar(&self, point: &GeoPoint) -> PlanarPoint {
        let k = krueger();
        let e = k.e;

        let phi = point.latitude.to_radians();
        let lambda = wrap_degrees(point.longitude - self.central_meridian()).to_radians();

        let tau = phi.tan();
        let sigma = (e * (e * tau / (1.0 + tau * tau).sqrt()).atanh()).sinh();
        let tau_p = tau * (1.0 + sigma * sigma).sqrt() - sigma * (1.0 + tau * tau).sqrt();

        let cos_l = lambda.cos();
        let xi_p = tau_p.atan2(cos_l);
        let eta_p = (lambda.sin() / (tau_p * tau_p + cos_l * cos_l).sqrt()).asinh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, alpha) in k.alpha.iter().enumerate() {
            let m = 2.0 * (j + 1) as f64;
            xi += alpha * (m * xi_p).sin() * (m * eta_p).cosh();
            eta += alpha * (m * xi_p).cos() * (m * eta_p).sinh();
        }

        PlanarPoint {
            x: UTM_K0 * k.big_a * eta + FALSE_EASTING,
            y: UTM_K0 * k.big_a * xi + self.false_northing(),
            zone: *self,
        }
    }

    /// Inverse of [`UtmZone::to_planar`].
    pub fn to_geographic(&self, point: &PlanarPoint) -> GeoPoint {
        debug_assert_eq!(point.zone, *self);
        let k = krueger();
        let e = k.e;

        let eta = (point.x - FALSE_EASTING) / (UTM_K0 * k.big_a);
        let xi = (point.y - self.false_northing()) / (UTM_K0 * k.big_a);

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, beta) in k.beta.iter().enumerate() {
            let m = 2.0 * (j + 1) as f64;
            xi_p -= beta * (m * xi).sin() * (m * eta).cosh();
            eta_p -= beta * (m * xi).cos() * (m * eta).sinh();
        }

        let sinh_eta_p = eta_p.sinh();
        let sin_xi_p = xi_p.sin();
        let cos_xi_p = xi_p.cos();
        let tau_p = sin_xi_p / (sinh_eta_p * sinh_eta_p + cos_xi_p * cos_xi_p).sqrt();

        // Newton-Raphson for tau given tau'
        let e2 = e * e;
        let mut tau = tau_p;
        for _ in 0..16 {
            let sigma = (e * (e * tau / (1.0 + tau * tau).sqrt()).atanh()).sinh();
            let tau_i = tau * (1.0 + sigma * sigma).sqrt() - sigma * (1.0 + tau * tau).sqrt();
            let delta = (tau_p - tau_i) / (1.0 + tau_i * tau_i).sqrt()
                * (1.0 + (1.0 - e2) * tau * tau)
                / ((1.0 - e2) * (1.0 + tau * tau).sqrt());
            tau += delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }

        let latitude = tau.atan().to_degrees();
        let longitude =
            wrap_degrees(sinh_eta_p.atan2(cos_xi_p).to_degrees() + self.central_meridian());
        GeoPoint::new(longitude, latitude)
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = match self.hemisphere {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
        };
        write!(f, "UTM {}{} (EPSG:{})", self.number, h, self.epsg())
    }
}

/// Ellipsoid-derived series coefficients.
struct Krueger {
    e: f64,
    big_a: f64,
    alpha: [f64; 6],
    beta: [f64; 6],
}

fn krueger() -> Krueger {
    let f = WGS84_F;
    let e = (f * (2.0 - f)).sqrt();
    let n = f / (2.0 - f);
    let n2 = n * n;
    let n3 = n2 * n;
    let n4 = n3 * n;
    let n5 = n4 * n;
    let n6 = n5 * n;

    let big_a = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0 + n6 / 256.0);

    let alpha = [
        n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0 - 127.0 * n5 / 288.0
            + 7891.0 * n6 / 37800.0,
        13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0 + 281.0 * n5 / 630.0
            - 1983433.0 * n6 / 1935360.0,
        61.0 * n3 / 240.0 - 103.0 * n4 / 140.0 + 15061.0 * n5 / 26880.0
            + 167603.0 * n6 / 181440.0,
        49561.0 * n4 / 161280.0 - 179.0 * n5 / 168.0 + 6601661.0 * n6 / 7257600.0,
        34729.0 * n5 / 80640.0 - 3418889.0 * n6 / 1995840.0,
        212378941.0 * n6 / 319334400.0,
    ];

    let beta = [
        n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0 - 81.0 * n5 / 512.0
            + 96199.0 * n6 / 604800.0,
        n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0 + 46.0 * n5 / 105.0
            - 1118711.0 * n6 / 3870720.0,
        17.0 * n3 / 480.0 - 37.0 * n4 / 840.0 - 209.0 * n5 / 4480.0 + 5569.0 * n6 / 90720.0,
        4397.0 * n4 / 161280.0 - 11.0 * n5 / 504.0 - 830251.0 * n6 / 7257600.0,
        4583.0 * n5 / 161280.0 - 108847.0 * n6 / 3991680.0,
        20648693.0 * n6 / 638668800.0,
    ];

    Krueger {
        e,
        big_a,
        alpha,
        beta,
    }
}

/// Wrap a longitude difference into [-180, 180).
fn wrap_degrees(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Metres per degree of latitude, close enough for tolerance conversion.
    const M_PER_DEG: f64 = 111_320.0;

    fn assert_round_trip(p: GeoPoint) {
        let zone = UtmZone::for_point(&p);
        let back = zone.to_geographic(&zone.to_planar(&p));
        let err_lat = (back.latitude - p.latitude).abs() * M_PER_DEG;
        let err_lon =
            (back.longitude - p.longitude).abs() * M_PER_DEG * p.latitude.to_radians().cos();
        assert!(err_lat < 1e-4, "lat error {}m at {:?}", err_lat, p);
        assert!(err_lon < 1e-4, "lon error {}m at {:?}", err_lon, p);
    }

    #[test]
    fn test_zone_number() {
        assert_eq!(UtmZone::for_point(&GeoPoint::new(-180.0, 0.0)).number(), 1);
        assert_eq!(UtmZone::for_point(&GeoPoint::new(-3.7, 40.4)).number(), 30);
        assert_eq!(UtmZone::for_point(&GeoPoint::new(0.0, 51.5)).number(), 31);
        assert_eq!(UtmZone::for_point(&GeoPoint::new(24.9, 60.2)).number(), 35);
        assert_eq!(UtmZone::for_point(&GeoPoint::new(180.0, 0.0)).number(), 1);
    }

    #[test]
    fn test_hemisphere_follows_longitude() {
        // Madrid is in the northern hemisphere but west of Greenwich
        let madrid = UtmZone::for_point(&GeoPoint::new(-3.7, 40.4));
        assert_eq!(madrid.hemisphere(), Hemisphere::South);
        assert_eq!(madrid.epsg(), 32730);

        let helsinki = UtmZone::for_point(&GeoPoint::new(24.9, 60.2));
        assert_eq!(helsinki.epsg(), 32635);

        let by_lat = UtmZone::for_point_with(&GeoPoint::new(-3.7, 40.4), HemisphereRule::Latitude);
        assert_eq!(by_lat.epsg(), 32630);
    }

    #[test]
    fn test_known_projection() {
        // Central meridian on the equator maps to the false origin
        let zone = UtmZone::new(31, Hemisphere::North).unwrap();
        let p = zone.to_planar(&GeoPoint::new(3.0, 0.0));
        assert!((p.x - 500_000.0).abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);

        // 1 degree of latitude on the central meridian, scaled by k0
        let p = zone.to_planar(&GeoPoint::new(3.0, 1.0));
        assert!((p.y - 110_574.389 * UTM_K0).abs() < 0.01, "y = {}", p.y);
    }

    #[test]
    fn test_round_trip() {
        assert_round_trip(GeoPoint::new(-3.7038, 40.4168));
        assert_round_trip(GeoPoint::new(24.9384, 60.1699));
        assert_round_trip(GeoPoint::new(174.7633, -36.8485));
        assert_round_trip(GeoPoint::new(-70.6693, -33.4489));
        assert_round_trip(GeoPoint::new(0.0001, 0.0));
        assert_round_trip(GeoPoint::new(149.1300, -35.2809));
    }

    #[test]
    fn test_hemisphere_does_not_change_distances() {
        let a = GeoPoint::new(-3.70, 40.41);
        let b = GeoPoint::new(-3.69, 40.42);
        let south = UtmZone::new(30, Hemisphere::South).unwrap();
        let north = UtmZone::new(30, Hemisphere::North).unwrap();
        let d_south = south.to_planar(&a).distance_to(&south.to_planar(&b));
        let d_north = north.to_planar(&a).distance_to(&north.to_planar(&b));
        assert!((d_south - d_north).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_zone_number() {
        assert!(UtmZone::new(0, Hemisphere::North).is_none());
        assert!(UtmZone::new(61, Hemisphere::North).is_none());
    }
}
