// Spherical mercator (EPSG:3857) <-> geographic (WGS84) coordinate math.
//
// The reprojected shapefiles carry their bounding box in web mercator
// metres; regionMapping entries need it in degrees.

use std::f64::consts::PI;

/// Earth radius used by the EPSG:3857 spherical mercator projection, in metres.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Maximum latitude representable in web mercator.
pub const MERCATOR_LAT_LIMIT: f64 = 85.0511;

/// Convert a web mercator X coordinate (metres) to longitude (degrees).
pub fn mercator_x_to_lon(x: f64) -> f64 {
    (x / EARTH_RADIUS).to_degrees()
}

/// Convert a web mercator Y coordinate (metres) to latitude (degrees).
pub fn mercator_y_to_lat(y: f64) -> f64 {
    (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees()
}

/// Convert a `[west, south, east, north]` bounding box from web mercator
/// metres to WGS84 degrees.
pub fn mercator_bbox_to_wgs84(bbox: [f64; 4]) -> [f64; 4] {
    [
        mercator_x_to_lon(bbox[0]),
        mercator_y_to_lat(bbox[1]),
        mercator_x_to_lon(bbox[2]),
        mercator_y_to_lat(bbox[3]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_origin_maps_to_origin() {
        assert!(close(mercator_x_to_lon(0.0), 0.0));
        assert!(close(mercator_y_to_lat(0.0), 0.0));
    }

    #[test]
    fn test_antimeridian() {
        // 20037508.34m is the mercator extent edge
        assert!(close(mercator_x_to_lon(20_037_508.342_789_244), 180.0));
        assert!(close(mercator_x_to_lon(-20_037_508.342_789_244), -180.0));
    }

    #[test]
    fn test_mercator_latitude_limit() {
        // The projection edge corresponds to +/-85.0511 degrees
        assert!(close(
            mercator_y_to_lat(20_037_508.342_789_244),
            MERCATOR_LAT_LIMIT
        ));
    }

    #[test]
    fn test_bbox_conversion_is_componentwise() {
        let bbox = mercator_bbox_to_wgs84([0.0, 0.0, 20_037_508.342_789_244, 0.0]);
        assert!(close(bbox[0], 0.0));
        assert!(close(bbox[2], 180.0));
    }
}
