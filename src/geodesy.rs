//! Great-circle helpers for short, single-session distances.

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in metres.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Forward azimuth from point 1 to point 2, degrees in [0, 360).
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let y = d_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * d_lon.cos();
    let bearing = y.atan2(x).to_degrees();
    normalize_degrees(bearing)
}

/// Wrap any angle into [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Absolute circular difference between two bearings, in [0, 180].
pub fn angle_delta(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Move `(lat, lon)` by `meters` along `bearing_deg`. Flat-earth step, fine for
/// the few hundred metres a track buffer spans.
pub fn offset(lat: f64, lon: f64, bearing_deg: f64, meters: f64) -> (f64, f64) {
    let north = meters * bearing_deg.to_radians().cos();
    let east = meters * bearing_deg.to_radians().sin();
    let d_lat = (north / EARTH_RADIUS_M).to_degrees();
    let d_lon = (east / (EARTH_RADIUS_M * lat.to_radians().cos())).to_degrees();
    (lat + d_lat, lon + d_lon)
}
