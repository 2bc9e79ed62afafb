//! Great-circle geometry on a spherical Earth (R = 6371 km).

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance between two points in kilometers (haversine).
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());

    let half_dlat = (lat2 - lat1) / 2.0;
    let half_dlon = (lon2 - lon1) / 2.0;

    let a = half_dlat.sin().powi(2);
    let b = half_dlon.sin().powi(2);
    let c = (a + b * lat1.cos() * lat2.cos()).sqrt();

    2.0 * EARTH_RADIUS_KM * c.asin()
}

/// Initial bearing from the first point towards the second, in degrees in
/// the `(-180°, 180°]` range (0° = north, 90° = east).
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();

    let x = dlon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    x.atan2(y).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine(52.23, 21.01, 52.23, 21.01).abs() < 1e-9);
    }

    #[test]
    fn haversine_short_hop_is_meters() {
        // Roughly 6–7 m of longitude at Warsaw's latitude.
        let d = haversine(52.2300, 21.0100, 52.2300, 21.0101);
        assert!(d > 0.004 && d < 0.02, "distance was {d} km");
    }

    #[test]
    fn haversine_known_pair() {
        // Warsaw city center to Chopin airport is about 8 km.
        let d = haversine(52.2297, 21.0122, 52.1672, 21.0461);
        assert!((d - 7.4).abs() < 1.0, "distance was {d} km");
    }

    #[test]
    fn bearing_cardinal_directions() {
        // Due north.
        let north = initial_bearing(52.0, 21.0, 53.0, 21.0);
        assert!(north.abs() < 1e-6, "north bearing was {north}");

        // Due east (at small offsets the meridian convergence is negligible).
        let east = initial_bearing(52.0, 21.0, 52.0, 21.001);
        assert!((east - 90.0).abs() < 0.01, "east bearing was {east}");

        // Due south.
        let south = initial_bearing(52.0, 21.0, 51.0, 21.0);
        assert!((south - 180.0).abs() < 1e-6, "south bearing was {south}");

        // Due west comes out negative.
        let west = initial_bearing(52.0, 21.0, 52.0, 20.999);
        assert!((west + 90.0).abs() < 0.01, "west bearing was {west}");
    }

    #[test]
    fn bearing_stays_in_half_open_range() {
        for (lat, lon) in [(53.0, 21.0), (52.0, 22.0), (51.0, 21.0), (52.0, 20.0), (51.5, 20.5)] {
            let b = initial_bearing(52.0, 21.0, lat, lon);
            assert!(b > -180.0 && b <= 180.0, "bearing {b} out of range");
        }
    }
}
