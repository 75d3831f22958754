//! Geographic calculations

use crate::types::{Coordinates, TourType};

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Road distance coefficient (straight line to road)
const ROAD_COEFFICIENT: f64 = 1.3;

/// Footpath coefficient (straight line to walked path)
const WALK_COEFFICIENT: f64 = 1.2;

/// Average driving speed on the tour roads (Sintra hills, coastal roads)
const AVERAGE_DRIVING_SPEED_KMH: f64 = 40.0;

const AVERAGE_WALKING_SPEED_KMH: f64 = 4.5;

/// Calculate Haversine distance between two points in kilometers
pub fn haversine_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lng - from.lng).to_radians();

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Estimate path length for the given travel mode
pub fn path_distance(from: &Coordinates, to: &Coordinates, mode: TourType) -> f64 {
    let coefficient = match mode {
        TourType::Walking => WALK_COEFFICIENT,
        TourType::Driving => ROAD_COEFFICIENT,
    };
    haversine_distance(from, to) * coefficient
}

/// Estimate travel time in minutes
pub fn travel_time_minutes(from: &Coordinates, to: &Coordinates, mode: TourType) -> f64 {
    let speed = match mode {
        TourType::Walking => AVERAGE_WALKING_SPEED_KMH,
        TourType::Driving => AVERAGE_DRIVING_SPEED_KMH,
    };
    (path_distance(from, to, mode) / speed) * 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lisbon() -> Coordinates {
        Coordinates { lat: 38.7223, lng: -9.1393 }
    }

    fn sintra() -> Coordinates {
        Coordinates { lat: 38.8029, lng: -9.3817 }
    }

    #[test]
    fn test_haversine_lisbon_sintra() {
        let distance = haversine_distance(&lisbon(), &sintra());

        // Lisbon to Sintra is approximately 23 km straight line
        assert!((distance - 23.0).abs() < 2.0, "got {} km", distance);
    }

    #[test]
    fn test_haversine_same_point() {
        let point = lisbon();
        assert!(haversine_distance(&point, &point).abs() < 0.001);
    }

    #[test]
    fn test_path_distance_by_mode() {
        let straight = haversine_distance(&lisbon(), &sintra());
        let road = path_distance(&lisbon(), &sintra(), TourType::Driving);
        let walk = path_distance(&lisbon(), &sintra(), TourType::Walking);

        assert!((road / straight - ROAD_COEFFICIENT).abs() < 0.01);
        assert!((walk / straight - WALK_COEFFICIENT).abs() < 0.01);
    }

    #[test]
    fn test_walking_slower_than_driving() {
        let drive = travel_time_minutes(&lisbon(), &sintra(), TourType::Driving);
        let walk = travel_time_minutes(&lisbon(), &sintra(), TourType::Walking);

        assert!(drive > 30.0 && drive < 60.0, "drive {} min", drive);
        assert!(walk > drive * 5.0);
    }
}
