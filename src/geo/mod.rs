use crate::config::PricingRules;
use crate::models::location::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().atan2((1.0 - haversine).sqrt());

    EARTH_RADIUS_KM * central_angle
}

pub fn distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    haversine_km(
        &GeoPoint {
            lat: lat1,
            lng: lng1,
        },
        &GeoPoint {
            lat: lat2,
            lng: lng2,
        },
    )
}

/// Locally computed delivery price, used when the courier's pricing
/// endpoint cannot be reached.
pub fn fallback_cost(
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
    weight_kg: f64,
    pricing: &PricingRules,
) -> f64 {
    let distance_cost = haversine_km(pickup, dropoff) * pricing.per_km_rate;
    let weight_cost = weight_kg * pricing.per_kg_rate;

    (pricing.base_fee + distance_cost + weight_cost).round()
}

pub fn format_duration(minutes: u32) -> String {
    if minutes < 60 {
        return format!("{minutes} mins");
    }

    format!("{}h {}m", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::{distance, fallback_cost, format_duration, haversine_km};
    use crate::config::PricingRules;
    use crate::models::location::GeoPoint;

    fn rules() -> PricingRules {
        PricingRules {
            base_fee: 50.0,
            per_km_rate: 5.0,
            per_kg_rate: 10.0,
            free_delivery_above: 500.0,
        }
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 28.6139,
            lng: 77.2090,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let there = distance(28.6139, 77.2090, 19.0760, 72.8777);
        let back = distance(19.0760, 72.8777, 28.6139, 77.2090);
        assert!((there - back).abs() < 1e-6);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn fallback_cost_never_drops_with_distance_or_weight() {
        let store = GeoPoint {
            lat: 28.6139,
            lng: 77.2090,
        };
        let near = GeoPoint {
            lat: 28.62,
            lng: 77.21,
        };
        let far = GeoPoint {
            lat: 28.75,
            lng: 77.05,
        };

        let near_cost = fallback_cost(&store, &near, 1.0, &rules());
        let far_cost = fallback_cost(&store, &far, 1.0, &rules());
        assert!(far_cost >= near_cost);

        let mut previous = 0.0;
        for weight in [0.0, 0.5, 1.0, 2.5, 10.0] {
            let cost = fallback_cost(&store, &near, weight, &rules());
            assert!(cost >= previous);
            previous = cost;
        }
    }

    #[test]
    fn fallback_cost_at_the_store_is_base_plus_weight() {
        let store = GeoPoint {
            lat: 28.6139,
            lng: 77.2090,
        };
        assert_eq!(fallback_cost(&store, &store, 1.0, &rules()), 60.0);
    }

    #[test]
    fn durations_under_an_hour_are_minutes() {
        assert_eq!(format_duration(45), "45 mins");
        assert_eq!(format_duration(0), "0 mins");
    }

    #[test]
    fn durations_of_an_hour_or_more_split_hours_and_minutes() {
        assert_eq!(format_duration(60), "1h 0m");
        assert_eq!(format_duration(90), "1h 30m");
        assert_eq!(format_duration(135), "2h 15m");
    }
}
