use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use space_catalog::Catalog;
use space_orbits::OrbitError;

/// A single body's Earth-relative state as of the cache's last refresh.
#[derive(Debug, Clone, Copy)]
pub struct CachedDistance {
    pub distance_km: f64,
    pub latency: Duration,
    pub occluded: bool,
}

/// Snapshot of every catalog body's Earth-relative distance, refreshed on a
/// cadence by the admin loop (§4.9). Request-path code reads from this
/// cache instead of recomputing per connection. Single writer, many
/// readers: a plain `RwLock` is enough at this write frequency (every 60s)
/// without reaching for a lock-free swap structure.
#[derive(Default)]
pub struct DistanceCache {
    entries: RwLock<HashMap<String, CachedDistance>>,
    last_refreshed_unix: RwLock<f64>,
}

impl DistanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes distance, latency, and occlusion for every catalog body
    /// at `now_unix_seconds` and atomically swaps in the new snapshot.
    pub fn refresh(&self, catalog: &Catalog, now_unix_seconds: f64) -> Result<(), OrbitError> {
        let jd = space_orbits::unix_seconds_to_jd(now_unix_seconds);
        let mut fresh = HashMap::with_capacity(catalog.all().len());
        for body in catalog.all() {
            let distance_km = space_orbits::earth_distance_km(catalog, body, jd)?;
            let latency = space_orbits::latency(catalog, body, jd)?;
            let occluded = space_orbits::is_occluded(catalog, body, jd)?;
            fresh.insert(
                body.name.clone(),
                CachedDistance {
                    distance_km,
                    latency,
                    occluded,
                },
            );
        }
        *self.entries.write().expect("distance cache poisoned") = fresh;
        *self.last_refreshed_unix.write().expect("distance cache poisoned") = now_unix_seconds;
        Ok(())
    }

    pub fn get(&self, body_name: &str) -> Option<CachedDistance> {
        self.entries.read().expect("distance cache poisoned").get(body_name).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, CachedDistance> {
        self.entries.read().expect("distance cache poisoned").clone()
    }

    pub fn last_refreshed_unix(&self) -> f64 {
        *self.last_refreshed_unix.read().expect("distance cache poisoned")
    }

    /// Sums latency and ORs occlusion across a hostname-router body chain
    /// (spec: "total latency is the sum... occlusion is the OR").
    pub fn chain_totals(&self, chain: &[String]) -> Option<(Duration, bool, f64)> {
        let entries = self.entries.read().expect("distance cache poisoned");
        let mut total_latency = Duration::ZERO;
        let mut total_distance_km = 0.0;
        let mut any_occluded = false;
        for name in chain {
            let entry = entries.get(name)?;
            total_latency += entry.latency;
            total_distance_km += entry.distance_km;
            any_occluded |= entry.occluded;
        }
        Some((total_latency, any_occluded, total_distance_km))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use space_catalog::{BodyType, CelestialObject, KeplerianElements};

    fn circular_body(name: &str, parent: &str, a_km: f64, mu: Option<f64>) -> CelestialObject {
        CelestialObject {
            name: name.to_string(),
            body_type: BodyType::Planet,
            parent: parent.to_string(),
            radius_km: None,
            bandwidth_bps: None,
            mu_km3_s2: mu,
            elements: KeplerianElements {
                semi_major_axis_km: a_km,
                eccentricity: 0.0,
                inclination_deg: 0.0,
                longitude_of_ascending_node_deg: 0.0,
                argument_of_perihelion_deg: 0.0,
                mean_anomaly_at_epoch_deg: 0.0,
                epoch_jd: 2_451_545.0,
            },
        }
    }

    fn catalog() -> Catalog {
        Catalog::from_objects(vec![
            circular_body("sun", "", 1.0, Some(1.327_124_400_18e11)),
            circular_body("earth", "sun", 1.496e8, None),
            circular_body("mars", "sun", 2.279e8, None),
        ])
        .unwrap()
    }

    #[test]
    fn refresh_populates_every_body_including_earth_at_zero() {
        let cache = DistanceCache::new();
        let catalog = catalog();
        cache.refresh(&catalog, 1_700_000_000.0).unwrap();
        let earth = cache.get("earth").unwrap();
        assert_eq!(earth.distance_km, 0.0);
        assert!(cache.get("mars").is_some());
        assert!(cache.last_refreshed_unix() > 0.0);
    }

    #[test]
    fn chain_totals_sums_latency_across_bodies() {
        let cache = DistanceCache::new();
        let catalog = catalog();
        cache.refresh(&catalog, 1_700_000_000.0).unwrap();
        let mars_only = cache.chain_totals(&["mars".to_string()]).unwrap();
        let doubled = cache
            .chain_totals(&["mars".to_string(), "mars".to_string()])
            .unwrap();
        assert!((doubled.0.as_secs_f64() - mars_only.0.as_secs_f64() * 2.0).abs() < 1e-6);
    }

    #[test]
    fn chain_totals_is_none_for_unknown_body() {
        let cache = DistanceCache::new();
        let catalog = catalog();
        cache.refresh(&catalog, 1_700_000_000.0).unwrap();
        assert!(cache.chain_totals(&["pluto".to_string()]).is_none());
    }
}
