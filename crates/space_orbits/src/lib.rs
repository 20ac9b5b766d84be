//! Orbital mechanics engine: Kepler solve, ecliptic position, Earth-relative
//! distance/latency, and the Sun-occlusion line-of-sight check.
//!
//! Positions are osculating-Keplerian approximations (good to <1% for this
//! use, per design), evaluated in the heliocentric J2000 ecliptic frame.
//! Time is represented as a Julian Date (TDB treated as UTC — the
//! difference is well under our accuracy budget).

use std::time::Duration;

use space_catalog::{Catalog, CelestialObject};
use space_core::constants::{AU_KM, SPEED_OF_LIGHT_KM_S, SUN_RADIUS_KM};
use space_core::vector::{self, Vector3};
use thiserror::Error;

/// Julian Date of the Unix epoch (1970-01-01T00:00:00 UTC).
pub const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Occlusion margin multiplier applied to the Sun's radius (§9: "Sun
/// radius + 10%, so grazing geometries fail closed").
pub const OCCLUSION_MARGIN_FACTOR: f64 = 1.1;

const KEPLER_TOLERANCE_RAD: f64 = 1e-10;
const KEPLER_MAX_ITERATIONS: u32 = 30;

/// Errors raised while evaluating the orbital engine.
#[derive(Debug, Error)]
pub enum OrbitError {
    #[error("body `{0}` not found in catalog")]
    UnknownBody(String),
    #[error("body `{name}` orbits `{parent}`, which has no mu_km3_s2 in the catalog")]
    MissingMu { name: String, parent: String },
    #[error("Kepler solver did not converge for body `{0}` within {1} iterations")]
    KeplerDidNotConverge(String, u32),
}

/// Convert a Unix timestamp (seconds since 1970-01-01T00:00:00 UTC) to a
/// Julian Date.
#[inline]
pub fn unix_seconds_to_jd(unix_seconds: f64) -> f64 {
    UNIX_EPOCH_JD + unix_seconds / 86_400.0
}

/// Wrap an angle (radians) into `[0, 2*PI)`.
fn normalize_angle(angle: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let wrapped = angle % two_pi;
    if wrapped < 0.0 {
        wrapped + two_pi
    } else {
        wrapped
    }
}

/// Solve Kepler's equation `M = E - e*sin(E)` for the eccentric anomaly `E`
/// via Newton-Raphson iteration. Converges when `|delta_E| < 1e-10` rad or
/// bails out after 30 iterations.
pub fn solve_kepler(mean_anomaly_rad: f64, eccentricity: f64) -> Option<f64> {
    let m = normalize_angle(mean_anomaly_rad);
    let mut e = if eccentricity < 0.8 { m } else { std::f64::consts::PI };
    for _ in 0..KEPLER_MAX_ITERATIONS {
        let f = e - eccentricity * e.sin() - m;
        let f_prime = 1.0 - eccentricity * e.cos();
        let delta = f / f_prime;
        e -= delta;
        if delta.abs() < KEPLER_TOLERANCE_RAD {
            return Some(e);
        }
    }
    None
}

/// True anomaly ν from eccentric anomaly `E` and eccentricity `e`.
fn true_anomaly(eccentric_anomaly_rad: f64, eccentricity: f64) -> f64 {
    let half = eccentric_anomaly_rad / 2.0;
    2.0 * ((1.0 + eccentricity).sqrt() * half.sin())
        .atan2((1.0 - eccentricity).sqrt() * half.cos())
}

/// Rotate a perifocal-frame position `(x, y, 0)` into the ecliptic frame by
/// argument of perihelion `ω`, inclination `i`, and longitude of ascending
/// node `Ω` (all radians): the classic 3-1-3 Euler rotation.
fn perifocal_to_ecliptic(x: f64, y: f64, argp: f64, inclination: f64, raan: f64) -> Vector3 {
    let (sin_argp, cos_argp) = argp.sin_cos();
    let (sin_inc, cos_inc) = inclination.sin_cos();
    let (sin_raan, cos_raan) = raan.sin_cos();

    let px = (cos_raan * cos_argp - sin_raan * sin_argp * cos_inc) * x
        + (-cos_raan * sin_argp - sin_raan * cos_argp * cos_inc) * y;
    let py = (sin_raan * cos_argp + cos_raan * sin_argp * cos_inc) * x
        + (-sin_raan * sin_argp + cos_raan * cos_argp * cos_inc) * y;
    let pz = (sin_argp * sin_inc) * x + (cos_argp * sin_inc) * y;

    [px, py, pz]
}

/// Heliocentric J2000-ecliptic position of `body` at Julian Date `jd`,
/// composed recursively through its parent chain (moons add their parent
/// planet's heliocentric position).
pub fn position_at(catalog: &Catalog, body: &CelestialObject, jd: f64) -> Result<Vector3, OrbitError> {
    if body.parent.is_empty() {
        // The Sun itself: origin of the heliocentric frame.
        return Ok([0.0, 0.0, 0.0]);
    }

    let parent = catalog
        .lookup(&body.parent)
        .ok_or_else(|| OrbitError::UnknownBody(body.parent.clone()))?;
    let mu = parent.mu_km3_s2.ok_or_else(|| OrbitError::MissingMu {
        name: body.name.clone(),
        parent: parent.name.clone(),
    })?;

    let el = &body.elements;
    let a = el.semi_major_axis_km;
    let e = el.eccentricity;
    let n = (mu / (a * a * a)).sqrt(); // rad/s

    let dt_seconds = (jd - el.epoch_jd) * 86_400.0;
    let m0 = el.mean_anomaly_at_epoch_deg.to_radians();
    let mean_anomaly = m0 + n * dt_seconds;

    let eccentric_anomaly = solve_kepler(mean_anomaly, e)
        .ok_or_else(|| OrbitError::KeplerDidNotConverge(body.name.clone(), KEPLER_MAX_ITERATIONS))?;

    let nu = true_anomaly(eccentric_anomaly, e);
    let r = a * (1.0 - e * eccentric_anomaly.cos());
    let (x, y) = (r * nu.cos(), r * nu.sin());

    let relative = perifocal_to_ecliptic(
        x,
        y,
        el.argument_of_perihelion_deg.to_radians(),
        el.inclination_deg.to_radians(),
        el.longitude_of_ascending_node_deg.to_radians(),
    );

    let parent_position = position_at(catalog, parent, jd)?;
    Ok(vector::add(&relative, &parent_position))
}

/// Euclidean distance (km) between `body` and Earth at Julian Date `jd`.
pub fn earth_distance_km(catalog: &Catalog, body: &CelestialObject, jd: f64) -> Result<f64, OrbitError> {
    let earth = catalog
        .lookup("earth")
        .ok_or_else(|| OrbitError::UnknownBody("earth".to_string()))?;
    if body.name == earth.name {
        return Ok(0.0);
    }
    let body_pos = position_at(catalog, body, jd)?;
    let earth_pos = position_at(catalog, earth, jd)?;
    Ok(vector::norm(&vector::sub(&body_pos, &earth_pos)))
}

/// One-way light-travel delay between Earth and `body` at Julian Date `jd`.
pub fn latency(catalog: &Catalog, body: &CelestialObject, jd: f64) -> Result<Duration, OrbitError> {
    let distance_km = earth_distance_km(catalog, body, jd)?;
    Ok(Duration::from_secs_f64(distance_km / SPEED_OF_LIGHT_KM_S))
}

/// Simulated bandwidth ceiling (bits/sec) for a given Earth-relative
/// distance, scaling the baseline by `(1 AU / distance)^2` (§9). A body's
/// own `bandwidth_bps` catalog override, if present, always wins.
pub fn bandwidth_bps(body: &CelestialObject, baseline_bps: f64, distance_km: f64) -> f64 {
    if let Some(override_bps) = body.bandwidth_bps {
        return override_bps;
    }
    if distance_km <= 0.0 {
        return baseline_bps;
    }
    baseline_bps * (AU_KM / distance_km).powi(2)
}

/// Whether the Sun's disc intersects the Earth-to-`body` line segment at
/// Julian Date `jd`. The Sun is assumed fixed at the heliocentric origin.
pub fn is_occluded(catalog: &Catalog, body: &CelestialObject, jd: f64) -> Result<bool, OrbitError> {
    let earth = catalog
        .lookup("earth")
        .ok_or_else(|| OrbitError::UnknownBody("earth".to_string()))?;
    if body.name == earth.name {
        return Ok(false);
    }

    let earth_pos = position_at(catalog, earth, jd)?;
    let body_pos = position_at(catalog, body, jd)?;
    let segment = vector::sub(&body_pos, &earth_pos);
    let segment_len_sq = vector::dot(&segment, &segment);
    if segment_len_sq <= 0.0 {
        return Ok(false);
    }

    // Project the Sun (origin) onto the segment: t in [0, 1] means the
    // closest point lies between Earth and the body.
    let to_origin = vector::scale(&earth_pos, -1.0);
    let t = vector::dot(&to_origin, &segment) / segment_len_sq;
    if !(0.0..=1.0).contains(&t) {
        return Ok(false);
    }

    let closest = vector::add(&earth_pos, &vector::scale(&segment, t));
    let perpendicular_distance = vector::norm(&closest);
    let margin = body
        .radius_km
        .map(|r| SUN_RADIUS_KM.max(r))
        .unwrap_or(SUN_RADIUS_KM)
        * OCCLUSION_MARGIN_FACTOR;

    Ok(perpendicular_distance <= margin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use space_catalog::{BodyType, KeplerianElements};

    fn sun() -> CelestialObject {
        CelestialObject {
            name: "sun".into(),
            body_type: BodyType::Star,
            parent: "".into(),
            elements: KeplerianElements {
                semi_major_axis_km: 1.0,
                eccentricity: 0.0,
                inclination_deg: 0.0,
                longitude_of_ascending_node_deg: 0.0,
                argument_of_perihelion_deg: 0.0,
                mean_anomaly_at_epoch_deg: 0.0,
                epoch_jd: 2_451_545.0,
            },
            radius_km: Some(695_700.0),
            bandwidth_bps: None,
            mu_km3_s2: Some(1.327_124_400_18e11),
        }
    }

    fn circular_planet(name: &str, a_km: f64, m0_deg: f64) -> CelestialObject {
        CelestialObject {
            name: name.into(),
            body_type: BodyType::Planet,
            parent: "sun".into(),
            elements: KeplerianElements {
                semi_major_axis_km: a_km,
                eccentricity: 0.0,
                inclination_deg: 0.0,
                longitude_of_ascending_node_deg: 0.0,
                argument_of_perihelion_deg: 0.0,
                mean_anomaly_at_epoch_deg: m0_deg,
                epoch_jd: 2_451_545.0,
            },
            radius_km: Some(6_000.0),
            bandwidth_bps: None,
            mu_km3_s2: None,
        }
    }

    fn catalog_with_earth_and(other: CelestialObject) -> Catalog {
        let earth = circular_planet("earth", 149_598_023.0, 0.0);
        Catalog::from_objects(vec![sun(), earth, other]).unwrap()
    }

    #[test]
    fn kepler_solver_converges_for_high_eccentricity() {
        let e = solve_kepler(1.0, 0.95).expect("should converge");
        let residual = e - 0.95 * e.sin() - 1.0;
        assert!(residual.abs() < 1e-9);
    }

    #[test]
    fn latency_to_earth_is_zero() {
        let catalog = catalog_with_earth_and(circular_planet("mars", 227_939_200.0, 90.0));
        let earth = catalog.lookup("earth").unwrap();
        let d = latency(&catalog, earth, 2_451_545.0).unwrap();
        assert_eq!(d, Duration::from_secs(0));
    }

    #[test]
    fn earth_distance_is_never_negative() {
        let catalog = catalog_with_earth_and(circular_planet("mars", 227_939_200.0, 200.0));
        let mars = catalog.lookup("mars").unwrap();
        for day in 0..365 {
            let jd = 2_451_545.0 + day as f64;
            let d = earth_distance_km(&catalog, mars, jd).unwrap();
            assert!(d >= 0.0);
        }
    }

    #[test]
    fn opposite_circular_orbits_are_occluded_at_conjunction() {
        // Earth and Mars on exactly opposite sides of the Sun (mean anomaly
        // offset by 180 degrees on coplanar circular orbits) puts the Sun
        // directly on the Earth-Mars segment.
        let catalog = catalog_with_earth_and(circular_planet("mars", 227_939_200.0, 180.0));
        let mars = catalog.lookup("mars").unwrap();
        assert!(is_occluded(&catalog, mars, 2_451_545.0).unwrap());
    }

    #[test]
    fn adjacent_circular_orbits_are_not_occluded() {
        let catalog = catalog_with_earth_and(circular_planet("mars", 227_939_200.0, 5.0));
        let mars = catalog.lookup("mars").unwrap();
        assert!(!is_occluded(&catalog, mars, 2_451_545.0).unwrap());
    }

    #[test]
    fn bandwidth_scales_with_inverse_square_distance() {
        let body = circular_planet("mars", 227_939_200.0, 0.0);
        let near = bandwidth_bps(&body, 1000.0, AU_KM);
        let far = bandwidth_bps(&body, 1000.0, AU_KM * 2.0);
        assert!((near - 1000.0).abs() < 1e-6);
        assert!((far - 250.0).abs() < 1e-6);
    }

    #[test]
    fn unix_epoch_converts_to_known_julian_date() {
        assert!((unix_seconds_to_jd(0.0) - 2_440_587.5).abs() < 1e-9);
    }
}
