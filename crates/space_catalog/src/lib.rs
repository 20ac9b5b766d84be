//! Celestial body catalog: loading, validation, and lookup.
//!
//! The catalog is read once at process start from a directory of TOML files
//! (one file per body, mirroring the teacher workspace's per-record config
//! convention) and is immutable for the remainder of the process lifetime.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of celestial object, used for catalog filtering accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    Star,
    Planet,
    DwarfPlanet,
    Moon,
    Asteroid,
    Spacecraft,
}

/// Osculating Keplerian elements at a reference epoch. Angles are stored in
/// degrees on disk (operator-friendly) and converted to radians by
/// `space_orbits` at evaluation time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeplerianElements {
    /// Semi-major axis (km).
    pub semi_major_axis_km: f64,
    /// Eccentricity, must be in `[0, 1)` for the closed-orbit solver.
    pub eccentricity: f64,
    /// Inclination (degrees).
    pub inclination_deg: f64,
    /// Longitude of ascending node, Ω (degrees).
    pub longitude_of_ascending_node_deg: f64,
    /// Argument of perihelion, ω (degrees).
    pub argument_of_perihelion_deg: f64,
    /// Mean anomaly at epoch, M₀ (degrees).
    pub mean_anomaly_at_epoch_deg: f64,
    /// Reference epoch, Julian date (TDB).
    pub epoch_jd: f64,
}

/// On-disk record shape for a single catalog TOML file.
#[derive(Debug, Clone, Deserialize)]
struct CelestialObjectConfig {
    name: String,
    #[serde(rename = "type")]
    body_type: BodyType,
    #[serde(default)]
    parent: String,
    elements: KeplerianElements,
    #[serde(default)]
    radius_km: Option<f64>,
    #[serde(default)]
    bandwidth_bps: Option<f64>,
    /// Standard gravitational parameter (km^3/s^2) of *this* body, required
    /// only when the body is itself a parent (i.e. something else orbits
    /// it — the Sun, or a planet with moons/spacecraft).
    #[serde(default)]
    mu_km3_s2: Option<f64>,
}

/// A single catalog entry after normalization and validation.
#[derive(Debug, Clone, Serialize)]
pub struct CelestialObject {
    pub name: String,
    pub body_type: BodyType,
    pub parent: String,
    pub elements: KeplerianElements,
    pub radius_km: Option<f64>,
    pub bandwidth_bps: Option<f64>,
    pub mu_km3_s2: Option<f64>,
}

/// Errors raised while loading or validating the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("catalog is empty")]
    Empty,
    #[error("duplicate body name `{0}`")]
    DuplicateName(String),
    #[error("body `{name}` has invalid name (must match [a-z0-9-]+)")]
    InvalidName { name: String },
    #[error("body `{name}` references unknown parent `{parent}`")]
    UnknownParent { name: String, parent: String },
    #[error("body `{name}` has no parent but is not the Sun")]
    MissingParent { name: String },
    #[error("parent chain starting at `{0}` contains a cycle")]
    CyclicParent(String),
    #[error("body `{name}` has eccentricity {e} outside [0, 1)")]
    InvalidEccentricity { name: String, e: f64 },
    #[error("body `{name}` has non-positive semi-major axis {a}")]
    InvalidSemiMajorAxis { name: String, a: f64 },
}

/// Normalize a raw body name: lowercase, spaces/underscores become hyphens.
pub fn normalize_name(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '_' { '-' } else { c })
        .collect()
}

fn is_dns_safe(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Immutable, validated table of celestial bodies.
#[derive(Debug, Clone)]
pub struct Catalog {
    objects: Vec<CelestialObject>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build and validate a catalog from already-parsed records. Exposed so
    /// tests (and embedders) can construct a catalog without touching disk.
    pub fn from_objects(objects: Vec<CelestialObject>) -> Result<Self, CatalogError> {
        if objects.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut index = HashMap::with_capacity(objects.len());
        for (i, obj) in objects.iter().enumerate() {
            if !is_dns_safe(&obj.name) {
                return Err(CatalogError::InvalidName {
                    name: obj.name.clone(),
                });
            }
            if index.insert(obj.name.clone(), i).is_some() {
                return Err(CatalogError::DuplicateName(obj.name.clone()));
            }
        }

        for obj in &objects {
            if obj.parent.is_empty() {
                continue;
            }
            if !index.contains_key(&obj.parent) {
                return Err(CatalogError::UnknownParent {
                    name: obj.name.clone(),
                    parent: obj.parent.clone(),
                });
            }
        }

        let roots = objects.iter().filter(|o| o.parent.is_empty()).count();
        if roots == 0 {
            return Err(CatalogError::MissingParent {
                name: objects[0].name.clone(),
            });
        }

        for obj in &objects {
            let mut seen = HashSet::new();
            let mut current = obj.name.clone();
            loop {
                if !seen.insert(current.clone()) {
                    return Err(CatalogError::CyclicParent(obj.name.clone()));
                }
                let idx = *index.get(&current).expect("validated above");
                let parent = &objects[idx].parent;
                if parent.is_empty() {
                    break;
                }
                current = parent.clone();
            }
        }

        for obj in &objects {
            if !(0.0..1.0).contains(&obj.elements.eccentricity) {
                return Err(CatalogError::InvalidEccentricity {
                    name: obj.name.clone(),
                    e: obj.elements.eccentricity,
                });
            }
            if obj.elements.semi_major_axis_km <= 0.0 {
                return Err(CatalogError::InvalidSemiMajorAxis {
                    name: obj.name.clone(),
                    a: obj.elements.semi_major_axis_km,
                });
            }
        }

        Ok(Catalog { objects, index })
    }

    /// Load every `*.toml` file in `dir`, one body per file, sorted by
    /// filename so catalog ordering (and therefore debug-surface output) is
    /// deterministic across runs.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|source| CatalogError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "toml").unwrap_or(false))
            .collect();
        paths.sort();

        let mut objects = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            let record: CelestialObjectConfig =
                toml::from_str(&contents).map_err(|source| CatalogError::Parse {
                    path: path.clone(),
                    source,
                })?;
            objects.push(CelestialObject {
                name: normalize_name(&record.name),
                body_type: record.body_type,
                parent: normalize_name(&record.parent),
                elements: record.elements,
                radius_km: record.radius_km,
                bandwidth_bps: record.bandwidth_bps,
                mu_km3_s2: record.mu_km3_s2,
            });
        }

        Self::from_objects(objects)
    }

    /// Every object in the catalog, in load order.
    pub fn all(&self) -> &[CelestialObject] {
        &self.objects
    }

    /// Case/format-insensitive lookup by name.
    pub fn lookup(&self, name: &str) -> Option<&CelestialObject> {
        let key = normalize_name(name);
        self.index.get(&key).map(|&i| &self.objects[i])
    }

    /// All objects of type `planet`.
    pub fn planets(&self) -> impl Iterator<Item = &CelestialObject> {
        self.objects.iter().filter(|o| o.body_type == BodyType::Planet)
    }

    /// All moons whose parent matches `parent` (case-insensitive).
    pub fn moons<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a CelestialObject> + 'a {
        let parent = normalize_name(parent);
        self.objects
            .iter()
            .filter(move |o| o.body_type == BodyType::Moon && o.parent == parent)
    }

    /// All spacecraft entries.
    pub fn spacecraft(&self) -> impl Iterator<Item = &CelestialObject> {
        self.objects.iter().filter(|o| o.body_type == BodyType::Spacecraft)
    }

    /// All dwarf planets.
    pub fn dwarf_planets(&self) -> impl Iterator<Item = &CelestialObject> {
        self.objects.iter().filter(|o| o.body_type == BodyType::DwarfPlanet)
    }

    /// All asteroids.
    pub fn asteroids(&self) -> impl Iterator<Item = &CelestialObject> {
        self.objects.iter().filter(|o| o.body_type == BodyType::Asteroid)
    }

    /// The gravitational parent object of `body`, if any (`None` for the Sun).
    pub fn parent_of(&self, body: &CelestialObject) -> Option<&CelestialObject> {
        if body.parent.is_empty() {
            None
        } else {
            self.lookup(&body.parent)
        }
    }
}
