use space_catalog::{BodyType, Catalog, CelestialObject};
use space_router::{format_hostname, Route};

use crate::distance_cache::DistanceCache;

/// Walks a body's non-star ancestors to build the chain a hostname would
/// need to name it (innermost-to-outermost, matching `space_router`'s
/// convention): `[planet]` for a planet, `[planet, moon]` for a moon.
fn body_chain(catalog: &Catalog, body: &CelestialObject) -> Vec<String> {
    let mut chain = vec![body.name.clone()];
    let mut current = body.clone();
    while !current.parent.is_empty() {
        match catalog.lookup(&current.parent) {
            Some(parent) if parent.body_type != BodyType::Star => {
                chain.push(parent.name.clone());
                current = parent.clone();
            }
            _ => break,
        }
    }
    chain.reverse();
    chain
}

fn hostname_for(catalog: &Catalog, body: &CelestialObject, zone: &str) -> String {
    let route = Route {
        chain: body_chain(catalog, body),
        target: None,
    };
    format_hostname(&route, zone)
}

/// `/_debug/help` — plain-text usage instructions. Must contain the
/// literal substring "Interplanetary" per the service's help-page contract.
pub fn render_help(zone: &str) -> String {
    format!(
        "Interplanetary Latency Simulation Proxy\n\
         \n\
         Pick a Solar System body by DNS subdomain:\n\
         \n\
         curl http://mars.{zone}/\n\
         curl -x http://example.com.mars.{zone} http://example.com/\n\
         curl --socks5-hostname jupiter.{zone}:1080 http://example.com/\n\
         \n\
         Moons and other satellites chain with their parent, nearest body last:\n\
         curl -x http://example.com.titan.saturn.{zone} http://example.com/\n\
         \n\
         Debug endpoints (this server, plain text unless noted):\n\
         /_debug/help        this page\n\
         /_debug/distances   current Earth distance for every catalog body\n\
         /_debug/bodies      catalog dump (add ?format=json for JSON)\n\
         /_debug/domains     every routable subdomain\n\
         \n\
         Note: all positions use osculating Keplerian elements, not full\n\
         ephemerides. Spacecraft on an escape trajectory (e.g. a real\n\
         Voyager-class probe) are hyperbolic (e >= 1) and can't be\n\
         represented by this solver; catalog entries for such probes use a\n\
         bound, highly-eccentric ellipse reaching comparable distances as\n\
         an approximation.\n"
    )
}

/// `/_debug/distances` — `Current Time: <ISO8601>` followed by one line per
/// body, `name: <distance> million km [OCCLUDED]`. Takes one snapshot of
/// the cache up front rather than a `get` per body, so the listing is
/// internally consistent even if a refresh lands mid-render.
pub fn render_distances(catalog: &Catalog, cache: &DistanceCache, now_unix: f64) -> String {
    let timestamp = chrono::DateTime::from_timestamp(now_unix as i64, 0)
        .unwrap_or_else(|| chrono::DateTime::from_timestamp(0, 0).expect("epoch is valid"));

    let snapshot = cache.snapshot();
    let mut out = format!("Current Time: {}\n", timestamp.to_rfc3339());
    for body in catalog.all() {
        let Some(entry) = snapshot.get(&body.name) else {
            continue;
        };
        let million_km = entry.distance_km / 1_000_000.0;
        if entry.occluded {
            out.push_str(&format!("{}: {million_km:.2} million km [OCCLUDED]\n", body.name));
        } else {
            out.push_str(&format!("{}: {million_km:.2} million km\n", body.name));
        }
    }
    out
}

/// `/_debug/bodies` — plain-text catalog dump.
pub fn render_bodies_text(catalog: &Catalog) -> String {
    let mut out = String::new();
    for body in catalog.all() {
        out.push_str(&format!(
            "{name} type={type:?} parent={parent} a={a:.3e}km e={e:.4} i={i:.2}deg\n",
            name = body.name,
            type = body.body_type,
            parent = if body.parent.is_empty() { "-" } else { &body.parent },
            a = body.elements.semi_major_axis_km,
            e = body.elements.eccentricity,
            i = body.elements.inclination_deg,
        ));
    }
    out
}

/// `/_debug/bodies?format=json` — structured catalog dump for the (out of
/// scope) DNS-provisioning collaborator to consume mechanically.
pub fn render_bodies_json(catalog: &Catalog) -> serde_json::Value {
    serde_json::Value::Array(
        catalog
            .all()
            .iter()
            .map(|body| {
                serde_json::json!({
                    "name": body.name,
                    "type": format!("{:?}", body.body_type),
                    "parent": body.parent,
                    "semi_major_axis_km": body.elements.semi_major_axis_km,
                    "eccentricity": body.elements.eccentricity,
                    "inclination_deg": body.elements.inclination_deg,
                    "radius_km": body.radius_km,
                    "bandwidth_bps": body.bandwidth_bps,
                })
            })
            .collect(),
    )
}

/// `/_debug/domains` — every routable subdomain under `zone`.
pub fn render_domains(catalog: &Catalog, zone: &str) -> String {
    let mut out = String::new();
    for body in catalog.all() {
        out.push_str(&hostname_for(catalog, body, zone));
        out.push('\n');
    }
    out
}

/// HTML info page served on a root `GET` against a body-only host (no
/// target), e.g. `GET / HTTP/1.1` with `Host: mars.latency.space`.
pub fn render_body_info_page(catalog: &Catalog, cache: &DistanceCache, body: &CelestialObject, zone: &str) -> String {
    let hostname = hostname_for(catalog, body, zone);

    let (distance, one_way, round_trip, sight) = match cache.get(&body.name) {
        Some(entry) => (
            format!("{:.2} million km", entry.distance_km / 1_000_000.0),
            format!("{:.2} s", entry.latency.as_secs_f64()),
            format!("{:.2} s", entry.latency.as_secs_f64() * 2.0),
            if entry.occluded {
                "OCCLUDED (the Sun blocks the line of sight)".to_string()
            } else {
                "clear".to_string()
            },
        ),
        None => (
            "unknown (cache not yet warm)".to_string(),
            "unknown".to_string(),
            "unknown".to_string(),
            "unknown".to_string(),
        ),
    };

    let moons_html = if body.body_type == BodyType::Planet {
        let items: String = catalog
            .moons(&body.name)
            .map(|m| format!("<li>{}</li>", m.name))
            .collect();
        if items.is_empty() {
            String::new()
        } else {
            format!("<h2>Moons</h2><ul>{items}</ul>")
        }
    } else {
        String::new()
    };

    format!(
        "<!DOCTYPE html>\n<html><head><title>{name}</title></head><body>\n\
         <h1>{name}</h1>\n\
         <p>Distance from Earth: {distance}</p>\n\
         <p>One-way light time: {one_way}</p>\n\
         <p>Round-trip light time: {round_trip}</p>\n\
         <p>Line of sight: {sight}</p>\n\
         {moons_html}\n\
         <h2>Usage</h2>\n\
         <pre>curl http://{hostname}/\n\
curl -x http://example.com.{hostname} http://example.com/\n\
curl --socks5-hostname {hostname}:1080 http://example.com/</pre>\n\
         </body></html>\n",
        name = body.name,
    )
}
