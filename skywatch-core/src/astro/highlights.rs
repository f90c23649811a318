//! Derives "tonight's highlights" from an astronomy snapshot.
//!
//! Pure and deterministic: same snapshot in, same ordered list out. The
//! rules live in one ordered table so the priority semantics stay auditable;
//! ties keep the table order through the stable sort.

use crate::types::{AstronomyData, Highlight};

type Rule = fn(&AstronomyData) -> Option<Highlight>;

/// Rule table, in tie-break order: aurora, moon, ISS, meteor shower,
/// planets.
const RULES: &[Rule] = &[
    aurora_highlight,
    moon_highlight,
    iss_highlight,
    meteor_highlight,
    planet_highlight,
];

/// Evaluate every rule against the snapshot and rank the matches.
pub fn derive_highlights(data: &AstronomyData) -> Vec<Highlight> {
    let mut highlights: Vec<Highlight> = RULES.iter().filter_map(|rule| rule(data)).collect();
    // sort_by_key is stable: equal priorities keep rule order.
    highlights.sort_by_key(|h| h.priority);
    highlights
}

/// Whether aurora can be expected at all for this geomagnetic activity and
/// observer latitude. A step table, not a continuous function: each KP band
/// unlocks a latitude band.
pub fn aurora_visible(kp_index: f64, abs_latitude: f64) -> bool {
    (kp_index >= 9.0 && abs_latitude > 40.0)
        || (kp_index >= 7.0 && abs_latitude > 45.0)
        || (kp_index >= 5.0 && abs_latitude > 55.0)
        || (kp_index >= 3.0 && abs_latitude > 65.0)
}

fn aurora_highlight(data: &AstronomyData) -> Option<Highlight> {
    let forecast = data.aurora.as_ref()?;
    let abs_latitude = data.coordinates.latitude.abs();
    if aurora_visible(forecast.kp_index, abs_latitude) && forecast.probability > 0.3 {
        Some(Highlight {
            title: "Aurora Possible Tonight".to_string(),
            description: format!(
                "With a KP index of {:.1}, aurora activity might be visible from your latitude under dark sky conditions.",
                forecast.kp_index
            ),
            icon: "✨".to_string(),
            priority: 0,
        })
    } else {
        None
    }
}

fn moon_highlight(data: &AstronomyData) -> Option<Highlight> {
    let moon = data.moon_phase.as_ref()?;
    let phase = moon.phase_name.to_lowercase();
    if phase.contains("full") {
        Some(Highlight {
            title: "Full Moon Tonight".to_string(),
            description:
                "The moon is full tonight, providing excellent illumination for nighttime activities."
                    .to_string(),
            icon: "🌕".to_string(),
            priority: 1,
        })
    } else if phase.contains("new") {
        Some(Highlight {
            title: "New Moon Tonight".to_string(),
            description:
                "The new moon provides dark skies, perfect for observing faint objects like galaxies and nebulae."
                    .to_string(),
            icon: "🌑".to_string(),
            priority: 1,
        })
    } else {
        None
    }
}

fn iss_highlight(data: &AstronomyData) -> Option<Highlight> {
    let pass = data
        .satellites
        .as_ref()?
        .iter()
        .find(|pass| pass.name.contains("ISS") && pass.visible)?;
    Some(Highlight {
        title: "ISS Visible Tonight".to_string(),
        description: format!(
            "The International Space Station will be visible at {} with a maximum elevation of {:.1}°.",
            pass.start_time.format("%H:%M UTC"),
            pass.max_elevation_deg
        ),
        icon: "🛰️".to_string(),
        priority: 1,
    })
}

fn meteor_highlight(data: &AstronomyData) -> Option<Highlight> {
    let shower = data
        .meteor_showers
        .as_ref()?
        .iter()
        .find(|shower| shower.active && shower.visibility > 0.4)?;
    Some(Highlight {
        title: format!("{} Meteor Shower Active", shower.name),
        description: format!(
            "The {} meteor shower is active with an expected rate of {:.0} meteors per hour.",
            shower.name, shower.rate_per_hour
        ),
        icon: "☄️".to_string(),
        priority: 1,
    })
}

/// Three or more visible planets outrank the single-planet rule; the two
/// branches are mutually exclusive by construction.
fn planet_highlight(data: &AstronomyData) -> Option<Highlight> {
    let visible: Vec<&str> = data
        .planets
        .as_ref()?
        .iter()
        .filter(|planet| planet.visible)
        .map(|planet| planet.name.as_str())
        .collect();

    if visible.len() >= 3 {
        Some(Highlight {
            title: format!("{} Planets Visible Tonight", visible.len()),
            description: format!("Look for {} in the night sky.", visible.join(", ")),
            icon: "🪐".to_string(),
            priority: 2,
        })
    } else {
        let showpiece = visible
            .iter()
            .copied()
            .find(|name| matches!(*name, "Jupiter" | "Saturn"))?;
        Some(Highlight {
            title: format!("{} Visible Tonight", showpiece),
            description: format!("Look for {} in the night sky.", showpiece),
            icon: "🪐".to_string(),
            priority: 3,
        })
    }
}
