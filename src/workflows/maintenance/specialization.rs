use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of trades a worker can hold and a request can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialization {
    Plumbing,
    Electrical,
    Carpentry,
    Hvac,
    General,
}

impl Specialization {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Plumbing,
            Self::Electrical,
            Self::Carpentry,
            Self::Hvac,
            Self::General,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Plumbing => "Plumbing",
            Self::Electrical => "Electrical",
            Self::Carpentry => "Carpentry",
            Self::Hvac => "HVAC",
            Self::General => "General",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plumbing" => Some(Self::Plumbing),
            "electrical" => Some(Self::Electrical),
            "carpentry" => Some(Self::Carpentry),
            "hvac" => Some(Self::Hvac),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for Specialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Keyword table scanned in fixed order; the first trade with a hit wins,
/// so classification stays deterministic for a given description.
const KEYWORDS: [(Specialization, &[&str]); 4] = [
    (
        Specialization::Plumbing,
        &[
            "leak", "tap", "faucet", "pipe", "drain", "toilet", "sink", "water heater", "sewer",
        ],
    ),
    (
        Specialization::Electrical,
        &[
            "outlet", "wiring", "breaker", "fuse", "light fixture", "socket", "power", "sparking",
        ],
    ),
    (
        Specialization::Carpentry,
        &[
            "door", "cabinet", "window frame", "shelf", "floorboard", "deck", "railing", "drywall",
        ],
    ),
    (
        Specialization::Hvac,
        &[
            "furnace", "thermostat", "air conditioning", "a/c", "heating", "radiator", "vent",
        ],
    ),
];

/// Infer the trade a request requires from its description and an optional
/// category hint supplied by intake.
///
/// The hint, being already a closed enum value, always wins. Keyword
/// inference runs over the lowercased description; when nothing matches the
/// request falls through to `General` rather than failing, so ambiguous
/// descriptions never block intake.
pub fn determine_specialization(
    description: &str,
    category_hint: Option<Specialization>,
) -> Specialization {
    if let Some(hint) = category_hint {
        return hint;
    }

    let haystack = description.to_lowercase();
    for (specialization, keywords) in KEYWORDS {
        if keywords.iter().any(|keyword| haystack.contains(keyword)) {
            return specialization;
        }
    }

    Specialization::General
}
