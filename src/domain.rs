use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FailureReason;

/// The six base stats every well-formed record carries, no more and no fewer.
pub const STAT_NAMES: [&str; 6] = [
    "hp",
    "attack",
    "defense",
    "special-attack",
    "special-defense",
    "speed",
];

static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Cc}").unwrap());

/// One catalog entry as stored in the snapshot and the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub id: u32,
    pub types: Vec<String>,
    pub abilities: Vec<String>,
    pub height: u32,
    pub weight: u32,
    pub stats: BTreeMap<String, u32>,
    #[serde(default)]
    pub flavor_text: String,
}

impl EntityRecord {
    /// Name with the first letter upper-cased and the rest lower-cased.
    pub fn display_name(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        }
    }

    /// Height in metres; the source reports decimetres.
    pub fn height_m(&self) -> f64 {
        f64::from(self.height) / 10.0
    }

    /// Weight in kilograms; the source reports hectograms.
    pub fn weight_kg(&self) -> f64 {
        f64::from(self.weight) / 10.0
    }
}

impl fmt::Display for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (#{})", self.display_name(), self.id)?;
        writeln!(f, "Types: {}", self.types.join(", "))?;
        writeln!(f, "Abilities: {}", self.abilities.join(", "))?;
        writeln!(f, "Height: {:.1} m", self.height_m())?;
        writeln!(f, "Weight: {:.1} kg", self.weight_kg())?;
        writeln!(f, "Stats:")?;
        for (stat, value) in &self.stats {
            writeln!(f, "- {stat}: {value}")?;
        }
        if !self.flavor_text.is_empty() {
            write!(f, "Dex entry: {}", self.flavor_text)?;
        }
        Ok(())
    }
}

/// Ordered succession of entity ids, earliest stage first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvolutionChain(pub Vec<u32>);

impl EvolutionChain {
    /// Directed `(from, to)` links between consecutive stages.
    pub fn links(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.0.windows(2).map(|pair| (pair[0], pair[1]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub locator: String,
    pub reason: FailureReason,
}

/// Result of fetching one locator.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(EntityRecord),
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn failure(locator: impl Into<String>, reason: FailureReason) -> Self {
        FetchOutcome::Failure(FetchFailure {
            locator: locator.into(),
            reason,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}

/// Entity records plus evolution chains, as persisted to the snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub pokemon: Vec<EntityRecord>,
    #[serde(default)]
    pub evolutions: Vec<EvolutionChain>,
}

impl Snapshot {
    /// First record whose stat keys differ from those of the first record.
    pub fn stat_key_mismatch(&self) -> Option<&EntityRecord> {
        let (first, rest) = self.pokemon.split_first()?;
        rest.iter().find(|record| !record.stats.keys().eq(first.stats.keys()))
    }
}

/// Turns user input into the path segment used by the detail endpoint.
///
/// Input is lower-cased. `"mega <species>"` becomes `"<species>-mega"`; otherwise spaces
/// become hyphens.
pub fn sanitize_name(input: &str) -> String {
    let name = input.to_lowercase();
    if let Some(position) = name.find("mega ") {
        let rest = &name[position + "mega ".len()..];
        if let Some(species) = rest.split(' ').find(|token| !token.is_empty()) {
            return format!("{species}-mega");
        }
    }
    name.replace(' ', "-")
}

/// Collapses newlines, form feeds and any other control character to a single space each.
pub fn normalize_flavor_text(raw: &str) -> String {
    CONTROL_CHARS.replace_all(raw, " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_mega_forms() {
        assert_eq!(sanitize_name("Mega Charizard"), "charizard-mega");
        assert_eq!(sanitize_name("mega venusaur"), "venusaur-mega");
    }

    #[test]
    fn sanitize_replaces_spaces() {
        assert_eq!(sanitize_name("Mr. Mime"), "mr.-mime");
        assert_eq!(sanitize_name("Pikachu"), "pikachu");
        assert_eq!(sanitize_name("25"), "25");
    }

    #[test]
    fn flavor_text_has_no_control_characters() {
        let text = normalize_flavor_text("A strange seed\nwas planted\x0con its back.");
        assert_eq!(text, "A strange seed was planted on its back.");
        assert!(!text.chars().any(char::is_control));
    }

    #[test]
    fn stat_key_mismatch_finds_partial_record() {
        let full = EntityRecord {
            name: "bulbasaur".to_string(),
            id: 1,
            types: vec!["grass".to_string()],
            abilities: Vec::new(),
            height: 7,
            weight: 69,
            stats: STAT_NAMES.iter().map(|name| (name.to_string(), 45)).collect(),
            flavor_text: String::new(),
        };
        let mut partial = full.clone();
        partial.id = 2;
        partial.stats.remove("speed");

        let consistent = Snapshot {
            pokemon: vec![full.clone(), full.clone()],
            evolutions: Vec::new(),
        };
        assert!(consistent.stat_key_mismatch().is_none());

        let mixed = Snapshot {
            pokemon: vec![full, partial],
            evolutions: Vec::new(),
        };
        assert_eq!(mixed.stat_key_mismatch().map(|record| record.id), Some(2));
    }

    #[test]
    fn evolution_links_follow_order() {
        let chain = EvolutionChain(vec![1, 2, 3]);
        assert_eq!(chain.links().collect::<Vec<_>>(), vec![(1, 2), (2, 3)]);
    }
}
