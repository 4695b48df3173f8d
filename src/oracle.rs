use crate::Store;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, thread_rng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// One generated idea, serialized with the field names existing clients read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    #[serde(rename = "input_solicitado")]
    pub requested_input: String,
    #[serde(rename = "tema_identificado")]
    pub identified_theme: String,
    #[serde(rename = "ideia_alucinada")]
    pub generated_idea: String,
    #[serde(rename = "fator_distorcao")]
    pub distortion_factor: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("keyword cannot be empty")]
    EmptyInput,
    #[error("no themes are loaded")]
    NoThemes,
    #[error("theme {theme:?} has no keywords")]
    EmptyTheme { theme: String },
    #[error("no theme other than {theme:?} is available")]
    NoAlternateTheme { theme: String },
    #[error("no connector phrases are loaded")]
    EmptyConnectorSet,
}

/// Language of the sentence templates.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum Phrasing {
    #[default]
    Portuguese,
    English,
}

impl Phrasing {
    fn idea(self, base: &str, connector: &str, hallucinated: &str) -> String {
        match self {
            Phrasing::Portuguese => {
                format!("Criar uma plataforma de {base} {connector} {hallucinated}.")
            }
            Phrasing::English => {
                format!("Create a platform for {base} {connector} {hallucinated}.")
            }
        }
    }

    fn distortion(self, base: &str, hallucinated_theme: &str) -> String {
        match self {
            Phrasing::Portuguese => format!("Combinação de {base} com o tema {hallucinated_theme}"),
            Phrasing::English => format!("Combination of {base} with theme {hallucinated_theme}"),
        }
    }

    /// Separator preceding the hallucinated theme in `distortion_factor`.
    pub fn theme_marker(self) -> &'static str {
        match self {
            Phrasing::Portuguese => " com o tema ",
            Phrasing::English => " with theme ",
        }
    }
}

impl fmt::Display for Phrasing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phrasing::Portuguese => write!(f, "pt"),
            Phrasing::English => write!(f, "en"),
        }
    }
}

impl FromStr for Phrasing {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pt" | "pt-br" | "portuguese" => Ok(Phrasing::Portuguese),
            "en" | "english" => Ok(Phrasing::English),
            other => Err(format!("unknown phrasing {other:?} (expected `pt` or `en`)")),
        }
    }
}

/// Trims `raw`, rejecting blank keywords.
pub fn validate_keyword(raw: &str) -> Result<&str, GenerateError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(GenerateError::EmptyInput)
    } else {
        Ok(trimmed)
    }
}

/// Uppercases the first character and lowercases the rest.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Generates an idea using the thread-local RNG.
pub fn generate(keyword: &str, store: &Store, phrasing: Phrasing) -> Result<Idea, GenerateError> {
    generate_with(keyword, store, phrasing, &mut thread_rng())
}

/// Generates an idea drawing every random choice from `rng`.
pub fn generate_with<R>(
    keyword: &str,
    store: &Store,
    phrasing: Phrasing,
    rng: &mut R,
) -> Result<Idea, GenerateError>
where
    R: Rng + ?Sized,
{
    let names = store.theme_names();
    let theme = match store.match_theme(keyword) {
        Some(theme) => theme,
        None => names.choose(rng).copied().ok_or(GenerateError::NoThemes)?,
    };

    let base = store
        .keywords_of(theme)
        .choose(rng)
        .ok_or_else(|| GenerateError::EmptyTheme {
            theme: theme.to_string(),
        })?;

    let remaining: Vec<&str> = names.iter().copied().filter(|name| *name != theme).collect();
    let hallucinated_theme =
        remaining
            .choose(rng)
            .copied()
            .ok_or_else(|| GenerateError::NoAlternateTheme {
                theme: theme.to_string(),
            })?;
    let hallucinated = store
        .keywords_of(hallucinated_theme)
        .choose(rng)
        .ok_or_else(|| GenerateError::EmptyTheme {
            theme: hallucinated_theme.to_string(),
        })?;

    let connector = store
        .all_connectors()
        .choose(rng)
        .copied()
        .ok_or(GenerateError::EmptyConnectorSet)?;

    debug!(keyword, theme, hallucinated_theme, connector, "Generated idea");
    Ok(Idea {
        requested_input: keyword.to_string(),
        identified_theme: capitalize(theme),
        generated_idea: phrasing.idea(base, connector, hallucinated),
        distortion_factor: phrasing.distortion(base, &capitalize(hallucinated_theme)),
    })
}

/// Generates `count` independent ideas in parallel.
///
/// With a seed, item `i` draws from `SmallRng::seed_from_u64(seed + i)`, so the
/// batch is reproducible regardless of how rayon schedules it.
pub fn generate_batch(
    keyword: &str,
    store: &Store,
    phrasing: Phrasing,
    count: usize,
    seed: Option<u64>,
) -> Vec<Result<Idea, GenerateError>> {
    (0..count)
        .into_par_iter()
        .map(|idx| match seed {
            Some(seed) => {
                let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(idx as u64));
                generate_with(keyword, store, phrasing, &mut rng)
            }
            None => generate(keyword, store, phrasing),
        })
        .collect()
}
