mod data;
pub mod oracle;
#[cfg(feature = "web")]
pub mod web;

pub use oracle::{
    GenerateError, Idea, Phrasing, capitalize, generate, generate_batch, generate_with,
    validate_keyword,
};

use data::{
    CONNECTORS_FILE, FALLBACK_CONNECTORS, FALLBACK_THEMES, THEMES_FILE, ThemeRecord,
    default_weight, parse_entries,
};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// A named group of keywords used for matching and selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: String,
    pub keywords: Vec<String>,
    pub description: String,
    /// Carried through from the dataset; selection is uniform regardless.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorCategory {
    pub name: String,
    pub phrases: Vec<String>,
}

#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid dataset: {0}")]
    Invalid(String),
}

/// Where a [`Store`] got its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOrigin {
    Directory(PathBuf),
    Inline,
    Fallback,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataOrigin::Directory(dir) => write!(f, "JSON files in {}", dir.display()),
            DataOrigin::Inline => write!(f, "inline dataset"),
            DataOrigin::Fallback => write!(f, "embedded fallback dataset"),
        }
    }
}

/// Immutable theme and connector dataset.
///
/// Themes and categories keep the order they were declared in; `match_theme`
/// returns the first hit in that order.
#[derive(Debug, Clone)]
pub struct Store {
    themes: Vec<Theme>,
    categories: Vec<ConnectorCategory>,
    origin: DataOrigin,
}

impl Store {
    /// Builds a store, rejecting datasets the generator cannot work with.
    pub fn new(
        themes: Vec<Theme>,
        categories: Vec<ConnectorCategory>,
    ) -> Result<Self, DataLoadError> {
        if themes.len() < 2 {
            return Err(DataLoadError::Invalid(format!(
                "at least two themes are required, found {}",
                themes.len()
            )));
        }
        for (idx, theme) in themes.iter().enumerate() {
            if theme.name.trim().is_empty() {
                return Err(DataLoadError::Invalid(format!(
                    "theme #{idx} has an empty name"
                )));
            }
            if theme.keywords.is_empty() {
                return Err(DataLoadError::Invalid(format!(
                    "theme {:?} has no keywords",
                    theme.name
                )));
            }
            // A blank keyword is a substring of every input.
            if theme.keywords.iter().any(|kw| kw.trim().is_empty()) {
                return Err(DataLoadError::Invalid(format!(
                    "theme {:?} has a blank keyword",
                    theme.name
                )));
            }
            let lowered = theme.name.to_lowercase();
            if themes[..idx]
                .iter()
                .any(|other| other.name.to_lowercase() == lowered)
            {
                return Err(DataLoadError::Invalid(format!(
                    "theme {:?} is declared twice",
                    theme.name
                )));
            }
        }
        if categories.iter().all(|category| category.phrases.is_empty()) {
            return Err(DataLoadError::Invalid(
                "no connector phrases defined".to_string(),
            ));
        }
        Ok(Self {
            themes,
            categories,
            origin: DataOrigin::Inline,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_parts_unchecked(
        themes: Vec<Theme>,
        categories: Vec<ConnectorCategory>,
    ) -> Self {
        Self {
            themes,
            categories,
            origin: DataOrigin::Inline,
        }
    }

    /// Reads `temas.json` and `conectores.json` from `dir`.
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self, DataLoadError> {
        let dir = dir.as_ref();
        let themes_path = dir.join(THEMES_FILE);
        let connectors_path = dir.join(CONNECTORS_FILE);
        let themes = read_file(&themes_path)?;
        let connectors = read_file(&connectors_path)?;
        let mut store = Self::parse(&themes, themes_path, &connectors, connectors_path)?;
        store.origin = DataOrigin::Directory(dir.to_path_buf());
        Ok(store)
    }

    /// Parses both dataset documents from memory.
    pub fn from_json(themes: &str, connectors: &str) -> Result<Self, DataLoadError> {
        Self::parse(
            themes,
            PathBuf::from(THEMES_FILE),
            connectors,
            PathBuf::from(CONNECTORS_FILE),
        )
    }

    fn parse(
        themes: &str,
        themes_path: PathBuf,
        connectors: &str,
        connectors_path: PathBuf,
    ) -> Result<Self, DataLoadError> {
        let themes = parse_entries::<ThemeRecord>(themes).map_err(|source| {
            DataLoadError::Parse {
                path: themes_path,
                source,
            }
        })?;
        let connectors = parse_entries::<Vec<String>>(connectors).map_err(|source| {
            DataLoadError::Parse {
                path: connectors_path,
                source,
            }
        })?;
        let themes = themes
            .into_iter()
            .map(|(name, record)| Theme {
                name,
                keywords: record.keywords,
                description: record.description,
                weight: record.weight,
            })
            .collect();
        let categories = connectors
            .into_iter()
            .map(|(name, phrases)| ConnectorCategory { name, phrases })
            .collect();
        Self::new(themes, categories)
    }

    /// The embedded dataset used whenever the data directory is unusable.
    pub fn fallback() -> Self {
        let themes = FALLBACK_THEMES
            .iter()
            .map(|(name, description, keywords)| Theme {
                name: name.to_string(),
                keywords: keywords.iter().map(|kw| kw.to_string()).collect(),
                description: description.to_string(),
                weight: default_weight(),
            })
            .collect();
        let categories = FALLBACK_CONNECTORS
            .iter()
            .map(|(name, phrases)| ConnectorCategory {
                name: name.to_string(),
                phrases: phrases.iter().map(|p| p.to_string()).collect(),
            })
            .collect();
        Self {
            themes,
            categories,
            origin: DataOrigin::Fallback,
        }
    }

    /// Loads from `dir`, substituting the embedded dataset on any failure.
    pub fn load_or_fallback(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        match Self::load_from(dir) {
            Ok(store) => {
                debug!(
                    dir = %dir.display(),
                    themes = store.themes.len(),
                    connectors = store.connector_count(),
                    "Loaded dataset"
                );
                store
            }
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Could not load dataset, using fallback data");
                Self::fallback()
            }
        }
    }

    pub fn origin(&self) -> &DataOrigin {
        &self.origin
    }

    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    pub fn categories(&self) -> &[ConnectorCategory] {
        &self.categories
    }

    pub fn theme(&self, name: &str) -> Option<&Theme> {
        self.themes.iter().find(|theme| theme.name == name)
    }

    pub fn theme_names(&self) -> Vec<&str> {
        self.themes.iter().map(|theme| theme.name.as_str()).collect()
    }

    /// Keywords of `theme`, or an empty slice for unknown names.
    pub fn keywords_of(&self, theme: &str) -> &[String] {
        self.theme(theme)
            .map(|theme| theme.keywords.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_connectors(&self) -> Vec<&str> {
        self.categories
            .iter()
            .flat_map(|category| category.phrases.iter().map(String::as_str))
            .collect()
    }

    pub fn connectors_in(&self, category: &str) -> &[String] {
        self.categories
            .iter()
            .find(|candidate| candidate.name == category)
            .map(|category| category.phrases.as_slice())
            .unwrap_or(&[])
    }

    fn connector_count(&self) -> usize {
        self.categories
            .iter()
            .map(|category| category.phrases.len())
            .sum()
    }

    /// Finds the theme referenced by `input`, case-insensitively.
    ///
    /// Theme names are checked before keywords, so "blockchain na viagem"
    /// resolves to `viagem` even though `blockchain` belongs to an earlier
    /// theme.
    pub fn match_theme(&self, input: &str) -> Option<&str> {
        let haystack = input.to_lowercase();
        self.themes
            .iter()
            .find(|theme| haystack.contains(&theme.name.to_lowercase()))
            .or_else(|| {
                self.themes.iter().find(|theme| {
                    theme
                        .keywords
                        .iter()
                        .any(|kw| haystack.contains(&kw.to_lowercase()))
                })
            })
            .map(|theme| theme.name.as_str())
    }

    pub fn stats(&self) -> StoreStats {
        let themes = self
            .themes
            .iter()
            .map(|theme| ThemeStats {
                name: theme.name.clone(),
                keyword_count: theme.keywords.len(),
                description: theme.description.clone(),
                weight: theme.weight,
            })
            .collect();
        let connectors = self
            .categories
            .iter()
            .map(|category| (category.name.clone(), category.phrases.len()))
            .collect();
        StoreStats {
            themes,
            connectors,
            total_themes: self.themes.len(),
            total_connectors: self.connector_count(),
        }
    }
}

fn read_file(path: &Path) -> Result<String, DataLoadError> {
    fs::read_to_string(path).map_err(|source| DataLoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ThemeStats {
    #[serde(skip)]
    pub name: String,
    pub keyword_count: usize,
    pub description: String,
    pub weight: f64,
}

/// Dataset summary; serializes with theme and category maps in store order.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub themes: Vec<ThemeStats>,
    pub connectors: Vec<(String, usize)>,
    pub total_themes: usize,
    pub total_connectors: usize,
}

impl Serialize for StoreStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        struct ThemeMap<'a>(&'a [ThemeStats]);
        struct CountMap<'a>(&'a [(String, usize)]);

        impl Serialize for ThemeMap<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_map(self.0.iter().map(|stats| (stats.name.as_str(), stats)))
            }
        }

        impl Serialize for CountMap<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_map(self.0.iter().map(|(name, count)| (name.as_str(), count)))
            }
        }

        let mut state = serializer.serialize_struct("StoreStats", 4)?;
        state.serialize_field("temas", &ThemeMap(&self.themes))?;
        state.serialize_field("conectores", &CountMap(&self.connectors))?;
        state.serialize_field("total_temas", &self.total_themes)?;
        state.serialize_field("total_conectores", &self.total_connectors)?;
        state.end()
    }
}
