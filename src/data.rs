use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub const THEMES_FILE: &str = "temas.json";
pub const CONNECTORS_FILE: &str = "conectores.json";

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeRecord {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

pub fn default_weight() -> f64 {
    1.0
}

/// Decodes a JSON object into its entries in document order.
///
/// Relies on serde_json's `preserve_order` feature; theme order is observable
/// through matching.
pub fn parse_entries<V>(text: &str) -> Result<Vec<(String, V)>, serde_json::Error>
where
    V: DeserializeOwned,
{
    let object: Map<String, Value> = serde_json::from_str(text)?;
    object
        .into_iter()
        .map(|(key, value)| serde_json::from_value(value).map(|value| (key, value)))
        .collect()
}

pub const FALLBACK_THEMES: &[(&str, &str, &[&str])] = &[
    (
        "tecnologia",
        "Temas relacionados à tecnologia",
        &[
            "microchip",
            "blockchain",
            "metaverso",
            "computação quântica",
            "big data",
        ],
    ),
    (
        "saúde",
        "Temas relacionados à saúde",
        &["nutrição", "sono", "imunidade", "exercício", "microbioma"],
    ),
    (
        "viagem",
        "Temas relacionados a viagens",
        &[
            "espaço",
            "oceano",
            "montanha",
            "deserto",
            "floresta tropical",
        ],
    ),
    (
        "comida",
        "Temas relacionados à alimentação",
        &[
            "vegetariana",
            "fermentada",
            "molecular",
            "sustentável",
            "sabor umami",
        ],
    ),
];

pub const FALLBACK_CONNECTORS: &[(&str, &[&str])] = &[(
    "conectores_energia",
    &[
        "alimentado por cristais de",
        "usando a energia cinética de",
        "escondido no espectro de",
        "com a única finalidade de treinar",
        "que na verdade é um disfarce para",
    ],
)];
