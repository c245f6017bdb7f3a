// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Deserializer, Serialize};

/// One catalog entry, decoupled from the backend's row shape so we own the API boundary.
///
/// `visited` is never persisted; it is derived from the visited overlay at read time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Runestone {
    pub id: i64,
    #[serde(default)]
    pub signature_text: Option<String>,
    #[serde(default)]
    pub found_location: Option<String>,
    #[serde(default)]
    pub parish: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub current_location: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub material_type: Option<String>,
    #[serde(default)]
    pub rune_type: Option<String>,
    #[serde(default)]
    pub dating: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub carver: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub english_translation: Option<String>,
    #[serde(default)]
    pub swedish_translation: Option<String>,
    /// Text in the original runic script
    #[serde(default)]
    pub norse_text: Option<String>,
    #[serde(default)]
    pub transliteration: Option<String>,
    #[serde(default)]
    pub lost: bool,
    #[serde(default)]
    pub ornamental: bool,
    /// Recently discovered
    #[serde(default)]
    pub recent: bool,
    #[serde(default)]
    pub visited: bool,
    /// Deep-link key, treated as unique for lookups
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub direct_url: Option<String>,
}

impl Runestone {
    /// Text fields consulted by free-text search, in match order.
    pub fn search_fields(&self) -> [Option<&str>; 16] {
        [
            self.signature_text.as_deref(),
            self.found_location.as_deref(),
            self.parish.as_deref(),
            self.district.as_deref(),
            self.municipality.as_deref(),
            self.current_location.as_deref(),
            self.material.as_deref(),
            self.material_type.as_deref(),
            self.rune_type.as_deref(),
            self.dating.as_deref(),
            self.style.as_deref(),
            self.carver.as_deref(),
            self.english_translation.as_deref(),
            self.swedish_translation.as_deref(),
            self.norse_text.as_deref(),
            self.transliteration.as_deref(),
        ]
    }

    /// `term` must already be lowercased and trimmed.
    pub fn matches(&self, term: &str) -> bool {
        self.search_fields()
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(term))
    }

    /// Replace non-finite coordinates with 0.0.
    pub fn normalized(mut self) -> Self {
        self.latitude = coordinate(Some(self.latitude));
        self.longitude = coordinate(Some(self.longitude));
        self
    }

    /// Copy with the derived `visited` flag replaced.
    pub fn with_visited(&self, visited: bool) -> Self {
        Self {
            visited,
            ..self.clone()
        }
    }
}

/// Row as returned by the catalog RPC functions.
///
/// Every column is optional on the wire; [`Runestone::from`] normalizes it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunestoneRow {
    pub id: i64,
    #[serde(default)]
    pub signature_text: Option<String>,
    #[serde(default)]
    pub found_location: Option<String>,
    #[serde(default)]
    pub parish: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub current_location: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub material_type: Option<String>,
    #[serde(default)]
    pub rune_type: Option<String>,
    #[serde(default)]
    pub dating: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub carver: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub english_translation: Option<String>,
    #[serde(default)]
    pub swedish_translation: Option<String>,
    #[serde(default)]
    pub norse_text: Option<String>,
    #[serde(default)]
    pub transliteration: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub lost: bool,
    #[serde(default, deserialize_with = "flag")]
    pub ornamental: bool,
    #[serde(default, deserialize_with = "flag")]
    pub recent: bool,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub direct_url: Option<String>,
}

impl From<RunestoneRow> for Runestone {
    fn from(row: RunestoneRow) -> Self {
        Self {
            id: row.id,
            signature_text: non_empty(row.signature_text),
            found_location: non_empty(row.found_location),
            parish: non_empty(row.parish),
            district: non_empty(row.district),
            municipality: non_empty(row.municipality),
            current_location: non_empty(row.current_location),
            material: non_empty(row.material),
            material_type: non_empty(row.material_type),
            rune_type: non_empty(row.rune_type),
            dating: non_empty(row.dating),
            style: non_empty(row.style),
            carver: non_empty(row.carver),
            latitude: coordinate(row.latitude),
            longitude: coordinate(row.longitude),
            english_translation: non_empty(row.english_translation),
            swedish_translation: non_empty(row.swedish_translation),
            norse_text: non_empty(row.norse_text),
            transliteration: non_empty(row.transliteration),
            lost: row.lost,
            ornamental: row.ornamental,
            recent: row.recent,
            visited: false,
            slug: non_empty(row.slug),
            link_url: non_empty(row.link_url),
            direct_url: non_empty(row.direct_url),
        }
    }
}

/// Row returned by the visited-list RPC; only the id matters.
#[derive(Debug, Clone, Deserialize)]
pub struct VisitedRow {
    pub id: i64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Missing or non-finite coordinates collapse to 0.0 so bounds math stays total.
pub fn coordinate(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Accepts `true`/`false`, `0`/`1` and `null`.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => matches!(s.as_str(), "true" | "1" | "t"),
        _ => false,
    })
}
