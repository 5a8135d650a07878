use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Column order of the TSV export. Written once as the header row.
pub const TSV_HEADERS: [&str; 28] = [
    "title",
    "instructions",
    "ingredients",
    "url",
    "description",
    "author",
    "total_time",
    "servings",
    "calories",
    "rating_value",
    "rating_count",
    "categories",
    "equipment",
    "tags",
    "image",
    "captured_at",
    "protein_percent",
    "protein_grams",
    "fat_percent",
    "fat_grams",
    "carb_percent",
    "carb_grams",
    "calories_per_100g",
    "calories_total",
    "gi_min",
    "gi_avg",
    "gi_max",
    "total_weight_grams",
];

/// Nutrition block of a recipe page. Every field is optional because the
/// site omits the block entirely on many pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nutrition {
    pub protein_percent: Option<String>,
    pub protein_grams: Option<String>,
    pub fat_percent: Option<String>,
    pub fat_grams: Option<String>,
    pub carb_percent: Option<String>,
    pub carb_grams: Option<String>,
    pub calories_per_100g: Option<String>,
    pub calories_total: Option<String>,
    pub gi_min: Option<String>,
    pub gi_avg: Option<String>,
    pub gi_max: Option<String>,
    pub total_weight_grams: Option<String>,
}

/// A harvested recipe, as produced by an [`crate::traits::Extractor`].
///
/// Immutable once built: the fetch worker hands it to the result sink and
/// never touches it again.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeRecord {
    pub title: String,
    pub instructions: String,
    pub ingredients: String,
    pub url: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub total_time: Option<String>,
    pub servings: Option<String>,
    pub calories: Option<String>,
    pub rating_value: Option<String>,
    pub rating_count: Option<String>,
    pub categories: Option<String>,
    pub equipment: Option<String>,
    pub tags: Option<String>,
    pub image: Option<String>,
    pub nutrition: Nutrition,
    pub captured_at: DateTime<Utc>,
}

impl RecipeRecord {
    /// Build a record with the mandatory fields; metadata starts empty and
    /// `captured_at` is set to now.
    pub fn new(
        title: impl Into<String>,
        instructions: impl Into<String>,
        ingredients: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            instructions: instructions.into(),
            ingredients: ingredients.into(),
            url: url.into(),
            description: None,
            author: None,
            total_time: None,
            servings: None,
            calories: None,
            rating_value: None,
            rating_count: None,
            categories: None,
            equipment: None,
            tags: None,
            image: None,
            nutrition: Nutrition::default(),
            captured_at: Utc::now(),
        }
    }

    /// Cell values in [`TSV_HEADERS`] order, whitespace-collapsed so that no
    /// cell can contain a tab or newline.
    pub fn to_row(&self) -> Vec<String> {
        let captured_at = self.captured_at.to_rfc3339_opts(SecondsFormat::Secs, false);
        let n = &self.nutrition;
        let values: [Option<&str>; 28] = [
            Some(&self.title),
            Some(&self.instructions),
            Some(&self.ingredients),
            Some(&self.url),
            self.description.as_deref(),
            self.author.as_deref(),
            self.total_time.as_deref(),
            self.servings.as_deref(),
            self.calories.as_deref(),
            self.rating_value.as_deref(),
            self.rating_count.as_deref(),
            self.categories.as_deref(),
            self.equipment.as_deref(),
            self.tags.as_deref(),
            self.image.as_deref(),
            Some(&captured_at),
            n.protein_percent.as_deref(),
            n.protein_grams.as_deref(),
            n.fat_percent.as_deref(),
            n.fat_grams.as_deref(),
            n.carb_percent.as_deref(),
            n.carb_grams.as_deref(),
            n.calories_per_100g.as_deref(),
            n.calories_total.as_deref(),
            n.gi_min.as_deref(),
            n.gi_avg.as_deref(),
            n.gi_max.as_deref(),
            n.total_weight_grams.as_deref(),
        ];
        values
            .into_iter()
            .map(|v| v.map(collapse_ws).unwrap_or_default())
            .collect()
    }

    /// The row as a flat JSON object keyed by header name (JSONL mirror).
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = TSV_HEADERS
            .iter()
            .zip(self.to_row())
            .map(|(k, v)| ((*k).to_string(), Value::String(v)))
            .collect();
        Value::Object(map)
    }
}

/// Collapse runs of whitespace (NBSP included) into single spaces and trim.
pub fn collapse_ws(value: &str) -> String {
    value
        .split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
