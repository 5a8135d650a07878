use std::collections::HashSet;
use std::sync::LazyLock;

use harvester_core::models::{Nutrition, RecipeRecord, collapse_ws};
use harvester_core::traits::Extractor;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

struct Selectors {
    recipe_root: Selector,
    info_root: Selector,
    name_meta: Selector,
    name: Selector,
    h1: Selector,
    description: Selector,
    author: Selector,
    total_time: Selector,
    servings: Selector,
    rating_value: Selector,
    rating_count: Selector,
    calories: Selector,
    og_image: Selector,
    ingredients: Selector,
    equipment: Selector,
    breadcrumbs: Selector,
    tags: Selector,
    instruction_items: Selector,
    instruction_parts: Selector,
    instruction_containers: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    recipe_root: selector(r#"section[itemtype="http://schema.org/Recipe"]"#),
    info_root: selector("#pt_info"),
    name_meta: selector(r#"meta[itemprop="name"]"#),
    name: selector(r#"[itemprop="name"]"#),
    h1: selector("h1"),
    description: selector(r#"[itemprop="description"]"#),
    author: selector(r#"[itemprop="author"] [itemprop="name"]"#),
    total_time: selector(r#"[itemprop="totalTime"]"#),
    servings: selector(r#"[itemprop="recipeYield"]"#),
    rating_value: selector(r#"[itemprop="ratingValue"]"#),
    rating_count: selector(r#"[itemprop="reviewCount"]"#),
    calories: selector(r#"[itemprop="calories"]"#),
    og_image: selector(r#"meta[property="og:image"]"#),
    ingredients: selector(r#"meta[itemprop="recipeIngredient"]"#),
    equipment: selector(".recipe-equipment li"),
    breadcrumbs: selector("ol.breadcrumbs li span[itemprop='name']"),
    tags: selector(".sims-tags-line a, .catalogs-list-grid a, .catalogs-list-grid .item a"),
    instruction_items: selector("ol.instructions li, .instructions li"),
    instruction_parts: selector(
        r#"[itemprop="recipeInstructions"] p, [itemprop="recipeInstructions"] li"#,
    ),
    instruction_containers: selector(r#"[itemprop="recipeInstructions"]"#),
});

static NUTRINFO_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"(?s)nutrinfo\s*:\s*(\{.*?\})"));

/// Inline ad scripts that leak into step text. Each runs up to the next step
/// heading, which is kept.
static NOISE_RES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        regex(r"(?i)if\(general_glob_settings[\s\S]+?(ШАГ\s+\d+\.|$)"),
        regex(r"(?i)\(adsbygoogle\s*=\s*window\.adsbygoogle[\s\S]+?(ШАГ\s+\d+\.|$)"),
        regex(r"(?i)\(function\(w,\s*d,\s*n,\s*s,\s*t\)[\s\S]+?(Шаг\s+\d+:|$)"),
    ]
});

static AD_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)\bРеклама\b"));

const AD_MARKERS: [&str; 7] = [
    "adfox",
    "adsbygoogle",
    "ya.adfox",
    "yacontextcb",
    "google-ya",
    "iface.jsappend",
    "(function(",
];

const AD_STEP_CLASS: &str = "as-ad-step";

/// Extracts [`RecipeRecord`]s from 1000.menu recipe pages.
///
/// A page counts as a recipe only if it has a schema.org Recipe section (or
/// the `#pt_info` block) and yields a title, at least one ingredient and at
/// least one instruction step.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecipeParser;

impl RecipeParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, html: &str, url: &str) -> Option<RecipeRecord> {
        let s = &*SELECTORS;
        let document = Html::parse_document(html);
        let root = document
            .select(&s.recipe_root)
            .next()
            .or_else(|| document.select(&s.info_root).next())?;

        let title = first_meta(root, &s.name_meta)
            .or_else(|| first_meta(root, &s.name))
            .or_else(|| first_text(document.root_element(), &s.h1))?;
        let ingredients = gather_meta_list(&document, &s.ingredients);
        let instructions = collect_instructions(&document);
        if ingredients.is_empty() || instructions.is_empty() {
            return None;
        }

        let mut record =
            RecipeRecord::new(title, instructions.join("\n"), ingredients.join(", "), url);
        record.description = first_meta(root, &s.description);
        record.author = first_meta(root, &s.author);
        record.total_time = first_meta(root, &s.total_time);
        record.servings = first_meta(root, &s.servings);
        record.rating_value = first_meta(root, &s.rating_value);
        record.rating_count = first_meta(root, &s.rating_count);
        record.calories = first_text(document.root_element(), &s.calories);
        record.image = first_meta(document.root_element(), &s.og_image);
        record.categories = join_non_empty(breadcrumbs(&document));
        record.equipment = join_non_empty(gather_text_list(&document, &s.equipment));
        record.tags = join_non_empty(gather_text_list(&document, &s.tags));
        record.nutrition = extract_nutrition(html);
        Some(record)
    }
}

impl Extractor for RecipeParser {
    fn extract(&self, html: &str, url: &str) -> Option<RecipeRecord> {
        self.parse(html, url)
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn join_non_empty(values: Vec<String>) -> Option<String> {
    non_empty(values.join(", "))
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_ws(&element.text().collect::<String>())
}

/// `content` attribute if present, text otherwise.
fn first_meta(root: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let node = root.select(selector).next()?;
    match node.value().attr("content").filter(|c| !c.is_empty()) {
        Some(content) => non_empty(collapse_ws(content)),
        None => non_empty(element_text(node)),
    }
}

fn first_text(root: ElementRef<'_>, selector: &Selector) -> Option<String> {
    root.select(selector).next().map(element_text).and_then(non_empty)
}

fn dedupe(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

fn gather_meta_list(document: &Html, selector: &Selector) -> Vec<String> {
    dedupe(document.select(selector).map(|node| {
        match node.value().attr("content").filter(|c| !c.is_empty()) {
            Some(content) => collapse_ws(content),
            None => element_text(node),
        }
    }))
}

fn is_ad_node(element: ElementRef<'_>) -> bool {
    element
        .value()
        .attr("class")
        .is_some_and(|class| class.contains(AD_STEP_CLASS))
}

fn looks_like_ad(text: &str) -> bool {
    let lower = text.to_lowercase();
    AD_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn strip_noise(text: &str) -> String {
    let mut cleaned = text.to_string();
    for re in NOISE_RES.iter() {
        cleaned = re.replace_all(&cleaned, " ${1}").into_owned();
    }
    collapse_ws(&AD_LABEL_RE.replace_all(&cleaned, " "))
}

fn clean_chunk(chunk: &str) -> Option<String> {
    let cleaned = strip_noise(chunk);
    (!cleaned.is_empty() && !looks_like_ad(&cleaned)).then_some(cleaned)
}

fn gather_text_list(document: &Html, selector: &Selector) -> Vec<String> {
    dedupe(
        document
            .select(selector)
            .filter(|node| !is_ad_node(*node))
            .filter_map(|node| clean_chunk(&node.text().collect::<String>())),
    )
}

fn breadcrumbs(document: &Html) -> Vec<String> {
    document
        .select(&SELECTORS.breadcrumbs)
        .map(element_text)
        .filter(|crumb| !crumb.is_empty() && crumb.to_lowercase() != "главная")
        .collect()
}

fn collect_instructions(document: &Html) -> Vec<String> {
    let s = &*SELECTORS;
    let mut steps = gather_text_list(document, &s.instruction_items);
    for node in document
        .select(&s.instruction_parts)
        .chain(document.select(&s.instruction_containers))
    {
        if is_ad_node(node) {
            continue;
        }
        steps.extend(block_lines(node).iter().filter_map(|line| clean_chunk(line)));
    }
    dedupe(steps)
}

/// Text of `element` split into lines at `<br>` and block boundaries.
/// Scripts, styles and ad steps are skipped.
fn block_lines(element: ElementRef<'_>) -> Vec<String> {
    let mut raw = String::new();
    push_block_text(element, &mut raw);
    raw.split('\n')
        .map(collapse_ws)
        .filter(|line| !line.is_empty())
        .collect()
}

fn push_block_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&text.replace('\n', " "));
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        if is_ad_node(child) {
            continue;
        }
        match child.value().name() {
            "script" | "style" | "noscript" => {}
            "br" => out.push('\n'),
            "p" | "li" | "div" | "ol" | "ul" | "h1" | "h2" | "h3" | "h4" => {
                out.push('\n');
                push_block_text(child, out);
                out.push('\n');
            }
            _ => {
                out.push(' ');
                push_block_text(child, out);
                out.push(' ');
            }
        }
    }
}

fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn value_to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse the `nutrinfo: {...}` object embedded in the page script.
fn extract_nutrition(html: &str) -> Nutrition {
    let Some(payload) = NUTRINFO_RE.captures(html).and_then(|c| c.get(1)) else {
        return Nutrition::default();
    };
    let Ok(Value::Object(data)) = serde_json::from_str::<Value>(payload.as_str()) else {
        return Nutrition::default();
    };

    let cals = value_to_f64(data.get("cals"));
    let weight = value_to_f64(data.get("total_weight"));
    let calories_total = match (cals, weight) {
        (Some(cals), Some(weight)) if cals != 0.0 && weight != 0.0 => {
            Some(format!("{}", (cals * weight / 100.0).round() as i64))
        }
        _ => None,
    };

    Nutrition {
        protein_percent: value_to_string(data.get("ratio_p")),
        protein_grams: value_to_string(data.get("p")),
        fat_percent: value_to_string(data.get("ratio_f")),
        fat_grams: value_to_string(data.get("f")),
        carb_percent: value_to_string(data.get("ratio_c")),
        carb_grams: value_to_string(data.get("c")),
        calories_per_100g: value_to_string(data.get("cals")),
        calories_total,
        gi_min: value_to_string(data.get("ratio_cn")),
        gi_avg: value_to_string(data.get("ratio_cs")),
        gi_max: value_to_string(data.get("ratio_cv")),
        total_weight_grams: value_to_string(data.get("total_weight")),
    }
}
