//! Item extraction: turning one listing element into a raw record

use crate::config::ExtractConfig;
use crate::{ExtractionError, HarvestError};
use scraper::{ElementRef, Selector};
use serde_json::Value;

/// A raw item record handed to the downstream data pipeline
pub type Record = serde_json::Map<String, Value>;

/// Turns one item element into a record
///
/// Called once per matched item element. An error affects that item only;
/// the rest of the page is still extracted.
pub trait Extractor: Send + Sync {
    fn extract(&self, element: ElementRef<'_>) -> Result<Record, ExtractionError>;
}

impl<F> Extractor for F
where
    F: Fn(ElementRef<'_>) -> Result<Record, ExtractionError> + Send + Sync,
{
    fn extract(&self, element: ElementRef<'_>) -> Result<Record, ExtractionError> {
        self(element)
    }
}

/// Fields extracted when none are configured
const DEFAULT_FIELDS: &[(&str, &str)] = &[
    ("name", ".product-item__title"),
    ("brand", ".product-item__vendor"),
    ("current_price", ".price--highlight"),
    ("original_price", ".price--compare"),
    ("sale_label", ".product-label--on-sale"),
    ("availability", ".product-item__inventory"),
    ("rating", ".stamped-badge@data-rating"),
    ("product_url", ".product-item__title@href"),
    ("image_url", "img@src"),
];

#[derive(Debug, Clone)]
struct FieldRule {
    name: String,
    selector: Selector,
    attribute: Option<String>,
}

/// Extracts configured fields with CSS selectors
///
/// Each field maps to `selector` (trimmed text of the first match) or
/// `selector@attr` (that attribute of the first match). Values are kept as
/// raw strings; normalizing prices or availability is left to the
/// downstream pipeline.
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    rules: Vec<FieldRule>,
    required: Vec<String>,
}

impl SelectorExtractor {
    /// Builds the extractor from `[extract]`
    ///
    /// Without configured fields the product-listing defaults are used and
    /// `name` is required.
    pub fn from_config(config: &ExtractConfig) -> Result<Self, HarvestError> {
        let (fields, required): (Vec<(String, String)>, Vec<String>) = if config.fields.is_empty() {
            (
                DEFAULT_FIELDS
                    .iter()
                    .map(|(n, s)| (n.to_string(), s.to_string()))
                    .collect(),
                vec!["name".to_string()],
            )
        } else {
            (
                config
                    .fields
                    .iter()
                    .map(|(n, s)| (n.clone(), s.clone()))
                    .collect(),
                config.required.clone(),
            )
        };

        let rules = fields
            .into_iter()
            .map(|(name, spec)| parse_rule(name, &spec))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules, required })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }
}

fn parse_rule(name: String, spec: &str) -> Result<FieldRule, HarvestError> {
    let (selector, attribute) = match spec.split_once('@') {
        Some((selector, attribute)) => (selector, Some(attribute.trim().to_string())),
        None => (spec, None),
    };

    let selector = Selector::parse(selector.trim()).map_err(|e| HarvestError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })?;

    Ok(FieldRule {
        name,
        selector,
        attribute,
    })
}

impl Extractor for SelectorExtractor {
    fn extract(&self, element: ElementRef<'_>) -> Result<Record, ExtractionError> {
        let mut record = Record::new();

        for rule in &self.rules {
            let Some(matched) = element.select(&rule.selector).next() else {
                continue;
            };

            let value = match &rule.attribute {
                Some(attribute) => matched.value().attr(attribute).map(|v| v.trim().to_string()),
                None => Some(collapse_whitespace(matched.text())),
            };

            if let Some(value) = value.filter(|v| !v.is_empty()) {
                record.insert(rule.name.clone(), Value::String(value));
            }
        }

        if let Some(missing) = self.required.iter().find(|f| !record.contains_key(*f)) {
            return Err(ExtractionError::MissingField(missing.clone()));
        }

        Ok(record)
    }
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
