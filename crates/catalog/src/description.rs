//! Structured fields parsed out of a free-text product description.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Labelled description fields, in extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionField {
    Sizes,
    Color,
    Material,
    Includes,
    WashingInstructions,
    Brand,
}

impl DescriptionField {
    pub const ALL: [DescriptionField; 6] = [
        DescriptionField::Sizes,
        DescriptionField::Color,
        DescriptionField::Material,
        DescriptionField::Includes,
        DescriptionField::WashingInstructions,
        DescriptionField::Brand,
    ];

    fn labels(self) -> &'static str {
        match self {
            DescriptionField::Sizes => {
                r"Size:|Available in the following sizes:|Available in below sizes:"
            }
            DescriptionField::Color => r"Colour:|Color:",
            DescriptionField::Material => r"Material:",
            DescriptionField::Includes => r"Includes:",
            DescriptionField::WashingInstructions => r"Washing Instructions:|Washing:",
            DescriptionField::Brand => r"Brand:",
        }
    }
}

struct FieldPattern {
    field: DescriptionField,
    capture: Regex,
    strip: Regex,
}

static FIELD_PATTERNS: LazyLock<Vec<FieldPattern>> = LazyLock::new(|| {
    DescriptionField::ALL
        .iter()
        .map(|&field| FieldPattern {
            field,
            capture: Regex::new(&format!(r"(?i)(?:{})\s*(.*?)(?:\n|$)", field.labels()))
                .expect("static description pattern"),
            strip: Regex::new(&format!(r"(?i)(?:{})\s*.*?(?:\n|$)", field.labels()))
                .expect("static description pattern"),
        })
        .collect()
});

/// Extracted product detail for a resolved page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    /// Raw description text as found on the page.
    pub description: String,
    /// Description with every labelled field line removed.
    pub main_description: String,
    pub sizes: String,
    pub color: String,
    pub material: String,
    pub includes: String,
    pub washing_instructions: String,
    pub brand: String,
    pub image_urls: Vec<String>,
}

impl ProductDetails {
    /// Parse labelled fields out of `description`.
    ///
    /// Blank lines are dropped and the remaining lines trimmed before matching.
    /// A field that is absent parses as an empty string.
    pub fn from_description(description: &str, image_urls: Vec<String>) -> Self {
        let text = description
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let mut details = ProductDetails {
            description: description.to_string(),
            image_urls,
            ..Default::default()
        };

        let mut remaining = text.clone();
        for pattern in FIELD_PATTERNS.iter() {
            let value = pattern
                .capture
                .captures(&text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            *details.field_mut(pattern.field) = value;
            remaining = pattern.strip.replace_all(&remaining, "").into_owned();
        }
        details.main_description = remaining.trim().to_string();

        details
    }

    pub fn field(&self, field: DescriptionField) -> &str {
        match field {
            DescriptionField::Sizes => &self.sizes,
            DescriptionField::Color => &self.color,
            DescriptionField::Material => &self.material,
            DescriptionField::Includes => &self.includes,
            DescriptionField::WashingInstructions => &self.washing_instructions,
            DescriptionField::Brand => &self.brand,
        }
    }

    fn field_mut(&mut self, field: DescriptionField) -> &mut String {
        match field {
            DescriptionField::Sizes => &mut self.sizes,
            DescriptionField::Color => &mut self.color,
            DescriptionField::Material => &mut self.material,
            DescriptionField::Includes => &mut self.includes,
            DescriptionField::WashingInstructions => &mut self.washing_instructions,
            DescriptionField::Brand => &mut self.brand,
        }
    }

    /// Image URLs joined the way result artifacts store them.
    pub fn joined_image_urls(&self) -> String {
        self.image_urls.join("|")
    }
}

/// Keep only full-size catalog images, dropping thumbnails.
pub fn is_catalog_image(src: &str) -> bool {
    src.contains("/media/catalog/product/") && !src.contains("/560x560/")
}
