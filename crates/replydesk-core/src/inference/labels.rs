//! Closed label sets for classification and sentiment.
//!
//! The model answers in free text. Answers are normalized and matched
//! against the known labels; anything else becomes `Unclassified` rather
//! than being passed through.

use serde::{Deserialize, Serialize};

/// Customer email category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Questions about products.
    #[serde(rename = "product questions")]
    ProductQuestions,
    /// Shipping and delivery.
    Shipping,
    /// Returns and refunds.
    Returns,
    /// Sizing and fit.
    Sizing,
    /// Recognized as none of the above.
    Other,
    /// The model's answer was not one of the labels.
    Unclassified,
}

impl Category {
    /// Labels offered to the model, in prompt order.
    pub const PROMPT_LABELS: [Self; 5] = [
        Self::ProductQuestions,
        Self::Shipping,
        Self::Returns,
        Self::Sizing,
        Self::Other,
    ];

    /// Label text as used in prompts and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProductQuestions => "product questions",
            Self::Shipping => "shipping",
            Self::Returns => "returns",
            Self::Sizing => "sizing",
            Self::Other => "other",
            Self::Unclassified => "unclassified",
        }
    }

    /// Maps a model answer to a category.
    #[must_use]
    pub fn from_model_output(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "product questions" | "product question" | "product" => Self::ProductQuestions,
            "shipping" | "shipment" | "delivery" => Self::Shipping,
            "returns" | "return" | "refund" | "refunds" => Self::Returns,
            "sizing" | "size" => Self::Sizing,
            "other" => Self::Other,
            _ => Self::Unclassified,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer email sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    /// Positive.
    Positive,
    /// Neutral.
    Neutral,
    /// Negative.
    Negative,
    /// The model's answer was not one of the labels.
    Unclassified,
}

impl Sentiment {
    /// Label text as used in prompts and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Unclassified => "unclassified",
        }
    }

    /// Maps a model answer to a sentiment.
    #[must_use]
    pub fn from_model_output(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "positive" => Self::Positive,
            "neutral" => Self::Neutral,
            "negative" => Self::Negative,
            _ => Self::Unclassified,
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercases, strips surrounding quotes/punctuation, an optional
/// `label:` prefix, and collapses inner whitespace.
fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let without_prefix = ["category:", "sentiment:"]
        .iter()
        .find_map(|p| lowered.strip_prefix(p))
        .unwrap_or(&lowered);
    without_prefix
        .trim_matches(|c: char| !c.is_alphanumeric())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
