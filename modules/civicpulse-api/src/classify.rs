//! Filling in what the citizen didn't say.
//!
//! Smart-create accepts title, category, urgency and department from an
//! upstream classifier. Whatever is still missing is asked of a
//! [`Classifier`] before the report reaches the store.

use async_trait::async_trait;

use civicpulse_store::NewReport;

const TITLE_WORDS: usize = 8;
const FALLBACK_TITLE: &str = "Citizen report";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub title: String,
    pub category: String,
    pub urgency: String,
    pub assigned_department: String,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: Option<&str>) -> Classification;
}

/// Offline classifier: title from the opening words, everything else generic.
pub struct FallbackClassifier;

#[async_trait]
impl Classifier for FallbackClassifier {
    async fn classify(&self, text: Option<&str>) -> Classification {
        Classification {
            title: title_from(text),
            category: "Other".to_string(),
            urgency: "Medium".to_string(),
            assigned_department: "General".to_string(),
        }
    }
}

fn title_from(text: Option<&str>) -> String {
    let words: Vec<&str> = text
        .unwrap_or_default()
        .split_whitespace()
        .take(TITLE_WORDS)
        .collect();
    if words.is_empty() {
        return FALLBACK_TITLE.to_string();
    }
    let title = words.join(" ");
    match title.char_indices().nth(civicpulse_store::validate::MAX_TITLE_LEN) {
        Some((cut, _)) => title[..cut].to_string(),
        None => title,
    }
}

fn missing(field: &Option<String>) -> bool {
    field.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Fill absent classification fields. Supplied values are kept as-is.
pub async fn complete(mut input: NewReport, classifier: &dyn Classifier) -> NewReport {
    let needs_classifier = missing(&input.title)
        || missing(&input.category)
        || missing(&input.urgency)
        || missing(&input.assigned_department);
    if !needs_classifier {
        return input;
    }

    let c = classifier.classify(input.original_text.as_deref()).await;
    if missing(&input.title) {
        input.title = Some(c.title);
    }
    if missing(&input.category) {
        input.category = Some(c.category);
    }
    if missing(&input.urgency) {
        input.urgency = Some(c.urgency);
    }
    if missing(&input.assigned_department) {
        input.assigned_department = Some(c.assigned_department);
    }
    input
}
