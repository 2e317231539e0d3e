use super::{upsert_record, ImportRecord, RecordMap};
use crate::conf::batch::mutation::EntityRow;
use crate::conf::serialization::Fingerprint;
use crate::conf::types::Table;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Canned query offered by search autocompletion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSuggestion {
    /// Lower-cased text
    pub id: String,
    pub text: String,
}

impl ImportRecord for SearchSuggestion {
    const TABLE: Table = Table::SearchSuggestions;

    fn id(&self) -> &str {
        &self.id
    }

    fn import_hash(&self) -> String {
        Fingerprint::new().field("text", &self.text).finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::SearchSuggestion(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct SearchSuggestionsHandler {
    suggestions: RecordMap<SearchSuggestion>,
}

impl SearchSuggestionsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suggestions are a flat array of strings
    pub fn process(&mut self, raw: &serde_json::Value) {
        let Some(items) = raw.as_array() else {
            if !raw.is_null() {
                warn!("[Parser] search_suggestions is not an array, ignoring");
            }
            return;
        };
        for item in items {
            let Some(text) = item.as_str().map(str::trim).filter(|t| !t.is_empty()) else {
                warn!("[Parser] skipping non-text search suggestion {}", item);
                continue;
            };
            upsert_record(
                &mut self.suggestions,
                SearchSuggestion {
                    id: text.to_lowercase(),
                    text: text.to_string(),
                },
            );
        }
    }

    pub fn records(&self) -> &RecordMap<SearchSuggestion> {
        &self.suggestions
    }
}
