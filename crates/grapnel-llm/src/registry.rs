//! Static provider registry
//!
//! Maps model ids to provider constructors through a priority-ordered table
//! of regex patterns. Providers link in statically; registering a new one
//! means adding a table entry.

use crate::{MockProvider, OllamaProvider};
use grapnel_domain::{InferenceError, LanguageModel};
use regex::Regex;
use std::sync::OnceLock;

type Constructor = fn(&str) -> Box<dyn LanguageModel>;

struct ProviderEntry {
    /// Lower wins when several patterns match
    priority: u8,
    pattern: &'static str,
    build: Constructor,
}

static PROVIDERS: &[ProviderEntry] = &[
    ProviderEntry {
        priority: 0,
        pattern: r"^mock(?:$|:)",
        build: |_| Box::new(MockProvider::default()),
    },
    ProviderEntry {
        priority: 10,
        pattern: r"^ollama/.+",
        build: |id| {
            let model = id.trim_start_matches("ollama/");
            Box::new(OllamaProvider::default_endpoint(model))
        },
    },
    // Bare local model families default to Ollama
    ProviderEntry {
        priority: 20,
        pattern: r"^(llama|mistral|mixtral|gemma|qwen|phi|deepseek)[\w.:-]*$",
        build: |id| Box::new(OllamaProvider::default_endpoint(id)),
    },
];

fn compiled() -> &'static Vec<Regex> {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PROVIDERS
            .iter()
            .map(|entry| Regex::new(entry.pattern).expect("static pattern"))
            .collect()
    })
}

/// Resolve a model id to a provider
///
/// Entries are tried in priority order; an id no pattern matches is a
/// configuration error.
pub fn resolve(model_id: &str) -> Result<Box<dyn LanguageModel>, InferenceError> {
    let mut order: Vec<usize> = (0..PROVIDERS.len()).collect();
    order.sort_by_key(|&i| PROVIDERS[i].priority);

    for i in order {
        if compiled()[i].is_match(model_id) {
            return Ok((PROVIDERS[i].build)(model_id));
        }
    }

    Err(InferenceError::Config(format!(
        "no provider registered for model id '{}'",
        model_id
    )))
}
