//! Model selection for the AI phase

/// Cost-ascending priority order for model selection
pub const MODEL_PRIORITY: &[&str] = &[
    "openai/gpt-3.5-turbo",
    "anthropic/claude-3-haiku",
    "google/gemini-pro",
    "openai/gpt-4",
    "anthropic/claude-3-opus",
];

/// Fallback when a rule declares no compatible models
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

/// Pick the cheapest compatible model.
///
/// Walks the priority list and returns the first entry the rule declares
/// compatible. Falls back to the rule's first compatible model when none
/// are in the list, or to [`DEFAULT_MODEL`] when the rule declares none.
pub fn select_model(compatible_models: &[String]) -> String {
    if compatible_models.is_empty() {
        return DEFAULT_MODEL.to_string();
    }

    for candidate in MODEL_PRIORITY {
        if compatible_models.iter().any(|m| m == candidate) {
            return (*candidate).to_string();
        }
    }

    compatible_models[0].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prefers_cheapest_in_priority_order() {
        let compatible = models(&["anthropic/claude-3-opus", "anthropic/claude-3-haiku"]);
        assert_eq!(select_model(&compatible), "anthropic/claude-3-haiku");
    }

    #[test]
    fn test_falls_back_to_first_compatible() {
        let compatible = models(&["custom/model-a", "custom/model-b"]);
        assert_eq!(select_model(&compatible), "custom/model-a");
    }

    #[test]
    fn test_empty_list_uses_default() {
        assert_eq!(select_model(&[]), DEFAULT_MODEL);
    }
}
