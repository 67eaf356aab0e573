use serde::{Deserialize, Serialize};

use super::{relay, require_finite, require_text, Bracket, RelayError, RelayPrompt};
use crate::api_connection::{ChatBackend, ChatMessage, Sampling};

pub const MAX_RESULTS: usize = 5;

const SYSTEM_PROMPT: &str = "You are a nutrition expert.

Provide detailed nutritional information for the food being searched.
Return up to 5 different variations or portions of the food.

Return ONLY a valid JSON object:
{
  \"results\": [
    {
      \"name\": \"full food name\",
      \"calories\": number,
      \"protein\": number in grams,
      \"carbs\": number in grams,
      \"fat\": number in grams,
      \"fiber\": number in grams (optional),
      \"sugar\": number in grams (optional),
      \"servingSize\": \"serving size\"
    }
  ]
}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoodSearchResult {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugar: Option<f64>,
    pub serving_size: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FoodSearchResults {
    #[serde(default)]
    pub results: Vec<FoodSearchResult>,
}

impl FoodSearchResults {
    fn validate(&self) -> Result<(), RelayError> {
        for result in &self.results {
            require_finite("calories", result.calories)?;
            require_finite("protein", result.protein)?;
            require_finite("carbs", result.carbs)?;
            require_finite("fat", result.fat)?;
            if let Some(fiber) = result.fiber {
                require_finite("fiber", fiber)?;
            }
            if let Some(sugar) = result.sugar {
                require_finite("sugar", sugar)?;
            }
        }
        Ok(())
    }
}

pub fn build_prompt(query: &str) -> RelayPrompt {
    RelayPrompt {
        operation: "search_food",
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Find nutritional information for: {}", query)),
        ],
        sampling: Sampling {
            temperature: 0.3,
            max_tokens: 800,
        },
        bracket: Bracket::Object,
    }
}

/// Looks up nutrition facts for a free-text food name.
///
/// # Arguments
/// * `query`: the food to look up; blank or missing queries are rejected
///   before the backend is called.
///
/// # Returns
/// At most [`MAX_RESULTS`] entries, in the order the service listed them.
pub async fn search_food(
    backend: &dyn ChatBackend,
    query: Option<&str>,
) -> Result<FoodSearchResults, RelayError> {
    let query = require_text("query", query)?;
    let mut found: FoodSearchResults = relay(backend, build_prompt(query)).await?;
    found.validate()?;
    found.results.truncate(MAX_RESULTS);
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::ScriptedBackend;

    fn result_json(name: &str) -> String {
        format!(
            r#"{{"name": "{}", "calories": 130, "protein": 2.7, "carbs": 28, "fat": 0.3, "servingSize": "100 g"}}"#,
            name
        )
    }

    #[tokio::test]
    async fn test_results_are_capped() {
        let items: Vec<String> = (1..=7).map(|i| result_json(&format!("rice {}", i))).collect();
        let reply = format!("```json\n{{\"results\": [{}]}}\n```", items.join(","));
        let backend = ScriptedBackend::replying(&reply);

        let found = search_food(&backend, Some("rice")).await.unwrap();
        assert_eq!(found.results.len(), MAX_RESULTS);
        assert_eq!(found.results[0].name, "rice 1");
        assert_eq!(found.results[0].serving_size, "100 g");
        assert_eq!(found.results[0].fiber, None);

        let (messages, sampling) = backend.last_call();
        assert_eq!(messages[1].text(), "Find nutritional information for: rice");
        assert_eq!(sampling.max_tokens, 800);
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let backend = ScriptedBackend::replying("{\"results\": []}");
        assert!(search_food(&backend, None).await.unwrap_err().is_input_validation());
        assert!(search_food(&backend, Some("  ")).await.unwrap_err().is_input_validation());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_optional_fields_round_out_the_result() {
        let backend = ScriptedBackend::replying(
            r#"{"results": [{"name": "banana", "calories": 89, "protein": 1.1, "carbs": 23, "fat": 0.3, "fiber": 2.6, "sugar": 12.2, "servingSize": "1 medium"}]}"#,
        );
        let found = search_food(&backend, Some("banana")).await.unwrap();
        assert_eq!(found.results[0].fiber, Some(2.6));

        let value = serde_json::to_value(&found).unwrap();
        assert_eq!(value["results"][0]["servingSize"], "1 medium");
    }
}
