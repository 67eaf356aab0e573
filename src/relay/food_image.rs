use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{relay, require_finite, require_text, Bracket, RelayError, RelayPrompt};
use crate::api_connection::{ChatBackend, ChatMessage, Sampling};

const DEFAULT_MIME_TYPE: &str = "image/jpeg";

const SYSTEM_PROMPT: &str = "You are a nutritionist specialised in analysing food from photos.
Identify EVERY food visible in the picture.

For each food estimate:
- the food name
- the portion size (use cutlery and plates as size references)
- calories
- protein (g)
- carbohydrates (g)
- fat (g)
- your confidence in the identification, between 0 and 1

Return ONLY a valid JSON object in this format:
{
  \"foods\": [
    {
      \"name\": \"food name\",
      \"portion\": \"estimated portion\",
      \"calories\": number,
      \"protein\": number,
      \"carbs\": number,
      \"fat\": number,
      \"confidence\": number between 0 and 1
    }
  ],
  \"totalCalories\": total of all calories
}";

const USER_PROMPT: &str =
    "Analyse this meal and identify every food with its nutritional information.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodImageRequest {
    /// Base64 image bytes, optionally as a full `data:` URL.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedFood {
    pub name: String,
    pub portion: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoodImageAnalysis {
    pub foods: Vec<DetectedFood>,
    pub total_calories: f64,
}

impl FoodImageAnalysis {
    fn validate(&self) -> Result<(), RelayError> {
        require_finite("totalCalories", self.total_calories)?;
        for food in &self.foods {
            for (field, value) in [
                ("calories", food.calories),
                ("protein", food.protein),
                ("carbs", food.carbs),
                ("fat", food.fat),
            ] {
                require_finite(field, value)?;
            }
            if !(0.0..=1.0).contains(&food.confidence) {
                return Err(RelayError::PayloadParse(format!(
                    "confidence {} for '{}' is outside [0, 1]",
                    food.confidence, food.name
                )));
            }
        }
        Ok(())
    }
}

/// Splits an optional `data:<mime>;base64,` prefix off the payload and checks
/// that what remains is valid base64.
fn normalize_image<'a>(
    image: &'a str,
    mime_type: Option<&'a str>,
) -> Result<(&'a str, &'a str), RelayError> {
    let (mime, data) = match image.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
        Some((mime, data)) => (mime, data),
        None => (mime_type.unwrap_or(DEFAULT_MIME_TYPE), image),
    };
    if !mime.starts_with("image/") {
        return Err(RelayError::InputValidation(format!(
            "unsupported image type: {}",
            mime
        )));
    }
    general_purpose::STANDARD
        .decode(data)
        .map_err(|e| RelayError::InputValidation(format!("image is not valid base64: {}", e)))?;
    Ok((mime, data))
}

pub fn build_prompt(mime_type: &str, base64_image: &str) -> RelayPrompt {
    RelayPrompt {
        operation: "analyze_food_image",
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_with_image(USER_PROMPT, mime_type, base64_image),
        ],
        sampling: Sampling {
            temperature: 0.3,
            max_tokens: 1000,
        },
        bracket: Bracket::Object,
    }
}

pub async fn analyze_food_image(
    backend: &dyn ChatBackend,
    request: &FoodImageRequest,
) -> Result<FoodImageAnalysis, RelayError> {
    let image = require_text("image", request.image.as_deref())?;
    let (mime, data) = normalize_image(image, request.mime_type.as_deref())?;
    if !backend.supports_vision() {
        warn!("configured model is not known to accept images");
    }

    let analysis: FoodImageAnalysis = relay(backend, build_prompt(mime, data)).await?;
    analysis.validate()?;
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::endpoints::{ContentPart, MessageContent};
    use crate::relay::testing::ScriptedBackend;

    fn request(image: &str) -> FoodImageRequest {
        FoodImageRequest {
            image: Some(image.to_string()),
            mime_type: None,
        }
    }

    #[tokio::test]
    async fn test_missing_image_never_reaches_backend() {
        let backend = ScriptedBackend::replying("{}");
        let err = analyze_food_image(&backend, &FoodImageRequest::default())
            .await
            .unwrap_err();
        assert!(err.is_input_validation());
        let err = analyze_food_image(&backend, &request("not base64!!")).await.unwrap_err();
        assert!(err.is_input_validation());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_prose_wrapped_reply_is_parsed() {
        let backend =
            ScriptedBackend::replying("Here is your result: {\"foods\":[],\"totalCalories\":0} thanks!");
        let analysis = analyze_food_image(&backend, &request("aGVsbG8=")).await.unwrap();
        assert_eq!(
            analysis,
            FoodImageAnalysis {
                foods: vec![],
                total_calories: 0.0
            }
        );

        let (messages, sampling) = backend.last_call();
        assert_eq!(sampling.temperature, 0.3);
        assert_eq!(sampling.max_tokens, 1000);
        match &messages[1].content {
            MessageContent::Parts(parts) => match &parts[1] {
                ContentPart::ImageUrl { image_url } => {
                    assert_eq!(image_url.url, "data:image/jpeg;base64,aGVsbG8=")
                }
                other => panic!("expected image part, got {:?}", other),
            },
            other => panic!("expected multipart content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_data_url_keeps_its_mime_type() {
        let backend = ScriptedBackend::replying("{\"foods\":[],\"totalCalories\":0}");
        analyze_food_image(&backend, &request("data:image/png;base64,aGVsbG8="))
            .await
            .unwrap();
        let (messages, _) = backend.last_call();
        let body = serde_json::to_string(&messages[1]).unwrap();
        assert!(body.contains("data:image/png;base64,aGVsbG8="));
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_rejected() {
        let reply = r#"{"foods":[{"name":"rice","portion":"1 cup","calories":200,"protein":4,"carbs":44,"fat":0.4,"confidence":1.7}],"totalCalories":200}"#;
        let backend = ScriptedBackend::replying(reply);
        let err = analyze_food_image(&backend, &request("aGVsbG8=")).await.unwrap_err();
        assert!(matches!(err, RelayError::PayloadParse(_)));
    }

    #[tokio::test]
    async fn test_reply_without_json_fails() {
        let backend = ScriptedBackend::replying("I only see a blurry table.");
        let err = analyze_food_image(&backend, &request("aGVsbG8=")).await.unwrap_err();
        assert!(matches!(err, RelayError::PayloadExtraction));
    }
}
