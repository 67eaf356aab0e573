use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use super::{relay, Bracket, RelayError, RelayPrompt};
use crate::api_connection::{ChatBackend, ChatMessage, Sampling};
use crate::profile::MealType;

pub const FALLBACK_RESPONSE: &str = "Sorry, I didn't understand that command. Please try again.";

const SYSTEM_PROMPT: &str = "You are the voice assistant of a weight-loss app.

Interpret voice commands and extract structured information.

Command types:
1. Log a meal: \"Log lunch: rice, chicken and salad\"
2. Log water: \"I drank 500ml of water\"
3. Log activity: \"I did 30 minutes of walking\"
4. Question: \"How much can I eat for dinner?\"

Return ONLY a valid JSON object:
{
  \"action\": \"log_meal\" | \"log_water\" | \"log_activity\" | \"query\" | \"unknown\",
  \"data\": {
    // For log_meal:
    \"mealType\": \"breakfast\" | \"lunch\" | \"dinner\" | \"snack\",
    \"foods\": [\"food1\", \"food2\"]

    // For log_water:
    \"amount\": number in ml

    // For log_activity:
    \"activityType\": \"type\",
    \"duration\": number in minutes

    // For query:
    \"question\": \"the user's question\"
  },
  \"response\": \"friendly reply for the user\"
}";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceCommandRequest {
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MealData {
    pub meal_type: MealType,
    #[serde(default)]
    pub foods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaterData {
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityData {
    pub activity_type: String,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryData {
    pub question: String,
}

/// What the user asked for, with the payload that action carries.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceIntent {
    LogMeal(MealData),
    LogWater(WaterData),
    LogActivity(ActivityData),
    Query(QueryData),
    Unknown,
}

impl VoiceIntent {
    pub fn action(&self) -> &'static str {
        match self {
            VoiceIntent::LogMeal(_) => "log_meal",
            VoiceIntent::LogWater(_) => "log_water",
            VoiceIntent::LogActivity(_) => "log_activity",
            VoiceIntent::Query(_) => "query",
            VoiceIntent::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceCommandResult {
    pub intent: VoiceIntent,
    pub response: String,
}

impl VoiceCommandResult {
    pub fn fallback() -> Self {
        Self {
            intent: VoiceIntent::Unknown,
            response: FALLBACK_RESPONSE.to_string(),
        }
    }
}

impl Serialize for VoiceCommandResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("VoiceCommandResult", 3)?;
        state.serialize_field("action", self.intent.action())?;
        match &self.intent {
            VoiceIntent::LogMeal(data) => state.serialize_field("data", data)?,
            VoiceIntent::LogWater(data) => state.serialize_field("data", data)?,
            VoiceIntent::LogActivity(data) => state.serialize_field("data", data)?,
            VoiceIntent::Query(data) => state.serialize_field("data", data)?,
            VoiceIntent::Unknown => state.skip_field("data")?,
        }
        state.serialize_field("response", &self.response)?;
        state.end()
    }
}

/// Reply shape before the action tag is resolved.
#[derive(Debug, Deserialize)]
struct RawVoiceReply {
    action: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    response: String,
}

impl TryFrom<RawVoiceReply> for VoiceCommandResult {
    type Error = RelayError;

    fn try_from(raw: RawVoiceReply) -> Result<Self, Self::Error> {
        let intent = match raw.action.as_str() {
            "log_meal" => VoiceIntent::LogMeal(serde_json::from_value(raw.data)?),
            "log_water" => {
                let data: WaterData = serde_json::from_value(raw.data)?;
                if !data.amount.is_finite() || data.amount < 0.0 {
                    return Err(RelayError::PayloadParse(format!(
                        "water amount {} is invalid",
                        data.amount
                    )));
                }
                VoiceIntent::LogWater(data)
            }
            "log_activity" => {
                let data: ActivityData = serde_json::from_value(raw.data)?;
                if !data.duration.is_finite() || data.duration < 0.0 {
                    return Err(RelayError::PayloadParse(format!(
                        "activity duration {} is invalid",
                        data.duration
                    )));
                }
                VoiceIntent::LogActivity(data)
            }
            "query" => VoiceIntent::Query(serde_json::from_value(raw.data)?),
            "unknown" => VoiceIntent::Unknown,
            other => {
                return Err(RelayError::PayloadParse(format!(
                    "unrecognised action '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            intent,
            response: raw.response,
        })
    }
}

pub fn build_prompt(command: &str) -> RelayPrompt {
    RelayPrompt {
        operation: "voice_command",
        messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(command)],
        sampling: Sampling {
            temperature: 0.3,
            max_tokens: 300,
        },
        bracket: Bracket::Object,
    }
}

/// Turns a transcribed voice command into a structured intent.
///
/// A missing or blank command is an input error. Any failure after that point
/// yields [`VoiceCommandResult::fallback`].
pub async fn interpret_voice_command(
    backend: &dyn ChatBackend,
    request: &VoiceCommandRequest,
) -> Result<VoiceCommandResult, RelayError> {
    let command = super::require_text("command", request.command.as_deref())?;

    let interpreted = relay::<RawVoiceReply>(backend, build_prompt(command))
        .await
        .and_then(VoiceCommandResult::try_from);
    Ok(interpreted.unwrap_or_else(|e| {
        warn!(error = %e, "voice command not understood, using fallback");
        VoiceCommandResult::fallback()
    }))
}
