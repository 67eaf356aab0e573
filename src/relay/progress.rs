use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{relay, require_finite, Bracket, RelayError, RelayPrompt};
use crate::api_connection::{ChatBackend, ChatMessage, Sampling};
use crate::metrics::weight_trend;
use crate::profile::UserProfile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub weight: f64,
    #[serde(default)]
    pub calories_consumed: f64,
    #[serde(default)]
    pub calories_burned: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub user: UserProfile,
    #[serde(default)]
    pub weekly_stats: Vec<WeeklyStat>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressAnalysis {
    pub recommendation: String,
    pub adjusted_calorie_goal: f64,
    #[serde(default)]
    pub insights: Vec<String>,
}

fn describe_trend(trend: f64) -> String {
    let direction = if trend > 0.0 { "gain" } else { "loss" };
    format!("{} of {:.2} kg/week", direction, trend.abs())
}

/// Builds the progress prompt. `weekly_stats` must not be empty.
pub fn build_prompt(user: &UserProfile, weekly_stats: &[WeeklyStat]) -> RelayPrompt {
    let weights: Vec<f64> = weekly_stats.iter().map(|s| s.weight).collect();
    let trend = weight_trend(&weights);
    let first = weights.first().copied().unwrap_or(user.weight);
    let last = weights.last().copied().unwrap_or(user.weight);

    let days = weekly_stats
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "Day {}: {}kg, {}kcal consumed, {}kcal burned",
                i + 1,
                s.weight,
                s.calories_consumed,
                s.calories_burned
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "You are a nutritionist specialised in progress analysis.

Analyse the user's weekly data and provide:
1. A main recommendation
2. An adjusted calorie goal (if needed)
3. 3-4 specific insights

User data:
- Goal: {goal}
- Starting weight: {first}kg
- Current weight: {last}kg
- Trend: {trend}

Weekly data:
{days}

Return ONLY a valid JSON object:
{{
  \"recommendation\": \"main recommendation\",
  \"adjustedCalorieGoal\": number (adjusted calorie goal),
  \"insights\": [\"insight 1\", \"insight 2\", \"insight 3\"]
}}",
        goal = user.goal.describe(),
        trend = describe_trend(trend),
    );

    RelayPrompt {
        operation: "analyze_progress",
        messages: vec![
            ChatMessage::system(system),
            ChatMessage::user("Analyse my weekly progress and make recommendations."),
        ],
        sampling: Sampling {
            temperature: 0.5,
            max_tokens: 600,
        },
        bracket: Bracket::Object,
    }
}

pub async fn analyze_progress(
    backend: &dyn ChatBackend,
    request: &ProgressRequest,
) -> Result<ProgressAnalysis, RelayError> {
    if request.weekly_stats.is_empty() {
        return Err(RelayError::InputValidation(
            "weeklyStats not provided".to_string(),
        ));
    }
    if let Some(bad) = request.weekly_stats.iter().find(|s| !s.weight.is_finite()) {
        return Err(RelayError::InputValidation(format!(
            "weight {} is not a finite number",
            bad.weight
        )));
    }

    let analysis: ProgressAnalysis =
        relay(backend, build_prompt(&request.user, &request.weekly_stats)).await?;
    require_finite("adjustedCalorieGoal", analysis.adjusted_calorie_goal)?;
    Ok(analysis)
}
