use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{relay, Bracket, RelayError, RelayPrompt};
use crate::api_connection::{ChatBackend, ChatMessage, Sampling};
use crate::metrics::{daily_calorie_goal, water_goal, BmrFormula};
use crate::profile::{DailyStats, UserProfile};

const MIN_TIPS: usize = 3;
const MAX_TIPS: usize = 4;

pub const FALLBACK_TIPS: [&str; 3] = [
    "Keep hydrating throughout the day!",
    "Remember to include protein in every meal.",
    "Short walks make a big difference!",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachingRequest {
    pub user: UserProfile,
    #[serde(default)]
    pub stats: DailyStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoachingTips {
    pub tips: Vec<String>,
}

impl CoachingTips {
    pub fn fallback() -> Self {
        Self {
            tips: FALLBACK_TIPS.iter().map(|tip| tip.to_string()).collect(),
        }
    }
}

pub fn build_prompt(request: &CoachingRequest, formula: BmrFormula) -> RelayPrompt {
    let user = &request.user;
    let stats = &request.stats;
    let system = format!(
        "You are an experienced, motivating weight-loss coach.

Analyse the user's data and give 3-4 personalised, practical and motivating tips.

User data:
- Goal: {goal}
- Calorie goal: {calorie_goal:.0} kcal
- Calories eaten today: {consumed} kcal
- Calories burned: {burned} kcal
- Water intake: {water}ml (goal: {water_goal:.0}ml)
- Activity minutes: {minutes} min
- Macros: P:{protein}g C:{carbs}g F:{fat}g

Focus on:
- Areas that need attention
- Praise for achievements
- Practical, actionable advice
- Positive motivation

Return ONLY a JSON array of strings:
[\"tip 1\", \"tip 2\", \"tip 3\"]",
        goal = user.goal.describe(),
        calorie_goal = daily_calorie_goal(user, formula),
        consumed = stats.calories_consumed,
        burned = stats.calories_burned,
        water = stats.water_intake,
        water_goal = water_goal(user.gender),
        minutes = stats.activity_minutes,
        protein = stats.macros.protein,
        carbs = stats.macros.carbs,
        fat = stats.macros.fat,
    );

    RelayPrompt {
        operation: "coaching_tips",
        messages: vec![
            ChatMessage::system(system),
            ChatMessage::user("Generate personalised coaching tips for today."),
        ],
        sampling: Sampling {
            temperature: 0.8,
            max_tokens: 500,
        },
        bracket: Bracket::Array,
    }
}

async fn request_tips(
    backend: &dyn ChatBackend,
    request: &CoachingRequest,
    formula: BmrFormula,
) -> Result<Vec<String>, RelayError> {
    let mut tips: Vec<String> = relay(backend, build_prompt(request, formula)).await?;
    tips.retain(|tip| !tip.trim().is_empty());
    if tips.len() < MIN_TIPS {
        return Err(RelayError::PayloadParse(format!(
            "expected at least {} tips, got {}",
            MIN_TIPS,
            tips.len()
        )));
    }
    tips.truncate(MAX_TIPS);
    Ok(tips)
}

/// Personalised tips for the day. Never fails: any error is logged and the
/// fixed fallback tips are returned instead.
pub async fn coaching_tips(
    backend: &dyn ChatBackend,
    request: &CoachingRequest,
    formula: BmrFormula,
) -> CoachingTips {
    match request_tips(backend, request, formula).await {
        Ok(tips) => CoachingTips { tips },
        Err(e) => {
            warn!(error = %e, "coaching tips unavailable, using fallback");
            CoachingTips::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ActivityLevel, Gender, Goal, Macros};
    use crate::relay::testing::ScriptedBackend;

    fn request() -> CoachingRequest {
        CoachingRequest {
            user: UserProfile {
                id: None,
                weight: 75.0,
                height: 165.0,
                age: 32.0,
                gender: Gender::Female,
                activity_level: ActivityLevel::Moderate,
                goal: Goal::Lose,
                target_weight: None,
                start_weight: None,
                dietary_restrictions: vec![],
                health_conditions: vec![],
            },
            stats: DailyStats {
                calories_consumed: 1200.0,
                water_intake: 800.0,
                activity_minutes: 20.0,
                macros: Macros {
                    protein: 60.0,
                    carbs: 150.0,
                    fat: 40.0,
                },
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_tips_are_parsed_from_array() {
        let backend = ScriptedBackend::replying(
            "Here you go:\n[\"Drink a glass of water now\", \"Add eggs to breakfast\", \"Take the stairs\"]",
        );
        let tips = coaching_tips(&backend, &request(), BmrFormula::MifflinStJeor).await;
        assert_eq!(tips.tips.len(), 3);
        assert_eq!(tips.tips[1], "Add eggs to breakfast");

        let (messages, sampling) = backend.last_call();
        let system = messages[0].text();
        assert!(system.contains("Calorie goal: 1763 kcal"));
        assert!(system.contains("Water intake: 800ml (goal: 2500ml)"));
        assert_eq!(sampling.temperature, 0.8);
        assert_eq!(sampling.max_tokens, 500);
    }

    #[tokio::test]
    async fn test_long_lists_are_truncated() {
        let backend = ScriptedBackend::replying(r#"["a", "b", "c", "d", "e", "f"]"#);
        let tips = coaching_tips(&backend, &request(), BmrFormula::MifflinStJeor).await;
        assert_eq!(tips.tips, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_single_tip_reply_falls_back() {
        let backend = ScriptedBackend::replying(r#"["Drink water"]"#);
        let tips = coaching_tips(&backend, &request(), BmrFormula::MifflinStJeor).await;
        assert_eq!(tips, CoachingTips::fallback());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failures_fall_back_to_fixed_tips() {
        for backend in [
            ScriptedBackend::failing(),
            ScriptedBackend::replying("I'd rather not."),
            ScriptedBackend::replying("[]"),
            ScriptedBackend::replying(r#"["Drink water"]"#),
            ScriptedBackend::replying(r#"["Drink water", "  ", "Sleep well"]"#),
            ScriptedBackend::replying("[1, 2, 3]"),
        ] {
            let tips = coaching_tips(&backend, &request(), BmrFormula::HarrisBenedict).await;
            assert_eq!(tips, CoachingTips::fallback());
            assert_eq!(tips.tips.len(), 3);
        }
    }
}
