use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{relay, require_finite, Bracket, RelayError, RelayPrompt};
use crate::api_connection::{ChatBackend, ChatMessage, Sampling};
use crate::profile::{Macros, UserProfile};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanPreferences {
    #[serde(default)]
    pub restrictions: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
    pub target_calories: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlanRequest {
    pub user: UserProfile,
    pub preferences: MealPlanPreferences,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealPlanItem {
    pub name: String,
    pub portion: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Meals {
    #[serde(default)]
    pub breakfast: Vec<MealPlanItem>,
    #[serde(default)]
    pub lunch: Vec<MealPlanItem>,
    #[serde(default)]
    pub dinner: Vec<MealPlanItem>,
    #[serde(default)]
    pub snacks: Vec<MealPlanItem>,
}

impl Meals {
    fn items(&self) -> impl Iterator<Item = &MealPlanItem> {
        self.breakfast
            .iter()
            .chain(&self.lunch)
            .chain(&self.dinner)
            .chain(&self.snacks)
    }
}

/// Plan body exactly as the AI service returns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedMealPlan {
    pub meals: Meals,
    pub total_calories: f64,
    pub macros: Macros,
}

/// A generated plan stamped with its id, owner and creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MealPlan {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub plan: GeneratedMealPlan,
}

impl GeneratedMealPlan {
    fn validate(&self) -> Result<(), RelayError> {
        require_finite("totalCalories", self.total_calories)?;
        require_finite("macros.protein", self.macros.protein)?;
        require_finite("macros.carbs", self.macros.carbs)?;
        require_finite("macros.fat", self.macros.fat)?;
        for item in self.meals.items() {
            require_finite("calories", item.calories)?;
            require_finite("protein", item.protein)?;
            require_finite("carbs", item.carbs)?;
            require_finite("fat", item.fat)?;
        }
        Ok(())
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

pub fn build_prompt(request: &MealPlanRequest) -> RelayPrompt {
    let mut restrictions = request.preferences.restrictions.clone();
    for restriction in &request.user.dietary_restrictions {
        if !restrictions.contains(restriction) {
            restrictions.push(restriction.clone());
        }
    }

    let system = format!(
        "You are a nutritionist who designs personalised meal plans.
Create a complete one-day meal plan for this user.

Take into account:
- Goal: {goal}
- Dietary restrictions: {restrictions}
- Disliked foods: {dislikes}
- Calorie target: {target:.0} kcal
- Health conditions: {conditions}

Return ONLY a valid JSON object in this format:
{{
  \"meals\": {{
    \"breakfast\": [
      {{
        \"name\": \"food name\",
        \"portion\": \"portion\",
        \"calories\": number,
        \"protein\": number,
        \"carbs\": number,
        \"fat\": number,
        \"recipe\": \"short instructions (optional)\"
      }}
    ],
    \"lunch\": [...],
    \"dinner\": [...],
    \"snacks\": [...]
  }},
  \"totalCalories\": number,
  \"macros\": {{
    \"protein\": number,
    \"carbs\": number,
    \"fat\": number
  }}
}}",
        goal = request.user.goal.describe(),
        restrictions = list_or_none(&restrictions),
        dislikes = list_or_none(&request.preferences.dislikes),
        target = request.preferences.target_calories,
        conditions = list_or_none(&request.user.health_conditions),
    );

    RelayPrompt {
        operation: "generate_meal_plan",
        messages: vec![
            ChatMessage::system(system),
            ChatMessage::user("Create a personalised meal plan for today."),
        ],
        sampling: Sampling {
            temperature: 0.7,
            max_tokens: 2000,
        },
        bracket: Bracket::Object,
    }
}

pub async fn generate_meal_plan(
    backend: &dyn ChatBackend,
    request: &MealPlanRequest,
) -> Result<MealPlan, RelayError> {
    let target = request.preferences.target_calories;
    if !target.is_finite() || target <= 0.0 {
        return Err(RelayError::InputValidation(
            "targetCalories must be a positive number".to_string(),
        ));
    }

    let plan: GeneratedMealPlan = relay(backend, build_prompt(request)).await?;
    plan.validate()?;

    let date = Utc::now();
    Ok(MealPlan {
        id: format!("plan-{}", date.timestamp_millis()),
        user_id: request.user.id.clone(),
        date,
        plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ActivityLevel, Gender, Goal};
    use crate::relay::testing::ScriptedBackend;

    fn request(target_calories: f64) -> MealPlanRequest {
        MealPlanRequest {
            user: UserProfile {
                id: Some("user-1".to_string()),
                weight: 75.0,
                height: 165.0,
                age: 32.0,
                gender: Gender::Female,
                activity_level: ActivityLevel::Moderate,
                goal: Goal::Lose,
                target_weight: Some(65.0),
                start_weight: None,
                dietary_restrictions: vec!["lactose free".to_string()],
                health_conditions: vec![],
            },
            preferences: MealPlanPreferences {
                restrictions: vec!["vegetarian".to_string()],
                dislikes: vec![],
                target_calories,
            },
        }
    }

    const REPLY: &str = r#"Here's a plan:
{
  "meals": {
    "breakfast": [{"name": "Oats", "portion": "60 g", "calories": 230, "protein": 8, "carbs": 40, "fat": 4, "recipe": "Cook with water {or soy milk}"}],
    "lunch": [{"name": "Lentil salad", "portion": "1 bowl", "calories": 450, "protein": 25, "carbs": 55, "fat": 12}],
    "dinner": [],
    "snacks": []
  },
  "totalCalories": 680,
  "macros": {"protein": 33, "carbs": 95, "fat": 16}
}"#;

    #[tokio::test]
    async fn test_plan_is_stamped_with_owner_and_id() {
        let backend = ScriptedBackend::replying(REPLY);
        let plan = generate_meal_plan(&backend, &request(1800.0)).await.unwrap();
        assert!(plan.id.starts_with("plan-"));
        assert_eq!(plan.user_id.as_deref(), Some("user-1"));
        assert_eq!(plan.plan.meals.breakfast[0].recipe.as_deref(), Some("Cook with water {or soy milk}"));
        assert_eq!(plan.plan.total_calories, 680.0);

        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["userId"], "user-1");
        assert_eq!(value["meals"]["lunch"][0]["name"], "Lentil salad");
        assert!(value["meals"]["lunch"][0].get("recipe").is_none());
    }

    #[tokio::test]
    async fn test_prompt_merges_restrictions_and_uses_creative_sampling() {
        let backend = ScriptedBackend::replying(REPLY);
        generate_meal_plan(&backend, &request(1800.0)).await.unwrap();
        let (messages, sampling) = backend.last_call();
        let system = messages[0].text();
        assert!(system.contains("vegetarian, lactose free"));
        assert!(system.contains("1800 kcal"));
        assert!(system.contains("Disliked foods: none"));
        assert_eq!(sampling.temperature, 0.7);
        assert_eq!(sampling.max_tokens, 2000);
    }

    #[tokio::test]
    async fn test_invalid_target_is_rejected_up_front() {
        let backend = ScriptedBackend::replying(REPLY);
        let err = generate_meal_plan(&backend, &request(0.0)).await.unwrap_err();
        assert!(err.is_input_validation());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let backend = ScriptedBackend::failing();
        let err = generate_meal_plan(&backend, &request(1800.0)).await.unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));
    }
}
