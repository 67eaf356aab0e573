use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::metrics::{daily_calorie_goal, BmrFormula};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    /// TDEE multiplier applied to the basal metabolic rate.
    pub fn multiplier(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::VeryActive => 1.9,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Lose,
    Maintain,
    Gain,
}

impl Goal {
    /// Daily kcal offset added to TDEE.
    pub fn calorie_adjustment(self) -> f64 {
        match self {
            Goal::Lose => -500.0,
            Goal::Maintain => 0.0,
            Goal::Gain => 300.0,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Goal::Lose => "weight loss",
            Goal::Maintain => "weight maintenance",
            Goal::Gain => "muscle gain",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

/// Body and goal data supplied by the caller for every computation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub weight: f64,
    pub height: f64,
    pub age: f64,
    pub gender: Gender,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_weight: Option<f64>,
    /// Weight recorded when the current goal was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_weight: Option<f64>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub health_conditions: Vec<String>,
}

/// Goals saved for a user: the profile they were set from and the calorie
/// target fixed at that moment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserGoals {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub daily_calories: f64,
}

impl UserGoals {
    pub fn for_profile(profile: UserProfile, formula: BmrFormula) -> Self {
        let daily_calories = daily_calorie_goal(&profile, formula);
        Self {
            profile,
            daily_calories,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Macros {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

/// One calendar day of logged totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub calories_consumed: f64,
    #[serde(default)]
    pub calories_burned: f64,
    #[serde(default)]
    pub water_intake: f64,
    #[serde(default)]
    pub activity_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub macros: Macros,
}

impl DailyStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoodEntry {
    pub name: String,
    pub meal_type: MealType,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugar: Option<f64>,
    #[serde(default)]
    pub portion: String,
    #[serde(default)]
    pub ai_detected: bool,
}
