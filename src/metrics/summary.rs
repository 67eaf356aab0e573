use serde::{Deserialize, Serialize};

use super::analysis::{
    analyze_calorie_balance, analyze_macros, coaching_message_against, deficiencies_against,
    CalorieBalance, Deficiency, MacroAnalysis,
};
use super::energy::{bmr, daily_calorie_goal, tdee, water_goal, BmrFormula};
use super::progress::{weight_progress, weight_trend, WeightProgress};
use super::{percent_of_goal, safe_number};
use crate::profile::{DailyStats, FoodEntry, UserProfile};

/// Everything the dashboard shows for one day, derived in a single pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub formula: BmrFormula,
    pub calorie_goal: f64,
    pub water_goal: f64,
    pub net_calories: f64,
    pub remaining_calories: f64,
    pub calorie_percentage: f64,
    pub water_percentage: f64,
    pub balance: CalorieBalance,
    pub macros: MacroAnalysis,
    pub deficiencies: Vec<Deficiency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_progress: Option<WeightProgress>,
    /// kg per day over the supplied weekly weights.
    pub weekly_trend: f64,
    pub coaching_message: String,
}

impl DailySummary {
    pub fn compute(
        profile: &UserProfile,
        stats: &DailyStats,
        meals: &[FoodEntry],
        weekly_weights: &[f64],
        hour: u32,
        formula: BmrFormula,
    ) -> Self {
        let calorie_goal = daily_calorie_goal(profile, formula);
        Self::compute_with_goal(profile, stats, meals, weekly_weights, hour, formula, calorie_goal)
    }

    /// Like [`DailySummary::compute`], but measured against a calorie goal that
    /// was fixed earlier (for example one stored with the user's goals).
    /// A non-finite or negative goal counts as 0.
    pub fn compute_with_goal(
        profile: &UserProfile,
        stats: &DailyStats,
        meals: &[FoodEntry],
        weekly_weights: &[f64],
        hour: u32,
        formula: BmrFormula,
        calorie_goal: f64,
    ) -> Self {
        let calorie_goal = safe_number(calorie_goal, 0.0).max(0.0);
        let water_target = water_goal(profile.gender);
        let net_calories = safe_number(
            safe_number(stats.calories_consumed, 0.0) - safe_number(stats.calories_burned, 0.0),
            0.0,
        );

        let current_weight = stats.weight.unwrap_or(profile.weight);
        let weight_progress = profile
            .target_weight
            .map(|target| weight_progress(profile.start_weight, current_weight, target));

        DailySummary {
            formula,
            calorie_goal,
            water_goal: water_target,
            net_calories,
            remaining_calories: (calorie_goal - net_calories).max(0.0),
            calorie_percentage: percent_of_goal(stats.calories_consumed, calorie_goal),
            water_percentage: percent_of_goal(stats.water_intake, water_target),
            balance: analyze_calorie_balance(stats, calorie_goal),
            macros: analyze_macros(meals),
            deficiencies: deficiencies_against(stats, calorie_goal, water_target, hour),
            weight_progress,
            weekly_trend: weight_trend(weekly_weights),
            coaching_message: coaching_message_against(stats, calorie_goal, water_target),
        }
    }
}

/// Summary plus the raw energy figures behind the calorie goal. Neither
/// figure is rounded; only the calorie goal itself is.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub bmr: f64,
    pub tdee: f64,
    #[serde(flatten)]
    pub summary: DailySummary,
}

impl MetricsReport {
    pub fn compute(profile: &UserProfile, stats: &DailyStats, hour: u32, formula: BmrFormula) -> Self {
        let weights: Vec<f64> = stats.weight.into_iter().collect();
        Self {
            bmr: bmr(profile, formula),
            tdee: tdee(profile, formula),
            summary: DailySummary::compute(profile, stats, &[], &weights, hour, formula),
        }
    }
}
