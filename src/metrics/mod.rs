pub mod analysis;
pub mod energy;
pub mod progress;
pub mod summary;

pub use analysis::{
    analyze_calorie_balance, analyze_macros, coaching_message, detect_deficient_areas,
    BalanceStatus, CalorieBalance, Deficiency, DeficiencyArea, MacroAnalysis, Priority,
};
pub use energy::{
    bmr, daily_calorie_goal, tdee, water_goal, workout_calories, BmrFormula, WorkoutKind,
};
pub use progress::{weight_progress, weight_trend, WeightProgress};
pub use summary::{DailySummary, MetricsReport};

/// Replaces NaN and infinite values with `fallback`.
///
/// Upstream stats may be incomplete while loading, so every value the engine
/// returns goes through here before leaving the module.
pub fn safe_number(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Share of `goal` reached by `value`, clamped to [0, 100] for display.
///
/// Returns 0 when the goal is zero or either input is non-finite.
pub fn percent_of_goal(value: f64, goal: f64) -> f64 {
    let goal = safe_number(goal, 0.0);
    if goal == 0.0 {
        return 0.0;
    }
    safe_number(value / goal * 100.0, 0.0).clamp(0.0, 100.0)
}
