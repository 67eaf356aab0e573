use serde::{Deserialize, Serialize};

use super::energy::{daily_calorie_goal, water_goal, BmrFormula};
use super::safe_number;
use crate::profile::{DailyStats, FoodEntry, UserProfile};

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

/// Net intake within this many kcal of the goal counts as balanced.
const BALANCED_BAND_KCAL: f64 = 100.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    Deficit,
    Surplus,
    Balanced,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalorieBalance {
    /// Net intake minus goal. Not clamped.
    pub balance: f64,
    pub status: BalanceStatus,
    pub message: String,
}

pub fn analyze_calorie_balance(stats: &DailyStats, goal: f64) -> CalorieBalance {
    let net = safe_number(stats.calories_consumed, 0.0) - safe_number(stats.calories_burned, 0.0);
    let balance = safe_number(net - safe_number(goal, 0.0), 0.0);

    let (status, message) = if balance.abs() < BALANCED_BAND_KCAL {
        (
            BalanceStatus::Balanced,
            "You're on track! Calories are balanced.".to_string(),
        )
    } else if balance < 0.0 {
        (
            BalanceStatus::Deficit,
            format!("{:.0} kcal deficit. Great for losing weight!", balance.abs()),
        )
    } else {
        (
            BalanceStatus::Surplus,
            format!("{:.0} kcal surplus. Careful not to overshoot your goal.", balance),
        )
    };

    CalorieBalance {
        balance,
        status,
        message,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MacroAnalysis {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub total_calories: f64,
    pub protein_percentage: f64,
    pub carbs_percentage: f64,
    pub fat_percentage: f64,
    pub recommendations: Vec<String>,
}

/// Sums macros over the day's food entries and reports each macro's share
/// of the macro-derived calories (4/4/9 kcal per gram).
///
/// Percentages are 0 when no calories were logged.
pub fn analyze_macros(entries: &[FoodEntry]) -> MacroAnalysis {
    let (protein, carbs, fat) = entries.iter().fold((0.0, 0.0, 0.0), |(p, c, f), e| {
        (
            p + safe_number(e.protein, 0.0),
            c + safe_number(e.carbs, 0.0),
            f + safe_number(e.fat, 0.0),
        )
    });

    let protein_kcal = protein * KCAL_PER_G_PROTEIN;
    let carbs_kcal = carbs * KCAL_PER_G_CARBS;
    let fat_kcal = fat * KCAL_PER_G_FAT;
    let total_calories = safe_number(protein_kcal + carbs_kcal + fat_kcal, 0.0);

    let share = |kcal: f64| {
        if total_calories > 0.0 {
            safe_number(kcal / total_calories * 100.0, 0.0)
        } else {
            0.0
        }
    };
    let protein_percentage = share(protein_kcal);
    let carbs_percentage = share(carbs_kcal);
    let fat_percentage = share(fat_kcal);

    let mut recommendations = Vec::new();
    if protein_percentage < 20.0 {
        recommendations.push(
            "Your protein intake is low. Add lean meat, eggs or legumes.".to_string(),
        );
    }
    if carbs_percentage > 50.0 {
        recommendations
            .push("Your carbohydrate intake is high. Consider cutting back on bread and pasta.".to_string());
    }
    if fat_percentage < 20.0 {
        recommendations
            .push("Healthy fats matter! Add avocado, nuts or olive oil.".to_string());
    }

    MacroAnalysis {
        protein,
        carbs,
        fat,
        total_calories,
        protein_percentage,
        carbs_percentage,
        fat_percentage,
        recommendations,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeficiencyArea {
    Hydration,
    Calories,
    Activity,
    None,
}

/// Display priority; variants are ordered so that `High` compares greatest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deficiency {
    pub area: DeficiencyArea,
    pub priority: Priority,
    pub message: String,
}

/// Flags today's shortfalls, highest priority first.
///
/// # Arguments
/// * `stats`: the day's logged totals.
/// * `profile`: used to derive the calorie and water goals.
/// * `hour`: local hour of day (0-23). The calorie rule only fires after 18h
///   and the activity rule after 16h.
/// * `formula`: BMR equation behind the calorie goal.
///
/// # Returns
/// Findings sorted by priority (high > medium > low); equal priorities keep
/// the hydration, calories, activity detection order.
pub fn detect_deficient_areas(
    stats: &DailyStats,
    profile: &UserProfile,
    hour: u32,
    formula: BmrFormula,
) -> Vec<Deficiency> {
    deficiencies_against(stats, daily_calorie_goal(profile, formula), water_goal(profile.gender), hour)
}

/// Same rules as [`detect_deficient_areas`] against already known goals.
pub(crate) fn deficiencies_against(
    stats: &DailyStats,
    calorie_goal: f64,
    water_target: f64,
    hour: u32,
) -> Vec<Deficiency> {
    let mut found = Vec::new();

    let water_pct = safe_number(
        safe_number(stats.water_intake, 0.0) / water_target * 100.0,
        0.0,
    );
    if water_pct < 30.0 {
        found.push(Deficiency {
            area: DeficiencyArea::Hydration,
            priority: Priority::High,
            message: "Critical hydration! Drink some water now.".to_string(),
        });
    } else if water_pct < 60.0 {
        found.push(Deficiency {
            area: DeficiencyArea::Hydration,
            priority: Priority::Medium,
            message: "You need to drink more water today.".to_string(),
        });
    }

    let calorie_pct = safe_number(
        safe_number(stats.calories_consumed, 0.0) / calorie_goal * 100.0,
        0.0,
    );
    if calorie_pct < 50.0 && hour > 18 {
        found.push(Deficiency {
            area: DeficiencyArea::Calories,
            priority: Priority::High,
            message: "You've eaten very little today!".to_string(),
        });
    }

    if safe_number(stats.activity_minutes, 0.0) == 0.0 && hour > 16 {
        found.push(Deficiency {
            area: DeficiencyArea::Activity,
            priority: Priority::Medium,
            message: "No exercise yet today. How about a walk?".to_string(),
        });
    }

    found.sort_by(|a, b| b.priority.cmp(&a.priority));
    found
}

/// Rule-based coaching line used when no AI tips are requested.
pub fn coaching_message(stats: &DailyStats, profile: &UserProfile, formula: BmrFormula) -> String {
    coaching_message_against(stats, daily_calorie_goal(profile, formula), water_goal(profile.gender))
}

pub(crate) fn coaching_message_against(stats: &DailyStats, calorie_goal: f64, water_target: f64) -> String {
    let consumed = safe_number(stats.calories_consumed, 0.0);
    let water = safe_number(stats.water_intake, 0.0);
    let minutes = safe_number(stats.activity_minutes, 0.0);

    let mut parts: Vec<&str> = Vec::new();

    if consumed < calorie_goal * 0.7 {
        parts.push("You're eating too little! That can slow your metabolism down.");
    } else if consumed > calorie_goal * 1.2 {
        parts.push("Careful! You've gone more than 20% over your calorie goal.");
    } else {
        parts.push("Great job keeping your calories within the goal!");
    }

    if water < water_target * 0.5 {
        parts.push("Your hydration is very low! Drink more water.");
    } else if water >= water_target {
        parts.push("Excellent hydration today!");
    }

    if minutes == 0.0 {
        parts.push("How about a 15 minute walk today?");
    } else if minutes >= 30.0 {
        parts.push("Well done on the workout! Keep it up!");
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ActivityLevel, Gender, Goal, MealType};

    fn female_profile() -> UserProfile {
        UserProfile {
            id: None,
            weight: 75.0,
            height: 165.0,
            age: 32.0,
            gender: Gender::Female,
            activity_level: ActivityLevel::Moderate,
            goal: Goal::Lose,
            target_weight: Some(65.0),
            start_weight: None,
            dietary_restrictions: vec![],
            health_conditions: vec![],
        }
    }

    fn entry(protein: f64, carbs: f64, fat: f64) -> FoodEntry {
        FoodEntry {
            name: "test".to_string(),
            meal_type: MealType::Lunch,
            calories: protein * 4.0 + carbs * 4.0 + fat * 9.0,
            protein,
            carbs,
            fat,
            fiber: None,
            sugar: None,
            portion: String::new(),
            ai_detected: false,
        }
    }

    #[test]
    fn test_calorie_balance_statuses() {
        let stats = DailyStats {
            calories_consumed: 2000.0,
            calories_burned: 300.0,
            ..Default::default()
        };
        assert_eq!(analyze_calorie_balance(&stats, 1750.0).status, BalanceStatus::Balanced);

        let deficit = analyze_calorie_balance(&stats, 2000.0);
        assert_eq!(deficit.status, BalanceStatus::Deficit);
        assert_eq!(deficit.balance, -300.0);

        let surplus = analyze_calorie_balance(&stats, 1500.0);
        assert_eq!(surplus.status, BalanceStatus::Surplus);
        assert_eq!(surplus.balance, 200.0);
    }

    #[test]
    fn test_balance_band_edge() {
        let stats = DailyStats {
            calories_consumed: 1900.0,
            ..Default::default()
        };
        // exactly 100 below is no longer balanced
        assert_eq!(analyze_calorie_balance(&stats, 2000.0).status, BalanceStatus::Deficit);
        assert_eq!(analyze_calorie_balance(&stats, 1999.0).status, BalanceStatus::Balanced);
    }

    #[test]
    fn test_macros_zero_intake() {
        let analysis = analyze_macros(&[entry(0.0, 0.0, 0.0)]);
        assert_eq!(analysis.total_calories, 0.0);
        assert_eq!(analysis.protein_percentage, 0.0);
        assert_eq!(analysis.carbs_percentage, 0.0);
        assert_eq!(analysis.fat_percentage, 0.0);

        let empty = analyze_macros(&[]);
        assert_eq!(empty.total_calories, 0.0);
        assert!(empty.protein_percentage.is_finite());
    }

    #[test]
    fn test_macros_percentages_and_recommendations() {
        // 25g protein = 100 kcal, 100g carbs = 400 kcal, 0g fat
        let analysis = analyze_macros(&[entry(10.0, 60.0, 0.0), entry(15.0, 40.0, 0.0)]);
        assert_eq!(analysis.protein, 25.0);
        assert_eq!(analysis.carbs, 100.0);
        assert_eq!(analysis.total_calories, 500.0);
        assert!((analysis.protein_percentage - 20.0).abs() < 1e-9);
        assert!((analysis.carbs_percentage - 80.0).abs() < 1e-9);
        assert_eq!(analysis.fat_percentage, 0.0);
        // high carbs and low fat
        assert!(analysis.recommendations.len() >= 2);
        assert!(analysis.recommendations.iter().any(|r| r.contains("carbohydrate")));
    }

    #[test]
    fn test_macros_ignore_non_finite_entries() {
        let analysis = analyze_macros(&[entry(f64::NAN, 10.0, 0.0)]);
        assert_eq!(analysis.protein, 0.0);
        assert_eq!(analysis.total_calories, 40.0);
    }

    #[test]
    fn test_no_water_is_high_priority_at_any_hour() {
        let stats = DailyStats {
            calories_consumed: 1500.0,
            activity_minutes: 30.0,
            ..Default::default()
        };
        for hour in [0, 9, 17, 23] {
            let found = detect_deficient_areas(&stats, &female_profile(), hour, BmrFormula::MifflinStJeor);
            let hydration: Vec<_> = found
                .iter()
                .filter(|d| d.area == DeficiencyArea::Hydration)
                .collect();
            assert_eq!(hydration.len(), 1);
            assert_eq!(hydration[0].priority, Priority::High);
        }
    }

    #[test]
    fn test_full_water_has_no_hydration_finding() {
        let stats = DailyStats {
            water_intake: 2500.0,
            ..Default::default()
        };
        let found = detect_deficient_areas(&stats, &female_profile(), 12, BmrFormula::MifflinStJeor);
        assert!(found.iter().all(|d| d.area != DeficiencyArea::Hydration));
    }

    #[test]
    fn test_high_sorts_before_medium() {
        // medium hydration is detected before high calories
        let stats = DailyStats {
            water_intake: 1000.0,
            calories_consumed: 100.0,
            activity_minutes: 0.0,
            ..Default::default()
        };
        let found = detect_deficient_areas(&stats, &female_profile(), 20, BmrFormula::MifflinStJeor);
        let order: Vec<_> = found.iter().map(|d| (d.area, d.priority)).collect();
        assert_eq!(
            order,
            vec![
                (DeficiencyArea::Calories, Priority::High),
                (DeficiencyArea::Hydration, Priority::Medium),
                (DeficiencyArea::Activity, Priority::Medium),
            ]
        );
    }

    #[test]
    fn test_time_gated_rules() {
        let stats = DailyStats {
            water_intake: 2500.0,
            calories_consumed: 0.0,
            activity_minutes: 0.0,
            ..Default::default()
        };
        let profile = female_profile();
        assert!(detect_deficient_areas(&stats, &profile, 16, BmrFormula::MifflinStJeor).is_empty());
        let at_17 = detect_deficient_areas(&stats, &profile, 17, BmrFormula::MifflinStJeor);
        assert_eq!(at_17.len(), 1);
        assert_eq!(at_17[0].area, DeficiencyArea::Activity);
        let at_18 = detect_deficient_areas(&stats, &profile, 18, BmrFormula::MifflinStJeor);
        assert_eq!(at_18.len(), 1);
        let at_19 = detect_deficient_areas(&stats, &profile, 19, BmrFormula::MifflinStJeor);
        assert_eq!(at_19.len(), 2);
        assert_eq!(at_19[0].area, DeficiencyArea::Calories);
    }

    #[test]
    fn test_coaching_message_rules() {
        let profile = female_profile();
        let stats = DailyStats {
            calories_consumed: 0.0,
            water_intake: 3000.0,
            activity_minutes: 45.0,
            ..Default::default()
        };
        let message = coaching_message(&stats, &profile, BmrFormula::MifflinStJeor);
        assert!(message.starts_with("You're eating too little!"));
        assert!(message.contains("Excellent hydration today!"));
        assert!(message.ends_with("Keep it up!"));
    }
}
