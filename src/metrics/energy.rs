use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::safe_number;
use crate::profile::{Gender, UserProfile};

/// Basal metabolic rate equation.
///
/// Mifflin-St Jeor is the canonical formula for stored and displayed goals.
/// Harris-Benedict is kept as a named alternate so callers that want the
/// older estimate select it explicitly.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BmrFormula {
    #[default]
    MifflinStJeor,
    HarrisBenedict,
}

impl FromStr for BmrFormula {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mifflin" | "mifflin-st-jeor" => Ok(BmrFormula::MifflinStJeor),
            "harris-benedict" | "harris_benedict" | "harris" => Ok(BmrFormula::HarrisBenedict),
            other => Err(format!("unknown BMR formula: {}", other)),
        }
    }
}

impl fmt::Display for BmrFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BmrFormula::MifflinStJeor => write!(f, "mifflin-st-jeor"),
            BmrFormula::HarrisBenedict => write!(f, "harris-benedict"),
        }
    }
}

/// Calculates the basal metabolic rate in kcal/day.
///
/// # Arguments
/// * `profile`: weight (kg), height (cm), age (years) and gender are used.
/// * `formula`: which equation to apply.
///
/// # Returns
/// The BMR, or 0.0 if any input made the result non-finite.
pub fn bmr(profile: &UserProfile, formula: BmrFormula) -> f64 {
    let (w, h, a) = (profile.weight, profile.height, profile.age);
    let male = profile.gender == Gender::Male;
    let value = match formula {
        BmrFormula::MifflinStJeor => {
            let base = 10.0 * w + 6.25 * h - 5.0 * a;
            if male {
                base + 5.0
            } else {
                base - 161.0
            }
        }
        BmrFormula::HarrisBenedict => {
            if male {
                88.362 + 13.397 * w + 4.799 * h - 5.677 * a
            } else {
                447.593 + 9.247 * w + 3.098 * h - 4.33 * a
            }
        }
    };
    safe_number(value, 0.0)
}

/// Total daily energy expenditure: BMR scaled by the activity multiplier. Not rounded.
pub fn tdee(profile: &UserProfile, formula: BmrFormula) -> f64 {
    safe_number(
        bmr(profile, formula) * profile.activity_level.multiplier(),
        0.0,
    )
}

/// Daily calorie target: `round(TDEE + goal adjustment)`, never below zero.
///
/// A profile whose TDEE degraded to 0 gets a goal of 0 rather than the bare
/// adjustment.
pub fn daily_calorie_goal(profile: &UserProfile, formula: BmrFormula) -> f64 {
    let energy = tdee(profile, formula);
    if energy == 0.0 {
        return 0.0;
    }
    safe_number((energy + profile.goal.calorie_adjustment()).round(), 0.0).max(0.0)
}

/// Daily water target in ml.
pub fn water_goal(gender: Gender) -> f64 {
    match gender {
        Gender::Male => 3000.0,
        Gender::Female | Gender::Other => 2500.0,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutKind {
    Walking,
    Running,
    Cycling,
    Swimming,
    Hiit,
    Yoga,
    Strength,
    Dance,
}

impl WorkoutKind {
    pub fn calories_per_minute(self) -> f64 {
        match self {
            WorkoutKind::Walking => 4.0,
            WorkoutKind::Running => 10.0,
            WorkoutKind::Cycling => 8.0,
            WorkoutKind::Swimming => 11.0,
            WorkoutKind::Hiit => 12.0,
            WorkoutKind::Yoga => 3.0,
            WorkoutKind::Strength => 6.0,
            WorkoutKind::Dance => 7.0,
        }
    }
}

/// Estimated kcal burned by `minutes` of the given workout. Negative durations count as zero.
pub fn workout_calories(kind: WorkoutKind, minutes: f64) -> f64 {
    safe_number(kind.calories_per_minute() * minutes.max(0.0), 0.0)
}
