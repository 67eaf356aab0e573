//! Persistence collaborator for profiles, goals, daily logs and meals.
//!
//! The dashboard reads through the [`Storage`] trait only. [`InMemoryStorage`]
//! backs the server and tests; [`SampleData`] seeds it with a demo user.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::metrics::BmrFormula;
use crate::profile::{
    ActivityLevel, DailyStats, FoodEntry, Gender, Goal, Macros, MealType, UserGoals, UserProfile,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        StorageError::NotFound {
            entity,
            key: key.into(),
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, StorageError>;

    async fn save_profile(&self, user_id: &str, profile: UserProfile) -> Result<(), StorageError>;

    async fn get_goals(&self, user_id: &str) -> Result<UserGoals, StorageError>;

    /// Inserts or replaces the user's goals.
    async fn save_goals(&self, user_id: &str, goals: UserGoals) -> Result<(), StorageError>;

    async fn get_daily_log(&self, user_id: &str, date: NaiveDate)
        -> Result<DailyStats, StorageError>;

    /// Inserts or replaces the log for `date`.
    async fn save_daily_log(
        &self,
        user_id: &str,
        date: NaiveDate,
        log: DailyStats,
    ) -> Result<(), StorageError>;

    /// Logs with `start <= date <= end`, oldest first. Missing days are skipped.
    async fn get_daily_logs(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStats>, StorageError>;

    async fn save_meal(
        &self,
        user_id: &str,
        date: NaiveDate,
        entry: FoodEntry,
    ) -> Result<(), StorageError>;

    /// Meals for one day in insertion order; empty when nothing was logged.
    async fn get_meals(&self, user_id: &str, date: NaiveDate)
        -> Result<Vec<FoodEntry>, StorageError>;

    /// Sets the day's water total, creating an empty log if needed.
    async fn update_water_intake(
        &self,
        user_id: &str,
        date: NaiveDate,
        amount: f64,
    ) -> Result<DailyStats, StorageError>;

    /// Adds a workout to the day's totals, creating an empty log if needed.
    async fn record_activity(
        &self,
        user_id: &str,
        date: NaiveDate,
        minutes: f64,
        calories: f64,
    ) -> Result<DailyStats, StorageError>;
}

type DayKey = (String, NaiveDate);

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    profiles: RwLock<HashMap<String, UserProfile>>,
    goals: RwLock<HashMap<String, UserGoals>>,
    logs: RwLock<BTreeMap<DayKey, DailyStats>>,
    meals: RwLock<HashMap<DayKey, Vec<FoodEntry>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn day_key(user_id: &str, date: NaiveDate) -> DayKey {
    (user_id.to_string(), date)
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, StorageError> {
        self.profiles
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("profile", user_id))
    }

    async fn save_profile(&self, user_id: &str, mut profile: UserProfile) -> Result<(), StorageError> {
        profile.id = Some(user_id.to_string());
        self.profiles
            .write()
            .await
            .insert(user_id.to_string(), profile);
        Ok(())
    }

    async fn get_goals(&self, user_id: &str) -> Result<UserGoals, StorageError> {
        self.goals
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("goals", user_id))
    }

    async fn save_goals(&self, user_id: &str, mut goals: UserGoals) -> Result<(), StorageError> {
        if !goals.daily_calories.is_finite() || goals.daily_calories < 0.0 {
            return Err(StorageError::Backend(format!(
                "daily calories {} is not a valid goal",
                goals.daily_calories
            )));
        }
        goals.profile.id = Some(user_id.to_string());
        self.goals.write().await.insert(user_id.to_string(), goals);
        Ok(())
    }

    async fn get_daily_log(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<DailyStats, StorageError> {
        self.logs
            .read()
            .await
            .get(&day_key(user_id, date))
            .cloned()
            .ok_or_else(|| StorageError::not_found("daily log", format!("{}/{}", user_id, date)))
    }

    async fn save_daily_log(
        &self,
        user_id: &str,
        date: NaiveDate,
        mut log: DailyStats,
    ) -> Result<(), StorageError> {
        log.date = Some(date);
        self.logs.write().await.insert(day_key(user_id, date), log);
        Ok(())
    }

    async fn get_daily_logs(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStats>, StorageError> {
        if start > end {
            return Ok(Vec::new());
        }
        let logs = self.logs.read().await;
        Ok(logs
            .range(day_key(user_id, start)..=day_key(user_id, end))
            .map(|(_, log)| log.clone())
            .collect())
    }

    async fn save_meal(
        &self,
        user_id: &str,
        date: NaiveDate,
        entry: FoodEntry,
    ) -> Result<(), StorageError> {
        self.meals
            .write()
            .await
            .entry(day_key(user_id, date))
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn get_meals(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<FoodEntry>, StorageError> {
        Ok(self
            .meals
            .read()
            .await
            .get(&day_key(user_id, date))
            .cloned()
            .unwrap_or_default())
    }

    async fn update_water_intake(
        &self,
        user_id: &str,
        date: NaiveDate,
        amount: f64,
    ) -> Result<DailyStats, StorageError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(StorageError::Backend(format!(
                "water intake {} is not a valid amount",
                amount
            )));
        }
        let mut logs = self.logs.write().await;
        let log = logs
            .entry(day_key(user_id, date))
            .or_insert_with(|| DailyStats::empty(date));
        log.water_intake = amount;
        Ok(log.clone())
    }

    async fn record_activity(
        &self,
        user_id: &str,
        date: NaiveDate,
        minutes: f64,
        calories: f64,
    ) -> Result<DailyStats, StorageError> {
        if !minutes.is_finite() || minutes < 0.0 || !calories.is_finite() || calories < 0.0 {
            return Err(StorageError::Backend(format!(
                "activity of {} min / {} kcal is not valid",
                minutes, calories
            )));
        }
        let mut logs = self.logs.write().await;
        let log = logs
            .entry(day_key(user_id, date))
            .or_insert_with(|| DailyStats::empty(date));
        log.activity_minutes += minutes;
        log.calories_burned += calories;
        Ok(log.clone())
    }
}

/// Source of the records a fresh store is seeded with.
pub trait DefaultDataProvider: Send + Sync {
    fn profile(&self) -> UserProfile;

    fn today_stats(&self, today: NaiveDate) -> DailyStats;

    fn today_meals(&self) -> Vec<FoodEntry>;

    /// Logs for the days before `today`, oldest first.
    fn previous_days(&self, today: NaiveDate) -> Vec<DailyStats>;
}

/// Demo user with a realistic day and week of history.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleData;

pub const SAMPLE_USER_ID: &str = "user-1";

fn sample_meal(name: &str, meal_type: MealType, kcal: f64, p: f64, c: f64, f: f64, portion: &str) -> FoodEntry {
    FoodEntry {
        name: name.to_string(),
        meal_type,
        calories: kcal,
        protein: p,
        carbs: c,
        fat: f,
        fiber: None,
        sugar: None,
        portion: portion.to_string(),
        ai_detected: false,
    }
}

impl DefaultDataProvider for SampleData {
    fn profile(&self) -> UserProfile {
        UserProfile {
            id: Some(SAMPLE_USER_ID.to_string()),
            weight: 75.0,
            height: 165.0,
            age: 32.0,
            gender: Gender::Female,
            activity_level: ActivityLevel::Moderate,
            goal: Goal::Lose,
            target_weight: Some(65.0),
            start_weight: Some(78.5),
            dietary_restrictions: vec!["lactose free".to_string()],
            health_conditions: vec![],
        }
    }

    fn today_stats(&self, today: NaiveDate) -> DailyStats {
        DailyStats {
            date: Some(today),
            calories_consumed: 1450.0,
            calories_burned: 320.0,
            water_intake: 1800.0,
            activity_minutes: 45.0,
            weight: Some(75.0),
            macros: Macros {
                protein: 85.0,
                carbs: 160.0,
                fat: 48.0,
            },
        }
    }

    fn today_meals(&self) -> Vec<FoodEntry> {
        vec![
            sample_meal("Vegetable omelette", MealType::Breakfast, 320.0, 24.0, 12.0, 18.0, "2 eggs + vegetables"),
            sample_meal("Coffee with almond milk", MealType::Breakfast, 80.0, 2.0, 8.0, 4.0, "200ml"),
            sample_meal("Grilled chicken", MealType::Lunch, 280.0, 42.0, 0.0, 12.0, "150g"),
            sample_meal("Brown rice", MealType::Lunch, 220.0, 5.0, 45.0, 2.0, "100g"),
            sample_meal("Green salad", MealType::Lunch, 50.0, 2.0, 8.0, 1.0, "1 plate"),
            sample_meal("Greek yoghurt with fruit", MealType::Snack, 180.0, 15.0, 22.0, 4.0, "150g"),
            sample_meal("Grilled salmon", MealType::Dinner, 320.0, 35.0, 0.0, 18.0, "120g"),
        ]
    }

    fn previous_days(&self, today: NaiveDate) -> Vec<DailyStats> {
        // (consumed, burned, water, weight)
        const WEEK: [(f64, f64, f64, f64); 6] = [
            (1520.0, 280.0, 2100.0, 75.5),
            (1480.0, 320.0, 2400.0, 75.3),
            (1550.0, 150.0, 1800.0, 75.2),
            (1420.0, 380.0, 2600.0, 75.0),
            (1490.0, 290.0, 2200.0, 74.8),
            (1680.0, 200.0, 1900.0, 75.0),
        ];
        let days_back = WEEK.len() as i64;
        WEEK.iter()
            .enumerate()
            .map(|(i, &(consumed, burned, water, weight))| DailyStats {
                date: Some(today - Duration::days(days_back - i as i64)),
                calories_consumed: consumed,
                calories_burned: burned,
                water_intake: water,
                activity_minutes: 0.0,
                weight: Some(weight),
                macros: Macros::default(),
            })
            .collect()
    }
}

/// Loads a provider's records into `storage` and returns the seeded user id.
/// Goals are stored with the Mifflin-St Jeor calorie target.
pub async fn seed(
    storage: &dyn Storage,
    provider: &dyn DefaultDataProvider,
    today: NaiveDate,
) -> Result<String, StorageError> {
    let profile = provider.profile();
    let user_id = profile
        .id
        .clone()
        .unwrap_or_else(|| SAMPLE_USER_ID.to_string());

    storage.save_profile(&user_id, profile.clone()).await?;
    storage
        .save_goals(&user_id, UserGoals::for_profile(profile, BmrFormula::MifflinStJeor))
        .await?;
    for log in provider.previous_days(today) {
        let date = log
            .date
            .ok_or_else(|| StorageError::Backend("seed log is missing its date".to_string()))?;
        storage.save_daily_log(&user_id, date, log).await?;
    }
    storage
        .save_daily_log(&user_id, today, provider.today_stats(today))
        .await?;
    for meal in provider.today_meals() {
        storage.save_meal(&user_id, today, meal).await?;
    }

    debug!(user_id = %user_id, %today, "seeded storage with default data");
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let storage = InMemoryStorage::new();
        assert!(matches!(
            storage.get_profile("nobody").await,
            Err(StorageError::NotFound { entity: "profile", .. })
        ));
        assert!(matches!(
            storage.get_daily_log("nobody", day(1)).await,
            Err(StorageError::NotFound { entity: "daily log", .. })
        ));
        assert!(matches!(
            storage.get_goals("nobody").await,
            Err(StorageError::NotFound { entity: "goals", .. })
        ));
        assert!(storage.get_meals("nobody", day(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_goals_are_replaced_and_validated() {
        let storage = InMemoryStorage::new();
        let mut goals = UserGoals::for_profile(SampleData.profile(), BmrFormula::MifflinStJeor);
        storage.save_goals("a", goals.clone()).await.unwrap();
        goals.daily_calories = 1600.0;
        storage.save_goals("a", goals).await.unwrap();

        let stored = storage.get_goals("a").await.unwrap();
        assert_eq!(stored.daily_calories, 1600.0);
        assert_eq!(stored.profile.id.as_deref(), Some("a"));

        let mut broken = stored.clone();
        broken.daily_calories = f64::NAN;
        assert!(matches!(
            storage.save_goals("a", broken).await,
            Err(StorageError::Backend(_))
        ));
        assert_eq!(storage.get_goals("a").await.unwrap().daily_calories, 1600.0);
    }

    #[tokio::test]
    async fn test_activity_accumulates() {
        let storage = InMemoryStorage::new();
        storage.record_activity("a", day(2), 30.0, 300.0).await.unwrap();
        let log = storage.record_activity("a", day(2), 15.0, 45.0).await.unwrap();
        assert_eq!(log.activity_minutes, 45.0);
        assert_eq!(log.calories_burned, 345.0);
        assert!(storage.record_activity("a", day(2), -1.0, 0.0).await.is_err());
    }

    #[tokio::test]
    async fn test_range_is_inclusive_ordered_and_per_user() {
        let storage = InMemoryStorage::new();
        for d in [5, 1, 3, 7] {
            storage
                .save_daily_log("a", day(d), DailyStats::default())
                .await
                .unwrap();
        }
        storage
            .save_daily_log("b", day(4), DailyStats::default())
            .await
            .unwrap();

        let logs = storage.get_daily_logs("a", day(1), day(5)).await.unwrap();
        let dates: Vec<_> = logs.iter().map(|l| l.date.unwrap()).collect();
        assert_eq!(dates, vec![day(1), day(3), day(5)]);
        assert!(storage.get_daily_logs("a", day(6), day(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_water_update_creates_log() {
        let storage = InMemoryStorage::new();
        let log = storage.update_water_intake("a", day(2), 750.0).await.unwrap();
        assert_eq!(log.water_intake, 750.0);
        assert_eq!(log.calories_consumed, 0.0);
        assert_eq!(storage.get_daily_log("a", day(2)).await.unwrap().water_intake, 750.0);
        assert!(storage.update_water_intake("a", day(2), f64::NAN).await.is_err());
    }

    #[tokio::test]
    async fn test_seed_sample_data() {
        let storage = InMemoryStorage::new();
        let today = day(10);
        let user_id = seed(&storage, &SampleData, today).await.unwrap();
        assert_eq!(user_id, SAMPLE_USER_ID);
        assert_eq!(storage.get_goals(&user_id).await.unwrap().daily_calories, 1763.0);

        let week = storage
            .get_daily_logs(&user_id, today - Duration::days(6), today)
            .await
            .unwrap();
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, Some(day(4)));
        assert_eq!(week[6].calories_consumed, 1450.0);

        let meals = storage.get_meals(&user_id, today).await.unwrap();
        assert_eq!(meals.len(), 7);
        assert_eq!(meals[0].meal_type, MealType::Breakfast);
    }
}
