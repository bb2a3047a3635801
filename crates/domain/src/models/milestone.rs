//! Milestone domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error;

/// Metric tracked against milestone tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneType {
    Users,
    Suburbs,
    Cities,
}

impl MilestoneType {
    pub const ALL: [MilestoneType; 3] = [
        MilestoneType::Users,
        MilestoneType::Suburbs,
        MilestoneType::Cities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneType::Users => "users",
            MilestoneType::Suburbs => "suburbs",
            MilestoneType::Cities => "cities",
        }
    }
}

impl FromStr for MilestoneType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(MilestoneType::Users),
            "suburbs" => Ok(MilestoneType::Suburbs),
            "cities" => Ok(MilestoneType::Cities),
            _ => Err(format!("Unknown milestone type: {}", s)),
        }
    }
}

impl std::fmt::Display for MilestoneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierError {
    #[error("Tier list must not be empty")]
    Empty,

    #[error("Tier values must be positive (got {0})")]
    NonPositive(i64),

    #[error("Tier values must be strictly ascending ({previous} then {next})")]
    NotAscending { previous: i64, next: i64 },
}

/// Strictly ascending list of positive thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MilestoneTiers(Vec<i64>);

impl MilestoneTiers {
    pub fn new(tiers: Vec<i64>) -> Result<Self, TierError> {
        if tiers.is_empty() {
            return Err(TierError::Empty);
        }
        if let Some(&bad) = tiers.iter().find(|&&t| t <= 0) {
            return Err(TierError::NonPositive(bad));
        }
        if let Some(pair) = tiers.windows(2).find(|w| w[0] >= w[1]) {
            return Err(TierError::NotAscending {
                previous: pair[0],
                next: pair[1],
            });
        }
        Ok(Self(tiers))
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    /// Tiers at or below `count`, ascending.
    pub fn reached(&self, count: i64) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied().take_while(move |&t| t <= count)
    }
}

/// Tier lists for every milestone type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneConfig {
    pub users: MilestoneTiers,
    pub suburbs: MilestoneTiers,
    pub cities: MilestoneTiers,
}

impl MilestoneConfig {
    pub fn tiers(&self, metric_type: MilestoneType) -> &MilestoneTiers {
        match metric_type {
            MilestoneType::Users => &self.users,
            MilestoneType::Suburbs => &self.suburbs,
            MilestoneType::Cities => &self.cities,
        }
    }
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            users: MilestoneTiers(vec![100, 500, 1000, 5000, 10000, 50000, 100000]),
            suburbs: MilestoneTiers(vec![5, 10, 25, 50, 100, 200]),
            cities: MilestoneTiers(vec![3, 5, 10, 20]),
        }
    }
}

/// Next tier to reach, or `Maxed` once every tier has been passed.
///
/// Serializes as the tier number, or the string `"Maxed!"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextGoal {
    Tier(i64),
    Maxed,
}

impl Serialize for NextGoal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NextGoal::Tier(value) => serializer.serialize_i64(*value),
            NextGoal::Maxed => serializer.serialize_str("Maxed!"),
        }
    }
}

/// Smallest tier strictly greater than `count`.
pub fn next_goal(tiers: &[i64], count: i64) -> NextGoal {
    tiers
        .iter()
        .copied()
        .find(|&t| t > count)
        .map(NextGoal::Tier)
        .unwrap_or(NextGoal::Maxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MilestoneProgress {
    pub current: i64,
    pub next_goal: NextGoal,
}

/// Progress for every milestone type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneOverview {
    pub users: MilestoneProgress,
    pub suburbs: MilestoneProgress,
    pub cities: MilestoneProgress,
}

/// Current counts for every milestone type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneCounts {
    pub users: i64,
    pub suburbs: i64,
    pub cities: i64,
}

impl MilestoneCounts {
    pub fn get(&self, metric_type: MilestoneType) -> i64 {
        match metric_type {
            MilestoneType::Users => self.users,
            MilestoneType::Suburbs => self.suburbs,
            MilestoneType::Cities => self.cities,
        }
    }
}

/// A durable record of a threshold being reached. Never updated or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub metric_type: MilestoneType,
    pub value: i64,
    pub reached_at: DateTime<Utc>,
}

/// Emitted once for each newly recorded threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneReached {
    pub metric_type: MilestoneType,
    pub threshold: i64,
    pub current: i64,
}

impl MilestoneReached {
    pub fn subject(&self) -> String {
        format!("Milestone Unlocked: {} {}", self.threshold, self.metric_type)
    }

    /// Plain-text body, suitable for SMS.
    pub fn message(&self) -> String {
        format!(
            "Milestone reached: {} {}!\nCheck your dashboard for updates.",
            self.threshold, self.metric_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_goal_minimal_tier_above_count() {
        let tiers = [100, 500, 1000];
        assert_eq!(next_goal(&tiers, 150), NextGoal::Tier(500));
        assert_eq!(next_goal(&tiers, 0), NextGoal::Tier(100));
        assert_eq!(next_goal(&tiers, 100), NextGoal::Tier(500));
        assert_eq!(next_goal(&tiers, 999), NextGoal::Tier(1000));
    }

    #[test]
    fn test_next_goal_maxed() {
        assert_eq!(next_goal(&[100, 500, 1000], 1000), NextGoal::Maxed);
        assert_eq!(next_goal(&[100, 500, 1000], 25_000), NextGoal::Maxed);
        assert_eq!(next_goal(&[], 3), NextGoal::Maxed);
    }

    #[test]
    fn test_next_goal_exhaustive_small_range() {
        let tiers = [3, 5, 10, 20];
        for count in 0..30 {
            let expected = tiers.iter().copied().filter(|&t| t > count).min();
            match next_goal(&tiers, count) {
                NextGoal::Tier(t) => assert_eq!(Some(t), expected),
                NextGoal::Maxed => assert_eq!(None, expected),
            }
        }
    }

    #[test]
    fn test_next_goal_serialization() {
        assert_eq!(serde_json::to_string(&NextGoal::Tier(500)).unwrap(), "500");
        assert_eq!(serde_json::to_string(&NextGoal::Maxed).unwrap(), "\"Maxed!\"");
    }

    #[test]
    fn test_tiers_validation() {
        assert!(MilestoneTiers::new(vec![1, 2, 3]).is_ok());
        assert_eq!(MilestoneTiers::new(vec![]).unwrap_err(), TierError::Empty);
        assert_eq!(
            MilestoneTiers::new(vec![5, 5]).unwrap_err(),
            TierError::NotAscending { previous: 5, next: 5 }
        );
        assert_eq!(
            MilestoneTiers::new(vec![0, 5]).unwrap_err(),
            TierError::NonPositive(0)
        );
    }

    #[test]
    fn test_tiers_reached() {
        let tiers = MilestoneTiers::new(vec![100, 500, 1000]).unwrap();
        assert_eq!(tiers.reached(1200).collect::<Vec<_>>(), vec![100, 500, 1000]);
        assert_eq!(tiers.reached(500).collect::<Vec<_>>(), vec![100, 500]);
        assert!(tiers.reached(99).next().is_none());
    }

    #[test]
    fn test_default_config() {
        let config = MilestoneConfig::default();
        assert_eq!(config.tiers(MilestoneType::Cities).as_slice(), &[3, 5, 10, 20]);
        assert_eq!(config.tiers(MilestoneType::Users).as_slice()[0], 100);
    }

    #[test]
    fn test_milestone_reached_texts() {
        let event = MilestoneReached {
            metric_type: MilestoneType::Suburbs,
            threshold: 25,
            current: 27,
        };
        assert_eq!(event.subject(), "Milestone Unlocked: 25 suburbs");
        assert!(event.message().starts_with("Milestone reached: 25 suburbs!"));
    }

    #[test]
    fn test_milestone_type_roundtrip() {
        for t in MilestoneType::ALL {
            assert_eq!(t.as_str().parse::<MilestoneType>().unwrap(), t);
        }
        assert!("towns".parse::<MilestoneType>().is_err());
    }
}
