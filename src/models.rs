use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(format!("unknown gender {other:?}, expected Male or Female")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    /// Stored text; rows written before validation may hold other values.
    pub gender: String,
    pub persian_date: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub addresses: Vec<AddressRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub details: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    #[serde(alias = "firstname")]
    pub first_name: String,
    #[serde(alias = "lastname")]
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub gender: String,
    #[serde(default)]
    pub persian_date: Option<String>,
    #[serde(default)]
    pub addresses: Vec<NewAddress>,
}

/// Validated form of [`NewUser`] handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDraft {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub gender: Gender,
    pub persian_date: String,
    pub addresses: Vec<AddressDraft>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default, alias = "firstname")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastname")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub persian_date: Option<String>,
}

/// Only the `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub gender: Option<Gender>,
    pub persian_date: Option<String>,
    /// `Some` replaces every address of the user.
    pub addresses: Option<Vec<AddressDraft>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAddress {
    pub subject: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressDraft {
    pub subject: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressPatch {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// The slice of a user row the statistics need.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    pub persian_date: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub gender: String,
}

impl From<&UserRecord> for StatRecord {
    fn from(user: &UserRecord) -> Self {
        Self {
            persian_date: user.persian_date.clone(),
            created_at: Some(user.created_at),
            gender: user.gender.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderBucketStat {
    pub bucket: String,
    pub male_count: u64,
    pub female_count: u64,
    pub male_percentage: f64,
    pub female_percentage: f64,
}

impl GenderBucketStat {
    pub fn new(bucket: impl Into<String>, male_count: u64, female_count: u64) -> Self {
        let total = male_count + female_count;
        let (male_percentage, female_percentage) = if total == 0 {
            (0.0, 0.0)
        } else {
            let male = round_percentage(male_count as f64 / total as f64 * 100.0);
            (male, round_percentage(100.0 - male))
        };

        Self {
            bucket: bucket.into(),
            male_count,
            female_count,
            male_percentage,
            female_percentage,
        }
    }

    pub fn total(&self) -> u64 {
        self.male_count + self.female_count
    }
}

/// Rounds half-to-even at two decimals.
pub fn round_percentage(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllStats {
    pub total: GenderBucketStat,
    pub daily: Vec<GenderBucketStat>,
    pub weekly: Vec<GenderBucketStat>,
    pub monthly: Vec<GenderBucketStat>,
}
