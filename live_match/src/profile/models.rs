//! Profile and preference data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// User ID type (owned by the main platform profile)
pub type UserId = i64;

/// Youngest age accepted anywhere in live matching
pub const MIN_AGE: i32 = 18;

/// Oldest age accepted in an age range
pub const MAX_AGE: i32 = 99;

/// Upper bound for the search radius
pub const MAX_DISTANCE_KM: f64 = 200.0;

/// Default search radius for freshly created preferences
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 10.0;

/// Maximum description length in characters
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Gender as recorded on the main profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::NonBinary => write!(f, "non_binary"),
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "non_binary" => Ok(Gender::NonBinary),
            other => Err(format!("unknown gender '{other}'")),
        }
    }
}

/// Which genders a user wants to be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekingGender {
    Male,
    Female,
    NonBinary,
    Everyone,
}

impl SeekingGender {
    /// Whether a candidate of `gender` satisfies this preference
    pub fn accepts(&self, gender: Gender) -> bool {
        match self {
            SeekingGender::Everyone => true,
            SeekingGender::Male => gender == Gender::Male,
            SeekingGender::Female => gender == Gender::Female,
            SeekingGender::NonBinary => gender == Gender::NonBinary,
        }
    }
}

impl fmt::Display for SeekingGender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekingGender::Male => write!(f, "male"),
            SeekingGender::Female => write!(f, "female"),
            SeekingGender::NonBinary => write!(f, "non_binary"),
            SeekingGender::Everyone => write!(f, "everyone"),
        }
    }
}

impl FromStr for SeekingGender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(SeekingGender::Male),
            "female" => Ok(SeekingGender::Female),
            "non_binary" => Ok(SeekingGender::NonBinary),
            "everyone" => Ok(SeekingGender::Everyone),
            other => Err(format!("unknown seeking gender '{other}'")),
        }
    }
}

/// Sexual orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Straight,
    Gay,
    Lesbian,
    Bisexual,
    Pansexual,
    Other,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Straight => write!(f, "straight"),
            Orientation::Gay => write!(f, "gay"),
            Orientation::Lesbian => write!(f, "lesbian"),
            Orientation::Bisexual => write!(f, "bisexual"),
            Orientation::Pansexual => write!(f, "pansexual"),
            Orientation::Other => write!(f, "other"),
        }
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "straight" => Ok(Orientation::Straight),
            "gay" => Ok(Orientation::Gay),
            "lesbian" => Ok(Orientation::Lesbian),
            "bisexual" => Ok(Orientation::Bisexual),
            "pansexual" => Ok(Orientation::Pansexual),
            "other" => Ok(Orientation::Other),
            other => Err(format!("unknown orientation '{other}'")),
        }
    }
}

/// The slice of the main platform profile live matching reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: UserId,
    pub display_name: String,
    pub age: i32,
    pub gender: Gender,
    pub orientation: Option<Orientation>,
}

/// Live-mode profile, independent of the main profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralProfile {
    pub user_id: UserId,
    pub description: Option<String>,
    pub photo_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile as returned to clients: photo resolved to a short-lived URL
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub age: Option<i32>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Uploaded photo reference
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUpload {
    pub photo_key: String,
    pub photo_url: String,
}

/// Matching preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub user_id: UserId,
    pub seeking_gender: SeekingGender,
    pub min_age: i32,
    pub max_age: i32,
    pub max_distance_km: f64,
    pub orientation: Orientation,
}

impl Preferences {
    /// Defaults derived from the main profile
    ///
    /// Seeking gender follows orientation: straight users see the opposite
    /// gender, gay and lesbian users their own, everyone else sees everyone.
    /// The age window is centred on the user's own age.
    pub fn defaults_for(user: &UserSummary) -> Self {
        let orientation = user.orientation.unwrap_or(Orientation::Other);
        let seeking_gender = match (orientation, user.gender) {
            (Orientation::Straight, Gender::Male) => SeekingGender::Female,
            (Orientation::Straight, Gender::Female) => SeekingGender::Male,
            (Orientation::Gay, Gender::Male) => SeekingGender::Male,
            (Orientation::Lesbian, Gender::Female) | (Orientation::Gay, Gender::Female) => {
                SeekingGender::Female
            }
            _ => SeekingGender::Everyone,
        };

        Self {
            user_id: user.user_id,
            seeking_gender,
            min_age: (user.age - 10).max(MIN_AGE),
            max_age: (user.age + 10).min(MAX_AGE),
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            orientation,
        }
    }

    /// Apply a partial update; unset fields keep their current value
    pub fn apply(&mut self, update: &PreferencesUpdate) {
        if let Some(seeking_gender) = update.seeking_gender {
            self.seeking_gender = seeking_gender;
        }
        if let Some(min_age) = update.min_age {
            self.min_age = min_age;
        }
        if let Some(max_age) = update.max_age {
            self.max_age = max_age;
        }
        if let Some(max_distance_km) = update.max_distance_km {
            self.max_distance_km = max_distance_km;
        }
        if let Some(orientation) = update.sexual_orientation {
            self.orientation = orientation;
        }
    }

    /// Whether `candidate` falls inside this user's age and gender filter
    pub fn accepts(&self, candidate: &UserSummary) -> bool {
        (self.min_age..=self.max_age).contains(&candidate.age)
            && self.seeking_gender.accepts(candidate.gender)
    }
}

/// Body of `POST /profile` and `PATCH /profile`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileRequest {
    pub description: Option<String>,
}

/// Partial preferences update (all fields optional)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub seeking_gender: Option<SeekingGender>,
    pub max_distance_km: Option<f64>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub sexual_orientation: Option<Orientation>,
}
