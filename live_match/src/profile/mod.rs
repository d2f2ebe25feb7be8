//! Ephemeral live-mode profiles and matching preferences.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{ProfileError, ProfileResult};
pub use manager::{ProfileManager, sniff_image, validate_photo};
pub use models::{
    DEFAULT_MAX_DISTANCE_KM, EphemeralProfile, Gender, MAX_AGE, MAX_DESCRIPTION_CHARS,
    MAX_DISTANCE_KM, MIN_AGE, Orientation, PhotoUpload, Preferences, PreferencesUpdate,
    ProfileRequest, ProfileView, SeekingGender, UserId, UserSummary,
};
