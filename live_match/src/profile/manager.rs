//! Ephemeral profile, photo and preference management.

use chrono::Utc;
use std::sync::Arc;

use super::{
    errors::{ProfileError, ProfileResult},
    models::{
        EphemeralProfile, MAX_AGE, MAX_DESCRIPTION_CHARS, MAX_DISTANCE_KM, MIN_AGE, PhotoUpload,
        Preferences, PreferencesUpdate, ProfileRequest, ProfileView, UserId, UserSummary,
    },
};
use crate::{
    db::LiveStore,
    events::{PhotoStorage, UserDirectory},
    matching::MatchProfile,
};

/// Accepted image formats: (content type, magic bytes at offset 0)
const IMAGE_SIGNATURES: &[(&str, &[u8])] = &[
    ("image/jpeg", &[0xFF, 0xD8, 0xFF]),
    ("image/png", &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
];

/// Detect the image type from its leading bytes
///
/// Recognises JPEG, PNG and WebP (RIFF container with a `WEBP` form type).
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    IMAGE_SIGNATURES
        .iter()
        .find(|(_, magic)| bytes.starts_with(magic))
        .map(|(content_type, _)| *content_type)
}

fn normalize_content_type(declared: &str) -> String {
    let base = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if base == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        base
    }
}

/// Validate an uploaded photo
///
/// # Errors
///
/// * `ProfileError::InvalidPhoto` - Empty, too large, not an accepted image,
///   or the declared type disagrees with the content
pub fn validate_photo(
    declared_content_type: &str,
    bytes: &[u8],
    max_bytes: usize,
) -> ProfileResult<&'static str> {
    if bytes.is_empty() {
        return Err(ProfileError::InvalidPhoto("file is empty".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(ProfileError::InvalidPhoto(format!(
            "file exceeds {max_bytes} bytes"
        )));
    }
    let detected = sniff_image(bytes).ok_or_else(|| {
        ProfileError::InvalidPhoto("only JPEG, PNG and WebP images are accepted".to_string())
    })?;
    if normalize_content_type(declared_content_type) != detected {
        return Err(ProfileError::InvalidPhoto(format!(
            "declared type does not match content ({detected})"
        )));
    }
    Ok(detected)
}

fn clean_description(description: Option<&str>) -> ProfileResult<Option<String>> {
    let Some(text) = description.map(str::trim) else {
        return Ok(None);
    };
    if text.is_empty() {
        return Ok(None);
    }
    if text.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ProfileError::DescriptionTooLong {
            max: MAX_DESCRIPTION_CHARS,
        });
    }
    Ok(Some(text.to_string()))
}

fn validate_preferences(preferences: &Preferences) -> ProfileResult<()> {
    if preferences.min_age < MIN_AGE || preferences.max_age > MAX_AGE {
        return Err(ProfileError::InvalidPreferences(format!(
            "ages must be within {MIN_AGE}..={MAX_AGE}"
        )));
    }
    if preferences.min_age > preferences.max_age {
        return Err(ProfileError::InvalidPreferences(
            "minAge must not exceed maxAge".to_string(),
        ));
    }
    if !preferences.max_distance_km.is_finite()
        || preferences.max_distance_km <= 0.0
        || preferences.max_distance_km > MAX_DISTANCE_KM
    {
        return Err(ProfileError::InvalidPreferences(format!(
            "maxDistanceKm must be within (0, {MAX_DISTANCE_KM}]"
        )));
    }
    Ok(())
}

/// Profile manager
#[derive(Clone)]
pub struct ProfileManager {
    store: Arc<dyn LiveStore>,
    directory: Arc<dyn UserDirectory>,
    photos: Arc<dyn PhotoStorage>,
    max_photo_bytes: usize,
}

impl ProfileManager {
    /// Create a new profile manager
    pub fn new(
        store: Arc<dyn LiveStore>,
        directory: Arc<dyn UserDirectory>,
        photos: Arc<dyn PhotoStorage>,
        max_photo_bytes: usize,
    ) -> Self {
        Self {
            store,
            directory,
            photos,
            max_photo_bytes,
        }
    }

    /// Main-profile summary for a user
    ///
    /// # Errors
    ///
    /// * `ProfileError::UserNotFound` - No main profile
    pub async fn user_summary(&self, user_id: UserId) -> ProfileResult<UserSummary> {
        self.directory
            .find_user(user_id)
            .await?
            .ok_or(ProfileError::UserNotFound(user_id))
    }

    /// Create the caller's live profile
    ///
    /// # Errors
    ///
    /// * `ProfileError::UserNotFound` - No main profile to attach to
    /// * `ProfileError::DescriptionTooLong` - Description over the limit
    /// * `ProfileError::ProfileAlreadyExists` - Profile already created
    pub async fn create_profile(
        &self,
        user_id: UserId,
        request: &ProfileRequest,
    ) -> ProfileResult<ProfileView> {
        let summary = self.user_summary(user_id).await?;
        let description = clean_description(request.description.as_deref())?;

        let now = Utc::now();
        let profile = EphemeralProfile {
            user_id,
            description,
            photo_key: None,
            created_at: now,
            updated_at: now,
        };
        if !self.store.insert_profile(&profile).await? {
            return Err(ProfileError::ProfileAlreadyExists(user_id));
        }

        log::info!("User {user_id} created a live profile");
        Ok(self.view(profile, Some(&summary)).await)
    }

    /// The caller's live profile, photo resolved to a short-lived URL
    ///
    /// # Errors
    ///
    /// * `ProfileError::ProfileNotFound` - No live profile
    pub async fn get_profile(&self, user_id: UserId) -> ProfileResult<ProfileView> {
        let profile = self.require_profile(user_id).await?;
        let summary = self.summary_or_warn(user_id).await;
        Ok(self.view(profile, summary.as_ref()).await)
    }

    /// Update the description; absent fields are left alone, an empty
    /// string clears it
    ///
    /// # Errors
    ///
    /// * `ProfileError::ProfileNotFound` - No live profile
    /// * `ProfileError::DescriptionTooLong` - Description over the limit
    pub async fn update_profile(
        &self,
        user_id: UserId,
        request: &ProfileRequest,
    ) -> ProfileResult<ProfileView> {
        let mut profile = self.require_profile(user_id).await?;
        if request.description.is_some() {
            profile.description = clean_description(request.description.as_deref())?;
        }
        profile.updated_at = Utc::now();

        if !self.store.update_profile(&profile).await? {
            return Err(ProfileError::ProfileNotFound(user_id));
        }

        let summary = self.summary_or_warn(user_id).await;
        Ok(self.view(profile, summary.as_ref()).await)
    }

    /// Validate and store a profile photo
    ///
    /// # Arguments
    ///
    /// * `user_id` - Caller
    /// * `content_type` - Declared MIME type of the upload
    /// * `bytes` - File contents
    ///
    /// # Errors
    ///
    /// * `ProfileError::ProfileNotFound` - No live profile
    /// * `ProfileError::InvalidPhoto` - Rejected by validation
    pub async fn upload_photo(
        &self,
        user_id: UserId,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> ProfileResult<PhotoUpload> {
        let mut profile = self.require_profile(user_id).await?;
        let detected = validate_photo(content_type, &bytes, self.max_photo_bytes)?;

        let size = bytes.len();
        let photo_key = self.photos.store(user_id, detected, bytes).await?;
        profile.photo_key = Some(photo_key.clone());
        profile.updated_at = Utc::now();
        if !self.store.update_profile(&profile).await? {
            return Err(ProfileError::ProfileNotFound(user_id));
        }

        let photo_url = self.photos.url_for(&photo_key).await?;
        log::info!("User {user_id} uploaded a {detected} photo ({size} bytes)");
        Ok(PhotoUpload {
            photo_key,
            photo_url,
        })
    }

    /// Create preferences, backfilling unset fields from the main profile
    ///
    /// # Errors
    ///
    /// * `ProfileError::UserNotFound` - No main profile to derive defaults from
    /// * `ProfileError::InvalidPreferences` - Values out of range
    /// * `ProfileError::PreferencesAlreadyExist` - Already created
    pub async fn create_preferences(
        &self,
        user_id: UserId,
        update: &PreferencesUpdate,
    ) -> ProfileResult<Preferences> {
        let summary = self.user_summary(user_id).await?;
        let mut preferences = Preferences::defaults_for(&summary);
        preferences.apply(update);
        validate_preferences(&preferences)?;

        if !self.store.insert_preferences(&preferences).await? {
            return Err(ProfileError::PreferencesAlreadyExist(user_id));
        }
        Ok(preferences)
    }

    /// # Errors
    ///
    /// * `ProfileError::PreferencesNotFound` - Not created yet
    pub async fn get_preferences(&self, user_id: UserId) -> ProfileResult<Preferences> {
        self.store
            .find_preferences(user_id)
            .await?
            .ok_or(ProfileError::PreferencesNotFound(user_id))
    }

    /// Partially update preferences
    ///
    /// # Errors
    ///
    /// * `ProfileError::PreferencesNotFound` - Not created yet
    /// * `ProfileError::InvalidPreferences` - Values out of range
    pub async fn update_preferences(
        &self,
        user_id: UserId,
        update: &PreferencesUpdate,
    ) -> ProfileResult<Preferences> {
        let mut preferences = self.get_preferences(user_id).await?;
        preferences.apply(update);
        validate_preferences(&preferences)?;

        if !self.store.update_preferences(&preferences).await? {
            return Err(ProfileError::PreferencesNotFound(user_id));
        }
        Ok(preferences)
    }

    /// Stored preferences, or defaults derived from the main profile
    pub async fn effective_preferences(
        &self,
        summary: &UserSummary,
    ) -> ProfileResult<Preferences> {
        Ok(self
            .store
            .find_preferences(summary.user_id)
            .await?
            .unwrap_or_else(|| Preferences::defaults_for(summary)))
    }

    /// Card shown to the other side of a match
    pub async fn match_profile(&self, user_id: UserId) -> ProfileResult<MatchProfile> {
        let summary = self.summary_or_warn(user_id).await;
        let profile = self.store.find_profile(user_id).await?;

        let photo_url = match profile.as_ref().and_then(|p| p.photo_key.as_deref()) {
            Some(key) => self.photo_url_or_warn(key).await,
            None => None,
        };

        Ok(MatchProfile {
            user_id,
            display_name: summary.as_ref().map(|s| s.display_name.clone()),
            age: summary.as_ref().map(|s| s.age),
            description: profile.and_then(|p| p.description),
            photo_url,
        })
    }

    async fn require_profile(&self, user_id: UserId) -> ProfileResult<EphemeralProfile> {
        self.store
            .find_profile(user_id)
            .await?
            .ok_or(ProfileError::ProfileNotFound(user_id))
    }

    async fn summary_or_warn(&self, user_id: UserId) -> Option<UserSummary> {
        match self.directory.find_user(user_id).await {
            Ok(summary) => summary,
            Err(e) => {
                log::warn!("User directory lookup for {user_id} failed: {e}");
                None
            }
        }
    }

    async fn photo_url_or_warn(&self, key: &str) -> Option<String> {
        match self.photos.url_for(key).await {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!("Photo URL for {key} unavailable: {e}");
                None
            }
        }
    }

    async fn view(&self, profile: EphemeralProfile, summary: Option<&UserSummary>) -> ProfileView {
        let photo_url = match profile.photo_key.as_deref() {
            Some(key) => self.photo_url_or_warn(key).await,
            None => None,
        };
        ProfileView {
            user_id: profile.user_id,
            display_name: summary.map(|s| s.display_name.clone()),
            age: summary.map(|s| s.age),
            description: profile.description,
            photo_url,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::MemoryStore,
        events::{InMemoryPhotoStorage, InMemoryUserDirectory},
        profile::{Gender, Orientation, SeekingGender},
    };

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    async fn manager() -> ProfileManager {
        let directory = InMemoryUserDirectory::new();
        directory
            .insert(UserSummary {
                user_id: 1,
                display_name: "Kai".to_string(),
                age: 28,
                gender: Gender::Male,
                orientation: Some(Orientation::Gay),
            })
            .await;
        ProfileManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(directory),
            Arc::new(InMemoryPhotoStorage::new()),
            1024,
        )
    }

    #[test]
    fn test_sniff_image() {
        assert_eq!(sniff_image(PNG), Some("image/png"));
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image(b"GIF89a"), None);
        assert_eq!(sniff_image(b"<svg onload=alert(1)>"), None);
    }

    #[test]
    fn test_validate_photo_rejects_mismatch() {
        assert!(validate_photo("image/png", PNG, 1024).is_ok());
        assert!(validate_photo("image/jpeg", PNG, 1024).is_err());
        assert!(validate_photo("image/png", PNG, 4).is_err());
        assert!(validate_photo("image/png", &[], 1024).is_err());
        assert_eq!(
            validate_photo("IMAGE/JPG; q=1", &[0xFF, 0xD8, 0xFF, 0xE1], 1024).unwrap(),
            "image/jpeg"
        );
    }

    #[tokio::test]
    async fn test_profile_create_conflict_and_update() {
        let profiles = manager().await;
        let request = ProfileRequest {
            description: Some("  coffee first  ".to_string()),
        };

        let view = profiles.create_profile(1, &request).await.unwrap();
        assert_eq!(view.description.as_deref(), Some("coffee first"));
        assert_eq!(view.display_name.as_deref(), Some("Kai"));

        let err = profiles.create_profile(1, &request).await.unwrap_err();
        assert_eq!(err.code(), "PROFILE_ALREADY_EXISTS");

        // Absent description leaves the stored one untouched
        let view = profiles
            .update_profile(1, &ProfileRequest::default())
            .await
            .unwrap();
        assert_eq!(view.description.as_deref(), Some("coffee first"));
    }

    #[tokio::test]
    async fn test_description_limit() {
        let profiles = manager().await;
        let request = ProfileRequest {
            description: Some("x".repeat(MAX_DESCRIPTION_CHARS + 1)),
        };
        let err = profiles.create_profile(1, &request).await.unwrap_err();
        assert!(matches!(err, ProfileError::DescriptionTooLong { .. }));
    }

    #[tokio::test]
    async fn test_photo_requires_profile() {
        let profiles = manager().await;
        let err = profiles
            .upload_photo(1, "image/png", PNG.to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::ProfileNotFound(1)));

        profiles
            .create_profile(1, &ProfileRequest::default())
            .await
            .unwrap();
        let upload = profiles
            .upload_photo(1, "image/png", PNG.to_vec())
            .await
            .unwrap();
        let view = profiles.get_profile(1).await.unwrap();
        assert_eq!(view.photo_url, Some(upload.photo_url));
    }

    #[tokio::test]
    async fn test_preferences_backfill_and_partial_update() {
        let profiles = manager().await;
        let created = profiles
            .create_preferences(
                1,
                &PreferencesUpdate {
                    max_distance_km: Some(3.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.seeking_gender, SeekingGender::Male);
        assert_eq!(created.max_distance_km, 3.0);
        assert_eq!((created.min_age, created.max_age), (18, 38));

        let err = profiles
            .create_preferences(1, &PreferencesUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::PreferencesAlreadyExist(1)));

        let updated = profiles
            .update_preferences(
                1,
                &PreferencesUpdate {
                    min_age: Some(25),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.min_age, 25);
        assert_eq!(updated.max_distance_km, 3.0);
    }

    #[tokio::test]
    async fn test_preferences_validation() {
        let profiles = manager().await;
        let err = profiles
            .create_preferences(
                1,
                &PreferencesUpdate {
                    min_age: Some(40),
                    max_age: Some(30),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::InvalidPreferences(_)));

        let err = profiles
            .update_preferences(1, &PreferencesUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::PreferencesNotFound(1)));
    }
}
