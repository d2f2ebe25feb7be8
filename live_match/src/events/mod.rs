//! Event publishing and external collaborator contracts.

pub mod bus;
pub mod collaborators;
pub mod errors;

pub use bus::{EventBus, LiveEvent};
pub use collaborators::{
    InMemoryPhotoStorage, InMemoryUserDirectory, LogNotifier, Notification, Notifier,
    PgUserDirectory, PhotoStorage, UserDirectory,
};
pub use errors::{CollaboratorError, CollaboratorResult};
