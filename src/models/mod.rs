//! Wrappers for all objects within EventCall

pub mod calendar;
pub mod checkin;
mod errors;
pub mod events;
pub mod exports;
pub mod images;
pub mod invites;
pub mod rsvps;
pub mod users;

pub use checkin::{CheckinPayload, CHECKIN_TYPE, CHECKIN_VALIDITY_HOURS};
pub use errors::InvalidEnum;
pub use events::{
    Answer, Event, EventCreate, EventFlags, EventListParams, EventStatus, EventUpdate, Question,
    QuestionKind, SeatingChart, SeatingTable,
};
pub use images::{ImageUpload, Photo, PhotoDelete};
pub use invites::{edit_url, InvitePayload};
pub use rsvps::{
    validation_hash, Rsvp, RsvpListParams, SubmissionEnvelope, SubmissionMethod,
};
pub use users::{
    AuthResponse, CsrfToken, PasswordUpdate, User, UserCreate, UserList, UserResponse, UserRole,
    UserUpdate,
};
