//! The client side core of EventCall
//!
//! EventCall is an invitation and RSVP system for unit events. This crate
//! holds everything between the pages and the wire: the typed client for the
//! REST backend and the git-contents fallback store, the submission pipeline
//! with its retry ladder and local spool, caching, sessions, routing and the
//! startup gates that keep them all in order.

#[macro_use]
extern crate serde_derive;

pub mod cache;
pub mod client;
pub mod init;
pub mod loading;
pub mod models;
pub mod pipeline;
pub mod router;
pub mod session;
pub mod spool;
pub mod state;

pub use cache::{CacheKey, CacheManager, Mutation};
pub use client::{
    ClientConf, ClientSettings, ContentStore, Error, ErrorKind, EventCall, EventCallClientBuilder,
    Keys, RetryPolicy, StoreKeys,
};
pub use init::InitMutex;
pub use loading::LoadingStateManager;
pub use pipeline::{SubmissionForm, SubmissionPipeline, SubmissionState};
pub use router::{Dispatch, Route, Router, Scheme};
pub use session::{Session, SessionStore};
pub use spool::Spool;
pub use state::{MemoryStateStore, StateStore};
