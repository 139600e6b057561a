// Travel Tagger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod invitations;
pub mod map;
pub mod ordering;       // Dense pin ordering (pure)
pub mod pins;
pub mod reconciliation; // Optimistic reorder state machine
pub mod session;
pub mod trips;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use db::{
    Event,
    open_database, setup_database, insert_event, record_event, get_events_for_entity,
};
pub use entities::{
    Collaborator, Invitation, NewPin, NewTrip, NewUser, Pin, PinCategory, PinDetails,
    Role, Trip, TripUpdate, User,
};
pub use error::{InvitationError, StoreError, StoreResult};
pub use invitations::{
    InvitationPreview, InvitationTicket,
    accept_invitation, create_invitation, share_link, validate_invitation,
};
pub use ordering::ReorderIssue;
pub use pins::{PinEdit, PinRepository};
pub use reconciliation::{
    PendingReorder, PersistStrategy, PinListView, PinStore, ReorderOutcome, ReorderPhase, Resync,
};
pub use session::{EnsureUser, Session, ensure_user_exists, resolve_session};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
