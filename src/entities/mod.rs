// Entity models and their row mappings.
//
// Each entity has a stable UUID identity and maps 1:1 onto a table created
// in `db::setup_database`.

pub mod invitation;
pub mod pin;
pub mod trip;
pub mod user;

pub use invitation::Invitation;
pub use pin::{NewPin, Pin, PinCategory, PinDetails, DEFAULT_MARKER_COLOR};
pub use trip::{format_date_range, Collaborator, NewTrip, Role, Trip, TripUpdate};
pub use user::{NewUser, User};
