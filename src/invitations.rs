// ✉️ Invitation flow - share a trip through a time-limited link
//
// An invitation is a row in `trip_invitations` keyed by a random token.
// Anyone holding the link can preview the trip until it expires, and
// any signed-in user can accept it to become an editor.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::db::{format_timestamp, record_event};
use crate::entities::{Invitation, NewUser, Pin, Role, Trip};
use crate::error::{InvitationError, StoreError};
use crate::pins::load_pins;
use crate::session::{ensure_user_exists, get_user};
use crate::trips::{access_role, load_trip, require_access};

pub const DEFAULT_INVITE_TTL_HOURS: i64 = 24;

/// What the inviter gets back: enough to build a share link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvitationTicket {
    pub token: String,
    pub trip_id: String,
    pub trip_name: String,
    pub expires_at: DateTime<Utc>,
}

/// Shown to the invitee before accepting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvitationPreview {
    pub invitation: Invitation,
    pub trip: Trip,
    pub owner_email: Option<String>,
    pub pins: Vec<Pin>,
}

pub fn share_link(site_url: &str, token: &str) -> String {
    format!("{}/accept-invitation/{}", site_url.trim_end_matches('/'), token)
}

/// Issue a new invitation for a trip the caller can see.
pub fn create_invitation(
    conn: &Connection,
    user_id: &str,
    trip_id: &str,
    ttl: Duration,
) -> Result<InvitationTicket, InvitationError> {
    require_access(conn, trip_id, user_id)?;
    let trip = load_trip(conn, trip_id)?;

    let now = Utc::now();
    let invitation = Invitation {
        id: uuid::Uuid::new_v4().to_string(),
        trip_id: trip_id.to_string(),
        invited_by: user_id.to_string(),
        invitation_token: uuid::Uuid::new_v4().to_string(),
        expires_at: now + ttl,
        created_at: now,
    };

    conn.execute(
        "INSERT INTO trip_invitations (id, trip_id, invited_by, invitation_token, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            invitation.id,
            invitation.trip_id,
            invitation.invited_by,
            invitation.invitation_token,
            format_timestamp(invitation.expires_at),
            format_timestamp(invitation.created_at),
        ],
    )?;

    record_event(
        conn,
        "invitation_created",
        "trip",
        trip_id,
        serde_json::json!({
            "invitation_id": invitation.id,
            "expires_at": format_timestamp(invitation.expires_at),
        }),
        user_id,
    )?;
    info!(trip_id, invited_by = user_id, "invitation created");

    Ok(InvitationTicket {
        token: invitation.invitation_token,
        trip_id: trip.id,
        trip_name: trip.name,
        expires_at: invitation.expires_at,
    })
}

fn find_invitation(conn: &Connection, token: &str) -> Result<Invitation, InvitationError> {
    let sql = format!(
        "SELECT {} FROM trip_invitations WHERE invitation_token = ?1",
        Invitation::COLUMNS
    );
    conn.query_row(&sql, params![token], Invitation::from_row)
        .optional()?
        .ok_or(InvitationError::NotFound)
}

fn live_invitation(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Invitation, InvitationError> {
    let invitation = find_invitation(conn, token)?;
    if invitation.is_expired_at(now) {
        return Err(InvitationError::Expired);
    }
    Ok(invitation)
}

/// Look up a token and return the trip it grants access to.
/// No session needed: the token is the credential.
pub fn validate_invitation(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<InvitationPreview, InvitationError> {
    let invitation = live_invitation(conn, token, now)?;
    let trip = load_trip(conn, &invitation.trip_id)?;
    let owner_email = get_user(conn, &trip.user_id)?.map(|u| u.email);
    let pins = load_pins(conn, &trip.id)?;

    Ok(InvitationPreview {
        invitation,
        trip,
        owner_email,
        pins,
    })
}

/// Join the trip behind `token` as an editor. `email` is used to create
/// the user record on first sign-in; it may be omitted for known users.
pub fn accept_invitation(
    conn: &Connection,
    token: &str,
    user_id: &str,
    email: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Trip, InvitationError> {
    let invitation = live_invitation(conn, token, now)?;

    if get_user(conn, user_id)?.is_none() {
        let email = email.ok_or_else(|| StoreError::not_found("user", user_id))?;
        ensure_user_exists(conn, &NewUser::new(user_id, email))?;
    }

    if access_role(conn, &invitation.trip_id, user_id)?.is_some() {
        return Err(InvitationError::AlreadyCollaborator);
    }

    let result = conn.execute(
        "INSERT INTO trip_collaborators (id, trip_id, user_id, role, created_by, invitation_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            uuid::Uuid::new_v4().to_string(),
            invitation.trip_id,
            user_id,
            Role::Editor.as_str(),
            invitation.invited_by,
            invitation.id,
            format_timestamp(now),
        ],
    );
    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(InvitationError::AlreadyCollaborator);
        }
        Err(e) => return Err(e.into()),
    }

    record_event(
        conn,
        "invitation_accepted",
        "trip",
        &invitation.trip_id,
        serde_json::json!({ "invitation_id": invitation.id, "user_id": user_id }),
        user_id,
    )?;
    info!(trip_id = %invitation.trip_id, user_id, "invitation accepted");

    Ok(load_trip(conn, &invitation.trip_id)?)
}
