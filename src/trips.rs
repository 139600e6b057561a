// Trip data access + access control.
//
// Row-level security is expressed as explicit checks: a user may read a
// trip they own or collaborate on, and only the owner may delete it.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::db::{format_date, format_timestamp, not_found_or, record_event};
use crate::entities::{Collaborator, NewTrip, Role, Trip, TripUpdate};
use crate::error::{StoreError, StoreResult};
use crate::session::get_user;

/// The caller's role on a trip, or None without access.
pub fn access_role(conn: &Connection, trip_id: &str, user_id: &str) -> StoreResult<Option<Role>> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT user_id FROM trips WHERE id = ?1",
            params![trip_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(owner) = owner else {
        return Err(StoreError::not_found("trip", trip_id));
    };
    if owner == user_id {
        return Ok(Some(Role::Owner));
    }

    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM trip_collaborators WHERE trip_id = ?1 AND user_id = ?2",
            params![trip_id, user_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(role.map(|r| Role::parse(&r).unwrap_or(Role::Viewer)))
}

/// Any access (read).
pub fn require_access(conn: &Connection, trip_id: &str, user_id: &str) -> StoreResult<Role> {
    access_role(conn, trip_id, user_id)?.ok_or_else(|| StoreError::forbidden(trip_id, user_id))
}

/// Write access: owner or editor.
pub fn require_edit_access(conn: &Connection, trip_id: &str, user_id: &str) -> StoreResult<Role> {
    let role = require_access(conn, trip_id, user_id)?;
    if role.can_edit() {
        Ok(role)
    } else {
        Err(StoreError::forbidden(trip_id, user_id))
    }
}

pub fn create_trip(conn: &Connection, user_id: &str, new_trip: &NewTrip) -> StoreResult<Trip> {
    new_trip.validate().map_err(StoreError::Invalid)?;

    if get_user(conn, user_id)?.is_none() {
        return Err(StoreError::not_found("user", user_id));
    }

    let trip = Trip {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name: new_trip.name.trim().to_string(),
        start_date: new_trip.start_date,
        end_date: new_trip.end_date,
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO trips (id, user_id, name, start_date, end_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            trip.id,
            trip.user_id,
            trip.name,
            trip.start_date.map(format_date),
            trip.end_date.map(format_date),
            format_timestamp(trip.created_at),
        ],
    )?;

    record_event(
        conn,
        "trip_created",
        "trip",
        &trip.id,
        serde_json::json!({ "name": trip.name }),
        user_id,
    )?;
    info!(trip_id = %trip.id, user_id, "trip created");

    Ok(trip)
}

/// Fetch a trip the caller can see.
pub fn get_trip(conn: &Connection, user_id: &str, trip_id: &str) -> StoreResult<Trip> {
    require_access(conn, trip_id, user_id)?;
    load_trip(conn, trip_id)
}

/// Fetch without an access check (invitation previews).
pub(crate) fn load_trip(conn: &Connection, trip_id: &str) -> StoreResult<Trip> {
    let sql = format!("SELECT {} FROM trips WHERE id = ?1", Trip::COLUMNS);
    conn.query_row(&sql, params![trip_id], Trip::from_row)
        .map_err(|e| not_found_or(e, "trip", trip_id))
}

/// Owned and collaborative trips, de-duplicated, newest first.
pub fn list_trips(conn: &Connection, user_id: &str) -> StoreResult<Vec<Trip>> {
    let owned_sql = format!("SELECT {} FROM trips WHERE user_id = ?1", Trip::COLUMNS);
    let mut stmt = conn.prepare(&owned_sql)?;
    let mut trips = stmt
        .query_map(params![user_id], Trip::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT t.id, t.user_id, t.name, t.start_date, t.end_date, t.created_at
         FROM trips t
         INNER JOIN trip_collaborators c ON c.trip_id = t.id
         WHERE c.user_id = ?1",
    )?;
    let shared = stmt
        .query_map(params![user_id], Trip::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for trip in shared {
        if !trips.iter().any(|t| t.id == trip.id) {
            trips.push(trip);
        }
    }

    trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(trips)
}

pub fn update_trip(
    conn: &Connection,
    user_id: &str,
    trip_id: &str,
    update: &TripUpdate,
) -> StoreResult<Trip> {
    require_edit_access(conn, trip_id, user_id)?;
    let current = load_trip(conn, trip_id)?;
    let next = update.apply(&current).map_err(StoreError::Invalid)?;

    conn.execute(
        "UPDATE trips SET name = ?1, start_date = ?2, end_date = ?3 WHERE id = ?4",
        params![
            next.name,
            next.start_date.map(format_date),
            next.end_date.map(format_date),
            trip_id,
        ],
    )?;

    record_event(
        conn,
        "trip_updated",
        "trip",
        trip_id,
        serde_json::to_value(update)?,
        user_id,
    )?;

    Ok(next)
}

/// Delete a trip with its pins, collaborators and invitations. Owner only.
pub fn delete_trip(conn: &Connection, user_id: &str, trip_id: &str) -> StoreResult<()> {
    if require_access(conn, trip_id, user_id)? != Role::Owner {
        return Err(StoreError::forbidden(trip_id, user_id));
    }

    conn.execute("DELETE FROM trips WHERE id = ?1", params![trip_id])?;

    record_event(conn, "trip_deleted", "trip", trip_id, serde_json::json!({}), user_id)?;
    info!(trip_id, user_id, "trip deleted");
    Ok(())
}

pub fn list_collaborators(
    conn: &Connection,
    user_id: &str,
    trip_id: &str,
) -> StoreResult<Vec<Collaborator>> {
    require_access(conn, trip_id, user_id)?;

    let sql = format!(
        "SELECT {} FROM trip_collaborators WHERE trip_id = ?1 ORDER BY created_at",
        Collaborator::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let collaborators = stmt
        .query_map(params![trip_id], Collaborator::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(collaborators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::entities::NewUser;
    use crate::session::ensure_user_exists;
    use chrono::NaiveDate;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        ensure_user_exists(&conn, &NewUser::new("owner", "owner@example.com")).unwrap();
        ensure_user_exists(&conn, &NewUser::new("friend", "friend@example.com")).unwrap();
        ensure_user_exists(&conn, &NewUser::new("stranger", "stranger@example.com")).unwrap();
        conn
    }

    fn new_trip(name: &str) -> NewTrip {
        NewTrip {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn add_collaborator(conn: &Connection, trip_id: &str, user_id: &str, role: Role) {
        conn.execute(
            "INSERT INTO trip_collaborators (id, trip_id, user_id, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uuid::Uuid::new_v4().to_string(),
                trip_id,
                user_id,
                role.as_str(),
                format_timestamp(Utc::now()),
            ],
        )
        .unwrap();
    }

    #[test]
    fn test_create_trip_requires_user_record() {
        let conn = test_conn();
        let err = create_trip(&conn, "ghost", &new_trip("Rome")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "user", .. }));
    }

    #[test]
    fn test_create_trip_rejects_inverted_dates() {
        let conn = test_conn();
        let trip = NewTrip {
            name: "Rome".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 6, 10),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 1),
        };
        assert!(matches!(create_trip(&conn, "owner", &trip), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_access_roles() {
        let conn = test_conn();
        let trip = create_trip(&conn, "owner", &new_trip("Rome")).unwrap();
        add_collaborator(&conn, &trip.id, "friend", Role::Viewer);

        assert_eq!(access_role(&conn, &trip.id, "owner").unwrap(), Some(Role::Owner));
        assert_eq!(access_role(&conn, &trip.id, "friend").unwrap(), Some(Role::Viewer));
        assert_eq!(access_role(&conn, &trip.id, "stranger").unwrap(), None);

        assert!(require_access(&conn, &trip.id, "friend").is_ok());
        assert!(matches!(
            require_edit_access(&conn, &trip.id, "friend"),
            Err(StoreError::Forbidden { .. })
        ));
        assert!(matches!(
            access_role(&conn, "missing", "owner"),
            Err(StoreError::NotFound { entity: "trip", .. })
        ));
    }

    #[test]
    fn test_list_trips_merges_owned_and_shared_newest_first() {
        let conn = test_conn();
        let first = create_trip(&conn, "owner", &new_trip("First")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let theirs = create_trip(&conn, "friend", &new_trip("Friend's")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let latest = create_trip(&conn, "owner", &new_trip("Latest")).unwrap();

        add_collaborator(&conn, &theirs.id, "owner", Role::Editor);

        let trips = list_trips(&conn, "owner").unwrap();
        let ids: Vec<&str> = trips.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![latest.id.as_str(), theirs.id.as_str(), first.id.as_str()]);

        assert!(list_trips(&conn, "stranger").unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete_permissions() {
        let conn = test_conn();
        let trip = create_trip(&conn, "owner", &new_trip("Rome")).unwrap();
        add_collaborator(&conn, &trip.id, "friend", Role::Editor);

        let renamed = update_trip(
            &conn,
            "friend",
            &trip.id,
            &TripUpdate {
                name: Some("Roma".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(renamed.name, "Roma");
        assert_eq!(get_trip(&conn, "owner", &trip.id).unwrap().name, "Roma");

        // Editors cannot delete
        assert!(matches!(
            delete_trip(&conn, "friend", &trip.id),
            Err(StoreError::Forbidden { .. })
        ));

        delete_trip(&conn, "owner", &trip.id).unwrap();
        assert!(matches!(
            get_trip(&conn, "owner", &trip.id),
            Err(StoreError::NotFound { .. })
        ));
        let collaborators: i64 = conn
            .query_row("SELECT COUNT(*) FROM trip_collaborators", [], |row| row.get(0))
            .unwrap();
        assert_eq!(collaborators, 0);
    }

    #[test]
    fn test_list_collaborators() {
        let conn = test_conn();
        let trip = create_trip(&conn, "owner", &new_trip("Rome")).unwrap();
        add_collaborator(&conn, &trip.id, "friend", Role::Editor);

        let collaborators = list_collaborators(&conn, "owner", &trip.id).unwrap();
        assert_eq!(collaborators.len(), 1);
        assert_eq!(collaborators[0].user_id, "friend");
        assert_eq!(collaborators[0].role, Role::Editor);

        assert!(list_collaborators(&conn, "stranger", &trip.id).is_err());
    }
}
