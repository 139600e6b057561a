// Pin data access.
//
// Every write keeps a trip's orders dense: create appends at the current
// count, delete renumbers the pins behind the removed one, and the atomic
// reorder rewrites the whole sequence in one transaction.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use crate::db::{format_timestamp, not_found_or, record_event};
use crate::entities::{NewPin, Pin, PinDetails};
use crate::error::{StoreError, StoreResult};
use crate::ordering::{move_item, renumber};
use crate::reconciliation::PinStore;
use crate::trips::{require_access, require_edit_access};

/// All pins of a trip ordered by `order` ascending.
pub fn fetch_pins(conn: &Connection, user_id: &str, trip_id: &str) -> StoreResult<Vec<Pin>> {
    require_access(conn, trip_id, user_id)?;
    load_pins(conn, trip_id)
}

/// Same as `fetch_pins` without the access check.
pub(crate) fn load_pins(conn: &Connection, trip_id: &str) -> StoreResult<Vec<Pin>> {
    let sql = format!(
        r#"SELECT {} FROM pins WHERE trip_id = ?1 ORDER BY "order" ASC, created_at ASC"#,
        Pin::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let pins = stmt
        .query_map(params![trip_id], Pin::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pins)
}

pub fn get_pin(conn: &Connection, user_id: &str, pin_id: &str) -> StoreResult<Pin> {
    let pin = load_pin(conn, pin_id)?;
    require_access(conn, &pin.trip_id, user_id)?;
    Ok(pin)
}

fn load_pin(conn: &Connection, pin_id: &str) -> StoreResult<Pin> {
    let sql = format!("SELECT {} FROM pins WHERE id = ?1", Pin::COLUMNS);
    conn.query_row(&sql, params![pin_id], Pin::from_row)
        .map_err(|e| not_found_or(e, "pin", pin_id))
}

pub fn count_pins(conn: &Connection, trip_id: &str) -> StoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM pins WHERE trip_id = ?1",
        params![trip_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Create a pin at the end of the trip's sequence (order = current count).
pub fn create_pin(
    conn: &Connection,
    user_id: &str,
    trip_id: &str,
    new_pin: &NewPin,
) -> StoreResult<Pin> {
    new_pin.validate().map_err(StoreError::Invalid)?;
    require_edit_access(conn, trip_id, user_id)?;

    let tx = conn.unchecked_transaction()?;
    let order = count_pins(&tx, trip_id)?;

    let pin = Pin {
        id: uuid::Uuid::new_v4().to_string(),
        trip_id: trip_id.to_string(),
        nickname: new_pin.nickname.trim().to_string(),
        latitude: new_pin.latitude,
        longitude: new_pin.longitude,
        notes: new_pin.notes.clone(),
        category: new_pin.category.clone(),
        google_maps_id: new_pin.google_maps_id.clone(),
        visited_flag: false,
        order,
        created_at: Utc::now(),
        updated_at: None,
    };

    tx.execute(
        r#"INSERT INTO pins (id, trip_id, nickname, latitude, longitude, notes, category,
                             google_maps_id, visited_flag, "order", created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
        params![
            pin.id,
            pin.trip_id,
            pin.nickname,
            pin.latitude,
            pin.longitude,
            pin.notes,
            pin.category,
            pin.google_maps_id,
            pin.visited_flag,
            pin.order,
            format_timestamp(pin.created_at),
        ],
    )?;

    record_event(
        &tx,
        "pin_created",
        "pin",
        &pin.id,
        serde_json::json!({ "trip_id": trip_id, "order": order }),
        user_id,
    )?;
    tx.commit()?;

    info!(pin_id = %pin.id, trip_id, order, "pin created");
    Ok(pin)
}

/// Edit nickname, notes, category and visited flag.
pub fn update_pin_details(
    conn: &Connection,
    user_id: &str,
    pin_id: &str,
    details: &PinDetails,
) -> StoreResult<Pin> {
    details.validate().map_err(StoreError::Invalid)?;
    let pin = load_pin(conn, pin_id)?;
    require_edit_access(conn, &pin.trip_id, user_id)?;

    let now = Utc::now();
    conn.execute(
        "UPDATE pins SET nickname = ?1, notes = ?2, category = ?3, visited_flag = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            details.nickname.trim(),
            details.notes,
            details.category,
            details.visited_flag,
            format_timestamp(now),
            pin_id,
        ],
    )?;

    record_event(
        conn,
        "pin_updated",
        "pin",
        pin_id,
        serde_json::to_value(details)?,
        user_id,
    )?;

    load_pin(conn, pin_id)
}

/// Per-row order write. Does not touch any other pin, so a sequence of
/// these calls may leave the trip transiently non-dense.
pub fn update_pin_order(
    conn: &Connection,
    user_id: &str,
    pin_id: &str,
    order: i64,
) -> StoreResult<()> {
    if order < 0 {
        return Err(StoreError::Invalid(format!("order must be >= 0, got {}", order)));
    }
    let pin = load_pin(conn, pin_id)?;
    require_edit_access(conn, &pin.trip_id, user_id)?;

    conn.execute(
        r#"UPDATE pins SET "order" = ?1, updated_at = ?2 WHERE id = ?3"#,
        params![order, format_timestamp(Utc::now()), pin_id],
    )?;
    debug!(pin_id, from = pin.order, to = order, "pin order updated");
    Ok(())
}

/// Atomic reorder: move one pin to `new_order_index` and renumber the whole
/// trip in a single transaction. Returns the committed sequence.
pub fn reorder_pin(
    conn: &Connection,
    user_id: &str,
    moved_pin_id: &str,
    new_order_index: usize,
) -> StoreResult<Vec<Pin>> {
    let moved = load_pin(conn, moved_pin_id)?;
    require_edit_access(conn, &moved.trip_id, user_id)?;

    let tx = conn.unchecked_transaction()?;
    let mut pins = load_pins(&tx, &moved.trip_id)?;

    if new_order_index >= pins.len() {
        return Err(StoreError::Invalid(format!(
            "order index {} out of range for {} pins",
            new_order_index,
            pins.len()
        )));
    }

    let source_index = pins
        .iter()
        .position(|p| p.id == moved_pin_id)
        .ok_or_else(|| StoreError::not_found("pin", moved_pin_id))?;
    let previous: Vec<i64> = {
        let mut orders: Vec<(String, i64)> =
            pins.iter().map(|p| (p.id.clone(), p.order)).collect();
        move_item(&mut orders, source_index, new_order_index);
        orders.into_iter().map(|(_, order)| order).collect()
    };

    move_item(&mut pins, source_index, new_order_index);
    renumber(&mut pins);

    let now = format_timestamp(Utc::now());
    let mut written = 0;
    for (pin, old_order) in pins.iter().zip(previous) {
        if pin.order != old_order {
            tx.execute(
                r#"UPDATE pins SET "order" = ?1, updated_at = ?2 WHERE id = ?3"#,
                params![pin.order, now, pin.id],
            )?;
            written += 1;
        }
    }

    record_event(
        &tx,
        "pin_reordered",
        "trip",
        &moved.trip_id,
        serde_json::json!({
            "moved_pin_id": moved_pin_id,
            "from": source_index,
            "new_order_index": new_order_index,
            "rows_written": written,
        }),
        user_id,
    )?;
    tx.commit()?;

    info!(
        trip_id = %moved.trip_id,
        moved_pin_id,
        from = source_index,
        to = new_order_index,
        written,
        "pins reordered"
    );
    load_pins(conn, &moved.trip_id)
}

/// Delete a pin and close the gap it leaves in the sequence.
pub fn delete_pin(conn: &Connection, user_id: &str, pin_id: &str) -> StoreResult<()> {
    let pin = load_pin(conn, pin_id)?;
    require_edit_access(conn, &pin.trip_id, user_id)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM pins WHERE id = ?1", params![pin_id])?;

    let mut remaining = load_pins(&tx, &pin.trip_id)?;
    let before: Vec<i64> = remaining.iter().map(|p| p.order).collect();
    renumber(&mut remaining);
    for (pin, old_order) in remaining.iter().zip(before) {
        if pin.order != old_order {
            tx.execute(
                r#"UPDATE pins SET "order" = ?1 WHERE id = ?2"#,
                params![pin.order, pin.id],
            )?;
        }
    }

    record_event(
        &tx,
        "pin_deleted",
        "pin",
        pin_id,
        serde_json::json!({ "trip_id": pin.trip_id, "order": pin.order }),
        user_id,
    )?;
    tx.commit()?;

    info!(pin_id, trip_id = %pin.trip_id, "pin deleted");
    Ok(())
}

/// One entry of a bulk edit.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PinEdit {
    pub id: String,
    #[serde(flatten)]
    pub details: PinDetails,
}

/// Save edited details for many pins of one trip, one row at a time.
/// The first failure aborts; earlier rows stay written.
pub fn bulk_update_pins(
    conn: &Connection,
    user_id: &str,
    trip_id: &str,
    edits: &[PinEdit],
) -> StoreResult<usize> {
    require_edit_access(conn, trip_id, user_id)?;

    let mut saved = 0;
    for edit in edits {
        let pin = load_pin(conn, &edit.id)?;
        if pin.trip_id != trip_id {
            warn!(pin_id = %edit.id, trip_id, "bulk edit pin belongs to another trip");
            return Err(StoreError::Invalid(format!(
                "pin {} does not belong to trip {}",
                edit.id, trip_id
            )));
        }
        update_pin_details(conn, user_id, &edit.id, &edit.details)?;
        saved += 1;
    }

    info!(trip_id, saved, "bulk pin edit saved");
    Ok(saved)
}

// ============================================================================
// PinStore over SQLite
// ============================================================================

/// The SQLite tables seen through the reconciliation seam, acting as one user.
pub struct PinRepository<'a> {
    conn: &'a Connection,
    user_id: String,
}

impl<'a> PinRepository<'a> {
    pub fn new(conn: &'a Connection, user_id: impl Into<String>) -> Self {
        PinRepository {
            conn,
            user_id: user_id.into(),
        }
    }
}

impl PinStore for PinRepository<'_> {
    fn fetch_pins(&self, trip_id: &str) -> StoreResult<Vec<Pin>> {
        fetch_pins(self.conn, &self.user_id, trip_id)
    }

    fn reorder_pin(&self, moved_pin_id: &str, new_order_index: usize) -> StoreResult<()> {
        reorder_pin(self.conn, &self.user_id, moved_pin_id, new_order_index).map(|_| ())
    }

    fn update_pin_order(&self, pin_id: &str, order: i64) -> StoreResult<()> {
        update_pin_order(self.conn, &self.user_id, pin_id, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_events_for_entity, setup_database};
    use crate::entities::{NewTrip, NewUser};
    use crate::ordering::is_dense;
    use crate::session::ensure_user_exists;
    use crate::trips::create_trip;
    use pretty_assertions::assert_eq;

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        ensure_user_exists(&conn, &NewUser::new("owner", "owner@example.com")).unwrap();
        ensure_user_exists(&conn, &NewUser::new("stranger", "stranger@example.com")).unwrap();
        let trip = create_trip(
            &conn,
            "owner",
            &NewTrip {
                name: "Paris".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        (conn, trip.id)
    }

    fn add(conn: &Connection, trip_id: &str, nickname: &str) -> Pin {
        create_pin(
            conn,
            "owner",
            trip_id,
            &NewPin {
                nickname: nickname.to_string(),
                latitude: 48.85,
                longitude: 2.35,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn names(conn: &Connection, trip_id: &str) -> Vec<(String, i64)> {
        fetch_pins(conn, "owner", trip_id)
            .unwrap()
            .into_iter()
            .map(|p| (p.nickname, p.order))
            .collect()
    }

    #[test]
    fn test_create_appends_at_count() {
        let (conn, trip_id) = setup();
        let a = add(&conn, &trip_id, "A");
        let b = add(&conn, &trip_id, "B");
        let c = add(&conn, &trip_id, "C");

        assert_eq!((a.order, b.order, c.order), (0, 1, 2));
        assert_eq!(count_pins(&conn, &trip_id).unwrap(), 3);
    }

    #[test]
    fn test_reorder_first_to_last() {
        let (conn, trip_id) = setup();
        let a = add(&conn, &trip_id, "A");
        add(&conn, &trip_id, "B");
        add(&conn, &trip_id, "C");

        let committed = reorder_pin(&conn, "owner", &a.id, 2).unwrap();

        assert!(is_dense(&committed));
        assert_eq!(
            names(&conn, &trip_id),
            vec![("B".to_string(), 0), ("C".to_string(), 1), ("A".to_string(), 2)]
        );

        let events = get_events_for_entity(&conn, "trip", &trip_id).unwrap();
        assert_eq!(events[0].event_type, "pin_reordered");
        assert_eq!(events[0].data["rows_written"], 3);
    }

    #[test]
    fn test_reorder_last_to_first() {
        let (conn, trip_id) = setup();
        add(&conn, &trip_id, "A");
        add(&conn, &trip_id, "B");
        let c = add(&conn, &trip_id, "C");

        reorder_pin(&conn, "owner", &c.id, 0).unwrap();

        assert_eq!(
            names(&conn, &trip_id),
            vec![("C".to_string(), 0), ("A".to_string(), 1), ("B".to_string(), 2)]
        );
    }

    #[test]
    fn test_reorder_out_of_range_leaves_rows_untouched() {
        let (conn, trip_id) = setup();
        let a = add(&conn, &trip_id, "A");
        add(&conn, &trip_id, "B");

        let err = reorder_pin(&conn, "owner", &a.id, 2).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert_eq!(
            names(&conn, &trip_id),
            vec![("A".to_string(), 0), ("B".to_string(), 1)]
        );
    }

    #[test]
    fn test_delete_renumbers_remaining() {
        let (conn, trip_id) = setup();
        add(&conn, &trip_id, "A");
        let b = add(&conn, &trip_id, "B");
        add(&conn, &trip_id, "C");
        add(&conn, &trip_id, "D");

        delete_pin(&conn, "owner", &b.id).unwrap();

        assert_eq!(
            names(&conn, &trip_id),
            vec![("A".to_string(), 0), ("C".to_string(), 1), ("D".to_string(), 2)]
        );

        // Next append lands right after the renumbered tail
        let e = add(&conn, &trip_id, "E");
        assert_eq!(e.order, 3);
    }

    #[test]
    fn test_strangers_cannot_read_or_write() {
        let (conn, trip_id) = setup();
        let a = add(&conn, &trip_id, "A");

        assert!(matches!(
            fetch_pins(&conn, "stranger", &trip_id),
            Err(StoreError::Forbidden { .. })
        ));
        assert!(matches!(
            update_pin_order(&conn, "stranger", &a.id, 0),
            Err(StoreError::Forbidden { .. })
        ));
        assert!(matches!(
            delete_pin(&conn, "stranger", &a.id),
            Err(StoreError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_update_pin_details() {
        let (conn, trip_id) = setup();
        let a = add(&conn, &trip_id, "A");

        let updated = update_pin_details(
            &conn,
            "owner",
            &a.id,
            &PinDetails {
                nickname: "Arc de Triomphe".to_string(),
                notes: Some("Go at sunset".to_string()),
                category: Some("Attraction".to_string()),
                visited_flag: true,
            },
        )
        .unwrap();

        assert_eq!(updated.nickname, "Arc de Triomphe");
        assert!(updated.visited_flag);
        assert!(updated.updated_at.is_some());
        assert_eq!(updated.order, 0);
    }

    #[test]
    fn test_bulk_update_stops_at_first_failure() {
        let (conn, trip_id) = setup();
        let a = add(&conn, &trip_id, "A");
        let b = add(&conn, &trip_id, "B");

        let edit = |id: &str, nickname: &str| PinEdit {
            id: id.to_string(),
            details: PinDetails {
                nickname: nickname.to_string(),
                notes: None,
                category: None,
                visited_flag: false,
            },
        };

        let err = bulk_update_pins(
            &conn,
            "owner",
            &trip_id,
            &[edit(&a.id, "A2"), edit(&b.id, " "), edit("missing", "X")],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        // First row committed, second rejected
        assert_eq!(
            names(&conn, &trip_id),
            vec![("A2".to_string(), 0), ("B".to_string(), 1)]
        );

        let saved = bulk_update_pins(&conn, "owner", &trip_id, &[edit(&b.id, "B2")]).unwrap();
        assert_eq!(saved, 1);
    }

    #[test]
    fn test_repository_per_row_writes() {
        let (conn, trip_id) = setup();
        let a = add(&conn, &trip_id, "A");
        let b = add(&conn, &trip_id, "B");
        let repo = PinRepository::new(&conn, "owner");

        repo.update_pin_order(&a.id, 1).unwrap();
        repo.update_pin_order(&b.id, 0).unwrap();

        let pins = repo.fetch_pins(&trip_id).unwrap();
        assert_eq!(pins[0].id, b.id);
        assert!(is_dense(&pins));
        assert!(matches!(
            repo.update_pin_order(&a.id, -1),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_view_round_trip_for_both_strategies() {
        use crate::reconciliation::{PersistStrategy, PinListView};

        for strategy in [PersistStrategy::Atomic, PersistStrategy::PerRow] {
            let (conn, trip_id) = setup();
            let a = add(&conn, &trip_id, "A");
            add(&conn, &trip_id, "B");
            add(&conn, &trip_id, "C");
            let d = add(&conn, &trip_id, "D");
            let repo = PinRepository::new(&conn, "owner");

            let mut view = PinListView::load(&repo, &trip_id, strategy).unwrap();
            assert!(view.reorder(&repo, &a.id, 0, 3).is_committed());
            assert!(view.reorder(&repo, &d.id, 2, 0).is_committed());

            let server = fetch_pins(&conn, "owner", &trip_id).unwrap();
            assert!(is_dense(&server));
            assert_eq!(
                names(&conn, &trip_id),
                vec![
                    ("D".to_string(), 0),
                    ("B".to_string(), 1),
                    ("C".to_string(), 2),
                    ("A".to_string(), 3)
                ]
            );
            let local: Vec<&str> = view.pins().iter().map(|p| p.id.as_str()).collect();
            let remote: Vec<&str> = server.iter().map(|p| p.id.as_str()).collect();
            assert_eq!(local, remote);
        }
    }

    #[test]
    fn test_view_reverts_when_access_is_lost() {
        use crate::reconciliation::{PersistStrategy, PinListView, ReorderOutcome, Resync};

        let (conn, trip_id) = setup();
        let a = add(&conn, &trip_id, "A");
        add(&conn, &trip_id, "B");
        let owner = PinRepository::new(&conn, "owner");
        let stranger = PinRepository::new(&conn, "stranger");

        let mut view = PinListView::load(&owner, &trip_id, PersistStrategy::Atomic).unwrap();
        let outcome = view.reorder(&stranger, &a.id, 0, 1);

        assert!(matches!(
            outcome,
            ReorderOutcome::Reverted {
                cause: StoreError::Forbidden { .. },
                resync: Resync::FetchFailed(_),
            }
        ));
        assert!(!view.can_retry());
        assert_eq!(
            names(&conn, &trip_id),
            vec![("A".to_string(), 0), ("B".to_string(), 1)]
        );
    }
}
