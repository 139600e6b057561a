// Dense ordering of pins within a trip.
//
// Pure list operations: no I/O. Positions are zero-based and the orders
// of a well-formed sequence are exactly 0..N-1.

use crate::entities::Pin;

/// Why a move request was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderIssue {
    #[error("source and target are the same position ({0})")]
    SamePosition(usize),

    #[error("index {index} out of range for {len} pins")]
    OutOfRange { index: usize, len: usize },

    #[error("pin {0} is not in this list")]
    UnknownPin(String),

    #[error("pin {pin_id} is at index {actual}, not {claimed}")]
    IndexMismatch {
        pin_id: String,
        claimed: usize,
        actual: usize,
    },

    #[error("another reorder is still in progress")]
    Busy,

    #[error("no reorder in progress")]
    NoGesture,
}

/// Move the element at `from` to `to`, shifting the ones in between by one.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

/// Assign every pin its index as `order`. Returns how many changed.
pub fn renumber(pins: &mut [Pin]) -> usize {
    let mut changed = 0;
    for (index, pin) in pins.iter_mut().enumerate() {
        let order = index as i64;
        if pin.order != order {
            pin.order = order;
            changed += 1;
        }
    }
    changed
}

/// Check a reorder request against the current sequence.
pub fn validate_move(
    pins: &[Pin],
    moved_pin_id: &str,
    source_index: usize,
    target_index: usize,
) -> Result<(), ReorderIssue> {
    let len = pins.len();
    for index in [source_index, target_index] {
        if index >= len {
            return Err(ReorderIssue::OutOfRange { index, len });
        }
    }

    let actual = pins
        .iter()
        .position(|p| p.id == moved_pin_id)
        .ok_or_else(|| ReorderIssue::UnknownPin(moved_pin_id.to_string()))?;
    if actual != source_index {
        return Err(ReorderIssue::IndexMismatch {
            pin_id: moved_pin_id.to_string(),
            claimed: source_index,
            actual,
        });
    }

    if source_index == target_index {
        return Err(ReorderIssue::SamePosition(source_index));
    }

    Ok(())
}

/// Apply a move and renumber. Returns the new sequence; the input is untouched.
pub fn reordered(
    pins: &[Pin],
    moved_pin_id: &str,
    source_index: usize,
    target_index: usize,
) -> Result<Vec<Pin>, ReorderIssue> {
    validate_move(pins, moved_pin_id, source_index, target_index)?;

    let mut next = pins.to_vec();
    move_item(&mut next, source_index, target_index);
    renumber(&mut next);
    Ok(next)
}

/// Pins whose `order` differs between `before` and `after`, as
/// (pin id, new order) pairs in `after` sequence.
pub fn changed_orders(before: &[Pin], after: &[Pin]) -> Vec<(String, i64)> {
    after
        .iter()
        .filter(|pin| {
            before
                .iter()
                .find(|old| old.id == pin.id)
                .map_or(true, |old| old.order != pin.order)
        })
        .map(|pin| (pin.id.clone(), pin.order))
        .collect()
}

/// True when orders are exactly 0..N-1 in sequence.
pub fn is_dense(pins: &[Pin]) -> bool {
    pins.iter()
        .enumerate()
        .all(|(index, pin)| pin.order == index as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn pins(names: &[&str]) -> Vec<Pin> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Pin {
                id: name.to_string(),
                trip_id: "trip".to_string(),
                nickname: name.to_string(),
                latitude: 0.0,
                longitude: 0.0,
                notes: None,
                category: None,
                google_maps_id: None,
                visited_flag: false,
                order: i as i64,
                created_at: Utc::now(),
                updated_at: None,
            })
            .collect()
    }

    fn summary(pins: &[Pin]) -> Vec<(String, i64)> {
        pins.iter().map(|p| (p.id.clone(), p.order)).collect()
    }

    #[test]
    fn test_move_first_to_last() {
        let before = pins(&["A", "B", "C"]);
        let after = reordered(&before, "A", 0, 2).unwrap();

        assert_eq!(
            summary(&after),
            vec![("B".to_string(), 0), ("C".to_string(), 1), ("A".to_string(), 2)]
        );
    }

    #[test]
    fn test_move_last_to_first() {
        let before = pins(&["A", "B", "C", "D"]);
        let after = reordered(&before, "D", 3, 0).unwrap();

        assert_eq!(
            summary(&after),
            vec![
                ("D".to_string(), 0),
                ("A".to_string(), 1),
                ("B".to_string(), 2),
                ("C".to_string(), 3)
            ]
        );
    }

    #[test]
    fn test_every_valid_move_keeps_sequence_dense() {
        let before = pins(&["A", "B", "C", "D", "E"]);
        for source in 0..before.len() {
            for target in 0..before.len() {
                if source == target {
                    continue;
                }
                let moved = before[source].id.clone();
                let after = reordered(&before, &moved, source, target).unwrap();

                assert_eq!(after.len(), before.len());
                assert!(is_dense(&after));
                assert_eq!(after[target].id, moved);
                for pin in &before {
                    assert_eq!(after.iter().filter(|p| p.id == pin.id).count(), 1);
                }
            }
        }
    }

    #[test]
    fn test_same_position_is_rejected() {
        let before = pins(&["A", "B"]);
        assert_eq!(
            reordered(&before, "B", 1, 1).unwrap_err(),
            ReorderIssue::SamePosition(1)
        );
    }

    #[test]
    fn test_invalid_requests() {
        let before = pins(&["A", "B", "C"]);

        assert_eq!(
            validate_move(&before, "A", 0, 3).unwrap_err(),
            ReorderIssue::OutOfRange { index: 3, len: 3 }
        );
        assert_eq!(
            validate_move(&before, "Z", 0, 1).unwrap_err(),
            ReorderIssue::UnknownPin("Z".to_string())
        );
        assert_eq!(
            validate_move(&before, "B", 0, 2).unwrap_err(),
            ReorderIssue::IndexMismatch {
                pin_id: "B".to_string(),
                claimed: 0,
                actual: 1
            }
        );
        assert!(validate_move(&[], "A", 0, 0).is_err());
    }

    #[test]
    fn test_changed_orders_only_lists_shifted_pins() {
        let before = pins(&["A", "B", "C", "D"]);
        let after = reordered(&before, "B", 1, 2).unwrap();

        assert_eq!(
            changed_orders(&before, &after),
            vec![("C".to_string(), 1), ("B".to_string(), 2)]
        );
    }

    #[test]
    fn test_move_item_generic() {
        let mut items = vec![1, 2, 3, 4];
        move_item(&mut items, 2, 0);
        assert_eq!(items, vec![3, 1, 2, 4]);
        move_item(&mut items, 1, 1);
        assert_eq!(items, vec![3, 1, 2, 4]);
    }
}
