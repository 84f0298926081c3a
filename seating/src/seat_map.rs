//! Static seating chart: rows of seat slots and aisle gaps, grouped into classes.
//!
//! A [`SeatMap`] is built once per venue from a [`SeatMapLayout`] and never
//! changes afterwards; it is shared behind an `Arc` by the registry and the
//! planner. Rows are indexed front to back across the whole map, and every
//! row belongs to exactly one class.
//!
//! # Layout document
//!
//! ```json
//! {
//!   "classes": [
//!     {
//!       "id": "STALLS",
//!       "label": "Stalls",
//!       "base_row": "G",
//!       "rows": [
//!         { "label": "A", "slots": [1, 2, 3, "gap", 4, 5, 6] },
//!         { "label": "B", "slots": [1, 2, 3, "gap", 4, 5, 6], "blocked": [1] }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::error::LayoutError;
use crate::types::{ClassId, RowIndex, SeatId, SeatKey, SeatNumber};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

// ============================================================================
// Layout document
// ============================================================================

/// Serializable description of a venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatMapLayout {
    /// Classes, in display order
    pub classes: Vec<ClassLayout>,
}

/// One class (price tier) of the layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLayout {
    /// Class id
    pub id: String,
    /// Display label; defaults to the id
    #[serde(default)]
    pub label: Option<String>,
    /// Label of the first row of the penalty zone
    #[serde(default)]
    pub base_row: Option<String>,
    /// Rows, front to back
    pub rows: Vec<RowLayout>,
}

/// One row of the layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLayout {
    /// Row label, unique across the venue
    pub label: String,
    /// Seats and gaps in physical order
    pub slots: Vec<LayoutSlot>,
    /// Seat numbers withdrawn from sale
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked: Vec<SeatNumber>,
}

/// A slot in a row layout: a seat number or the string `"gap"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayoutSlot {
    /// A seat with this number
    Seat(SeatNumber),
    /// An aisle gap
    Marker(GapMarker),
}

/// The `"gap"` literal of the layout document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapMarker {
    /// Aisle gap
    Gap,
}

impl RowLayout {
    /// Build a row from compact notation: numbers, inclusive ranges and `|`
    /// for a gap, separated by whitespace.
    ///
    /// `"1-5 | 6-10"` is seats 1 to 5, an aisle, then seats 6 to 10. Ranges
    /// may descend (`"10-6"`) for rows numbered right to left.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidNotation`] for tokens that are neither a
    /// number, a range nor `|`.
    pub fn from_notation(label: &str, notation: &str) -> Result<Self, LayoutError> {
        let invalid = |token: &str| LayoutError::InvalidNotation {
            row: label.to_string(),
            token: token.to_string(),
        };

        let mut slots = Vec::new();
        for token in notation.split_whitespace() {
            if token == "|" {
                slots.push(LayoutSlot::Marker(GapMarker::Gap));
                continue;
            }
            if let Some((start, end)) = token.split_once('-') {
                let start: SeatNumber = start.parse().map_err(|_| invalid(token))?;
                let end: SeatNumber = end.parse().map_err(|_| invalid(token))?;
                if start <= end {
                    slots.extend((start..=end).map(LayoutSlot::Seat));
                } else {
                    slots.extend((end..=start).rev().map(LayoutSlot::Seat));
                }
            } else {
                let number = token.parse().map_err(|_| invalid(token))?;
                slots.push(LayoutSlot::Seat(number));
            }
        }

        Ok(Self {
            label: label.to_string(),
            slots,
            blocked: Vec::new(),
        })
    }

    /// Mark seats as withdrawn from sale
    #[must_use]
    pub fn with_blocked(mut self, blocked: impl IntoIterator<Item = SeatNumber>) -> Self {
        self.blocked.extend(blocked);
        self
    }
}

// ============================================================================
// Seat map
// ============================================================================

/// A slot of a built row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A seat with this number
    Seat(SeatNumber),
    /// An aisle gap
    Gap,
}

/// A row of the seat map
#[derive(Debug, Clone)]
pub struct Row {
    label: String,
    class: ClassId,
    slots: Vec<Slot>,
    seats: Vec<SeatNumber>,
    slot_of: HashMap<SeatNumber, usize>,
}

impl Row {
    /// Row label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Class this row belongs to
    #[must_use]
    pub const fn class(&self) -> &ClassId {
        &self.class
    }

    /// Seats and gaps in physical order
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Seat numbers in slot order
    #[must_use]
    pub fn seats(&self) -> &[SeatNumber] {
        &self.seats
    }

    /// Slot index of seat `number`
    #[must_use]
    pub fn slot_of(&self, number: SeatNumber) -> Option<usize> {
        self.slot_of.get(&number).copied()
    }

    /// Whether the row has a seat with this number
    #[must_use]
    pub fn has_seat(&self, number: SeatNumber) -> bool {
        self.slot_of.contains_key(&number)
    }

    /// Whether the row contains at least one aisle gap
    #[must_use]
    pub fn has_gap(&self) -> bool {
        self.slots.contains(&Slot::Gap)
    }

    /// Lowest seat number in the row
    #[must_use]
    pub fn lowest(&self) -> Option<SeatNumber> {
        self.seats.iter().copied().min()
    }

    /// Highest seat number in the row
    #[must_use]
    pub fn highest(&self) -> Option<SeatNumber> {
        self.seats.iter().copied().max()
    }

    /// Seat at slot index `slot`, if that slot holds a seat
    #[must_use]
    pub fn seat_at(&self, slot: usize) -> Option<SeatNumber> {
        match self.slots.get(slot) {
            Some(Slot::Seat(number)) => Some(*number),
            _ => None,
        }
    }

    /// Canonical id of seat `number` in this row
    #[must_use]
    pub fn seat_id(&self, number: SeatNumber) -> SeatId {
        SeatId::new(&self.label, number)
    }
}

/// A class (price tier) of the seat map
#[derive(Debug, Clone)]
pub struct SeatClass {
    id: ClassId,
    label: String,
    rows: Vec<RowIndex>,
    base_row: Option<usize>,
}

impl SeatClass {
    /// Class id
    #[must_use]
    pub const fn id(&self) -> &ClassId {
        &self.id
    }

    /// Display label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Row indexes of the class, front to back
    #[must_use]
    pub fn rows(&self) -> &[RowIndex] {
        &self.rows
    }

    /// Position of the first penalty-zone row within the class
    #[must_use]
    pub const fn base_row(&self) -> Option<usize> {
        self.base_row
    }

    /// Position of map row `row` within this class
    #[must_use]
    pub fn position_of(&self, row: RowIndex) -> Option<usize> {
        self.rows.iter().position(|&r| r == row)
    }
}

/// The built, validated seating chart
#[derive(Debug, Clone)]
pub struct SeatMap {
    rows: Vec<Row>,
    classes: Vec<SeatClass>,
    class_index: HashMap<ClassId, usize>,
    row_index: HashMap<String, RowIndex>,
    blocked: BTreeSet<SeatKey>,
}

impl SeatMap {
    /// Build and validate a seat map from a layout
    ///
    /// # Errors
    ///
    /// Returns a [`LayoutError`] for duplicate rows, classes or seat numbers,
    /// empty classes, rows without seats, unknown blocked seats and base rows
    /// outside their class.
    pub fn from_layout(layout: &SeatMapLayout) -> Result<Self, LayoutError> {
        let mut map = Self {
            rows: Vec::new(),
            classes: Vec::new(),
            class_index: HashMap::new(),
            row_index: HashMap::new(),
            blocked: BTreeSet::new(),
        };

        for class_layout in &layout.classes {
            let id = ClassId::new(class_layout.id.clone());
            if map.class_index.contains_key(&id) {
                return Err(LayoutError::DuplicateClass(class_layout.id.clone()));
            }
            if class_layout.rows.is_empty() {
                return Err(LayoutError::EmptyClass(class_layout.id.clone()));
            }

            let mut class_rows = Vec::with_capacity(class_layout.rows.len());
            for row_layout in &class_layout.rows {
                let index = map.push_row(&id, row_layout)?;
                class_rows.push(index);
            }

            let base_row = match &class_layout.base_row {
                None => None,
                Some(label) => {
                    let position = class_layout
                        .rows
                        .iter()
                        .position(|row| &row.label == label)
                        .ok_or_else(|| LayoutError::BaseRowOutOfRange {
                            class: class_layout.id.clone(),
                            base_row: label.clone(),
                        })?;
                    Some(position)
                },
            };

            map.class_index.insert(id.clone(), map.classes.len());
            map.classes.push(SeatClass {
                label: class_layout
                    .label
                    .clone()
                    .unwrap_or_else(|| class_layout.id.clone()),
                id,
                rows: class_rows,
                base_row,
            });
        }

        tracing::debug!(
            classes = map.classes.len(),
            rows = map.rows.len(),
            blocked = map.blocked.len(),
            "Seat map built"
        );
        Ok(map)
    }

    /// Parse a layout document and build the seat map
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Parse`] for malformed JSON, otherwise as
    /// [`SeatMap::from_layout`].
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        let layout: SeatMapLayout =
            serde_json::from_str(json).map_err(|e| LayoutError::Parse(e.to_string()))?;
        Self::from_layout(&layout)
    }

    fn push_row(&mut self, class: &ClassId, layout: &RowLayout) -> Result<RowIndex, LayoutError> {
        if self.row_index.contains_key(&layout.label) {
            return Err(LayoutError::DuplicateRow(layout.label.clone()));
        }

        let mut slots = Vec::with_capacity(layout.slots.len());
        let mut seats = Vec::new();
        let mut slot_of = HashMap::new();
        for (position, slot) in layout.slots.iter().enumerate() {
            match slot {
                LayoutSlot::Seat(number) => {
                    if slot_of.insert(*number, position).is_some() {
                        return Err(LayoutError::DuplicateSeat {
                            row: layout.label.clone(),
                            number: *number,
                        });
                    }
                    seats.push(*number);
                    slots.push(Slot::Seat(*number));
                },
                LayoutSlot::Marker(GapMarker::Gap) => slots.push(Slot::Gap),
            }
        }
        if seats.is_empty() {
            return Err(LayoutError::RowWithoutSeats(layout.label.clone()));
        }

        let index = self.rows.len();
        let mut seen = HashSet::new();
        for &number in &layout.blocked {
            if !slot_of.contains_key(&number) {
                return Err(LayoutError::UnknownBlockedSeat {
                    row: layout.label.clone(),
                    number,
                });
            }
            if seen.insert(number) {
                self.blocked.insert(SeatKey::new(index, number));
            }
        }

        self.row_index.insert(layout.label.clone(), index);
        self.rows.push(Row {
            label: layout.label.clone(),
            class: class.clone(),
            slots,
            seats,
            slot_of,
        });
        Ok(index)
    }

    /// Row at `index`
    #[must_use]
    pub fn row(&self, index: RowIndex) -> Option<&Row> {
        self.rows.get(index)
    }

    /// All rows, front to back
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Index of the row labelled `label`
    #[must_use]
    pub fn row_by_label(&self, label: &str) -> Option<RowIndex> {
        self.row_index.get(label).copied()
    }

    /// Class `id`
    #[must_use]
    pub fn class(&self, id: &ClassId) -> Option<&SeatClass> {
        self.class_index.get(id).and_then(|&i| self.classes.get(i))
    }

    /// All classes in layout order
    #[must_use]
    pub fn classes(&self) -> &[SeatClass] {
        &self.classes
    }

    /// Rows of class `id`, front to back
    pub fn rows_of<'a>(&'a self, id: &ClassId) -> impl Iterator<Item = (RowIndex, &'a Row)> + 'a {
        self.class(id)
            .map(SeatClass::rows)
            .unwrap_or_default()
            .iter()
            .filter_map(move |&index| self.rows.get(index).map(|row| (index, row)))
    }

    /// Position of row `row` within its class
    #[must_use]
    pub fn row_index_in_class(&self, row: RowIndex) -> Option<usize> {
        let class = self.class(self.rows.get(row)?.class())?;
        class.position_of(row)
    }

    /// Resolve a canonical seat id to its key
    #[must_use]
    pub fn locate(&self, id: &SeatId) -> Option<SeatKey> {
        let (label, number) = id.as_str().rsplit_once('-')?;
        let number: SeatNumber = number.parse().ok()?;
        let row = self.row_by_label(label)?;
        self.rows.get(row)?.has_seat(number).then_some(SeatKey::new(row, number))
    }

    /// Canonical id of the seat at `key`
    #[must_use]
    pub fn seat_id(&self, key: SeatKey) -> Option<SeatId> {
        let row = self.rows.get(key.row)?;
        row.has_seat(key.number).then(|| row.seat_id(key.number))
    }

    /// Class of the seat `id`
    #[must_use]
    pub fn class_of(&self, id: &SeatId) -> Option<&ClassId> {
        let key = self.locate(id)?;
        self.rows.get(key.row).map(Row::class)
    }

    /// Every seat key in the map, row by row in slot order
    pub fn seat_keys(&self) -> impl Iterator<Item = SeatKey> + '_ {
        self.rows.iter().enumerate().flat_map(|(index, row)| {
            row.seats().iter().map(move |&number| SeatKey::new(index, number))
        })
    }

    /// Whether the seat at `key` is withdrawn from sale by the layout
    #[must_use]
    pub fn is_statically_blocked(&self, key: SeatKey) -> bool {
        self.blocked.contains(&key)
    }

    /// Seats withdrawn from sale by the layout
    #[must_use]
    pub const fn blocked_seats(&self) -> &BTreeSet<SeatKey> {
        &self.blocked
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn class(id: &str, rows: Vec<RowLayout>, base_row: Option<&str>) -> ClassLayout {
        ClassLayout {
            id: id.to_string(),
            label: None,
            base_row: base_row.map(str::to_string),
            rows,
        }
    }

    #[test]
    fn notation_expands_ranges_and_gaps() {
        let row = RowLayout::from_notation("SC-A", "1-3 | 4 10-8").unwrap();
        assert_eq!(
            row.slots,
            vec![
                LayoutSlot::Seat(1),
                LayoutSlot::Seat(2),
                LayoutSlot::Seat(3),
                LayoutSlot::Marker(GapMarker::Gap),
                LayoutSlot::Seat(4),
                LayoutSlot::Seat(10),
                LayoutSlot::Seat(9),
                LayoutSlot::Seat(8),
            ]
        );
        assert!(matches!(
            RowLayout::from_notation("SC-A", "1-x"),
            Err(LayoutError::InvalidNotation { .. })
        ));
    }

    #[test]
    fn json_layout_builds_rows_and_classes() {
        let json = r#"{
            "classes": [{
                "id": "SC",
                "label": "Superior",
                "base_row": "SC-B",
                "rows": [
                    { "label": "SC-A", "slots": [1, 2, "gap", 3] },
                    { "label": "SC-B", "slots": [1, 2, 3], "blocked": [2] }
                ]
            }]
        }"#;
        let map = SeatMap::from_json(json).unwrap();
        let sc = ClassId::new("SC");

        assert_eq!(map.class(&sc).unwrap().label(), "Superior");
        assert_eq!(map.class(&sc).unwrap().base_row(), Some(1));
        assert_eq!(map.row(0).unwrap().slots()[2], Slot::Gap);
        assert!(map.row(0).unwrap().has_gap());
        assert!(!map.row(1).unwrap().has_gap());
        assert_eq!(map.locate(&SeatId::from("SC-A-3")), Some(SeatKey::new(0, 3)));
        assert_eq!(map.locate(&SeatId::from("SC-A-9")), None);
        assert_eq!(map.class_of(&SeatId::from("SC-B-1")), Some(&sc));
        assert!(map.is_statically_blocked(SeatKey::new(1, 2)));
        assert_eq!(map.seat_keys().count(), 6);
        assert_eq!(map.row_index_in_class(1), Some(1));
    }

    #[test]
    fn validation_rejects_bad_layouts() {
        let row = |label: &str, notation: &str| RowLayout::from_notation(label, notation).unwrap();

        let duplicate_row = SeatMapLayout {
            classes: vec![class("A", vec![row("R", "1-2"), row("R", "1-2")], None)],
        };
        assert_eq!(
            SeatMap::from_layout(&duplicate_row).unwrap_err(),
            LayoutError::DuplicateRow("R".to_string())
        );

        let duplicate_seat = SeatMapLayout {
            classes: vec![class("A", vec![row("R", "1 2 | 2")], None)],
        };
        assert!(matches!(
            SeatMap::from_layout(&duplicate_seat),
            Err(LayoutError::DuplicateSeat { number: 2, .. })
        ));

        let empty = SeatMapLayout {
            classes: vec![class("A", vec![], None)],
        };
        assert_eq!(
            SeatMap::from_layout(&empty).unwrap_err(),
            LayoutError::EmptyClass("A".to_string())
        );

        let seatless = SeatMapLayout {
            classes: vec![class("A", vec![row("R", "|")], None)],
        };
        assert_eq!(
            SeatMap::from_layout(&seatless).unwrap_err(),
            LayoutError::RowWithoutSeats("R".to_string())
        );

        let bad_base = SeatMapLayout {
            classes: vec![class("A", vec![row("R", "1-2")], Some("Z"))],
        };
        assert!(matches!(
            SeatMap::from_layout(&bad_base),
            Err(LayoutError::BaseRowOutOfRange { .. })
        ));

        assert!(matches!(
            SeatMap::from_json("{ not json"),
            Err(LayoutError::Parse(_))
        ));
    }
}
