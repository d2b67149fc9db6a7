//! Session-scoped, deduplicated roster of recognised students.

use crate::date;
use crate::types::StudentId;
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// First sighting of a student in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub student_id: StudentId,
    pub name: String,
    /// `Today` or the ISO attendance date.
    pub date_label: String,
    /// Wall-clock time of the first sighting, already formatted.
    pub timestamp: String,
}

impl fmt::Display for RosterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} — {} — {}", self.name, self.date_label, self.timestamp)
    }
}

/// Set-membership accumulator: an id is appended once and never removed.
#[derive(Debug, Default)]
pub struct Roster {
    seen: HashSet<StudentId>,
    /// Newest first.
    entries: VecDeque<RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting. Returns the new entry on first sighting, `None` if already present.
    pub fn record(
        &mut self,
        student_id: &StudentId,
        name: &str,
        selected: NaiveDate,
        now: DateTime<Local>,
    ) -> Option<&RosterEntry> {
        if self.seen.contains(student_id) {
            return None;
        }
        self.seen.insert(student_id.clone());
        tracing::debug!(student_id = %student_id, name, "roster: first sighting");
        self.entries.push_front(RosterEntry {
            student_id: student_id.clone(),
            name: name.to_string(),
            date_label: date::roster_label(selected, now.date_naive()),
            timestamp: date::clock_label(&now),
        });
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<RosterEntry> {
        self.entries.into()
    }
}
