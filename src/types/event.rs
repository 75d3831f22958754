//! Event types (a client engagement being quoted)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::{DEFAULT_EVENT_DURATION_HOURS, MAX_EVENT_DURATION_HOURS, MAX_GROUP_SIZE};
use crate::error::EditError;

use super::{Coordinates, Money};

pub type EventId = Uuid;

/// Event entity. Immutable after creation; proposals are tracked by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub client_name: String,
    pub group_size: u32,
    pub date: NaiveDate,
    pub location: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// `None` = no per-person cap
    #[serde(default)]
    pub budget_per_person: Option<Money>,
    pub duration_hours: f64,
}

impl Event {
    /// Upper bound for the itinerary length, derived from the duration hint.
    pub fn max_itinerary_minutes(&self) -> u32 {
        (self.duration_hours * 60.0).ceil() as u32
    }

    pub fn date_display(&self) -> String {
        format_date_display(self.date)
    }
}

/// Request to create an event (output of the email-parsing collaborator)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub client_name: String,
    pub group_size: i64,
    /// `dd/mm/yyyy` or `YYYY-MM-DD`
    pub date: String,
    pub location: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub budget_per_person: Option<Money>,
    #[serde(default)]
    pub duration_hours: Option<f64>,
}

impl NewEvent {
    /// Validate and build the event. Group size must be positive.
    pub fn into_event(self) -> Result<Event, EditError> {
        if self.client_name.trim().is_empty() {
            return Err(EditError::InvalidEvent("client name must not be empty".into()));
        }
        if self.group_size <= 0 {
            return Err(EditError::InvalidEvent(format!(
                "group size must be a positive integer, got {}",
                self.group_size
            )));
        }
        if self.group_size > MAX_GROUP_SIZE {
            return Err(EditError::InvalidEvent(format!(
                "group size must be at most {}, got {}",
                MAX_GROUP_SIZE, self.group_size
            )));
        }
        let date = parse_event_date(&self.date).ok_or_else(|| {
            EditError::InvalidEvent(format!("unrecognised date '{}'", self.date))
        })?;
        let duration_hours = self.duration_hours.unwrap_or(DEFAULT_EVENT_DURATION_HOURS);
        if !duration_hours.is_finite() || duration_hours <= 0.0 {
            return Err(EditError::InvalidEvent(format!(
                "duration must be positive, got {}",
                duration_hours
            )));
        }
        if duration_hours > MAX_EVENT_DURATION_HOURS {
            return Err(EditError::InvalidEvent(format!(
                "duration must be at most {} hours, got {}",
                MAX_EVENT_DURATION_HOURS, duration_hours
            )));
        }
        if let Some(budget) = self.budget_per_person {
            if budget.is_negative() {
                return Err(EditError::InvalidEvent("budget per person must be >= 0".into()));
            }
        }
        if let Some(coords) = self.coordinates {
            if !coords.is_valid() {
                return Err(EditError::InvalidEvent("event coordinates out of range".into()));
            }
        }

        Ok(Event {
            id: Uuid::new_v4(),
            client_name: self.client_name.trim().to_string(),
            group_size: self.group_size as u32,
            date,
            location: self.location.trim().to_string(),
            coordinates: self.coordinates,
            budget_per_person: self.budget_per_person,
            duration_hours,
        })
    }
}

/// Accept `dd/mm/yyyy` or `YYYY-MM-DD`.
pub fn parse_event_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    ["%d/%m/%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// `dd/mm/yyyy`
pub fn format_date_display(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
