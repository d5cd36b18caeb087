//! Attendance session rules: which session a student may clock into or out of.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use super::schedule::{minutes_of_day, Minutes};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    EnumString,
    AsRefStr,
    EnumIter,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Session {
    Morning,
    Afternoon,
    Overtime,
}

/// Clock-in/out pair of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPunch {
    pub time_in: Option<NaiveDateTime>,
    pub time_out: Option<NaiveDateTime>,
}

impl SessionPunch {
    pub fn started(&self) -> bool {
        self.time_in.is_some()
    }

    pub fn complete(&self) -> bool {
        self.time_in.is_some() && self.time_out.is_some()
    }

    pub fn in_progress(&self) -> bool {
        self.time_in.is_some() && self.time_out.is_none()
    }

    /// Whole minutes between in and out, when the session is complete.
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.time_in, self.time_out) {
            (Some(time_in), Some(time_out)) if time_out >= time_in => {
                Some((time_out - time_in).num_minutes())
            }
            _ => None,
        }
    }
}

/// The six punch timestamps of an attendance day. An absent day is `DayPunches::default()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayPunches {
    pub morning: SessionPunch,
    pub afternoon: SessionPunch,
    pub overtime: SessionPunch,
}

impl DayPunches {
    pub fn get(&self, session: Session) -> &SessionPunch {
        match session {
            Session::Morning => &self.morning,
            Session::Afternoon => &self.afternoon,
            Session::Overtime => &self.overtime,
        }
    }

    pub fn any_in_progress(&self) -> bool {
        self.morning.in_progress() || self.afternoon.in_progress() || self.overtime.in_progress()
    }
}

/// Picks the session to offer by default at `now`.
///
/// Lunch boundaries win over opening hours; being at or past lunch start
/// already counts as afternoon.
pub fn determine_current_session(
    now: NaiveTime,
    lunch_start: Option<Minutes>,
    lunch_end: Option<Minutes>,
    opening: Option<Minutes>,
    closing: Option<Minutes>,
) -> Session {
    let now = minutes_of_day(now);

    if let (Some(lunch_start), Some(_)) = (lunch_start, lunch_end) {
        return if now < lunch_start {
            Session::Morning
        } else {
            Session::Afternoon
        };
    }

    if let (Some(opening), Some(closing)) = (opening, closing) {
        // Compared doubled so an odd sum keeps its half minute.
        return if now * 2 < opening + closing {
            Session::Morning
        } else {
            Session::Afternoon
        };
    }

    Session::Morning
}

/// Session the student may clock into, given what is already on the day.
///
/// Sessions may be completed out of order, but never re-entered and never
/// while both halves of the day are open.
pub fn available_session_for_clock_in(day: &DayPunches, current: Session) -> Option<Session> {
    let morning = &day.morning;
    let afternoon = &day.afternoon;

    if morning.complete() && afternoon.complete() {
        return None;
    }
    if morning.complete() && !afternoon.started() {
        return Some(Session::Afternoon);
    }
    if afternoon.complete() && !morning.started() {
        return Some(Session::Morning);
    }
    if morning.in_progress() && !afternoon.started() {
        return Some(Session::Afternoon);
    }
    if afternoon.in_progress() && !morning.started() {
        return Some(Session::Morning);
    }
    if morning.started() && afternoon.started() {
        return None;
    }
    if !morning.started() && !afternoon.started() {
        return Some(current);
    }
    None
}

/// Session the student may clock out of. Afternoon is checked before morning.
pub fn available_session_for_clock_out(day: &DayPunches) -> Option<Session> {
    if day.afternoon.in_progress() {
        Some(Session::Afternoon)
    } else if day.morning.in_progress() {
        Some(Session::Morning)
    } else {
        None
    }
}

/// Overtime opens once nothing else is running and it has not been used today.
pub fn overtime_available(day: &DayPunches) -> bool {
    !day.overtime.started() && !day.morning.in_progress() && !day.afternoon.in_progress()
}

pub fn is_late(
    session: Session,
    clock_in: NaiveTime,
    opening: Option<Minutes>,
    lunch_end: Option<Minutes>,
) -> bool {
    let reference = match session {
        Session::Morning => opening,
        Session::Afternoon => lunch_end,
        Session::Overtime => None,
    };
    reference.is_some_and(|reference| minutes_of_day(clock_in) > reference)
}

pub fn is_early_departure(
    session: Session,
    clock_out: NaiveTime,
    lunch_start: Option<Minutes>,
    closing: Option<Minutes>,
) -> bool {
    let reference = match session {
        Session::Morning => lunch_start,
        Session::Afternoon => closing,
        Session::Overtime => None,
    };
    reference.is_some_and(|reference| minutes_of_day(clock_out) < reference)
}

/// Minutes rendered across the completed sessions of a day.
pub fn rendered_minutes(day: &DayPunches) -> i64 {
    [&day.morning, &day.afternoon, &day.overtime]
        .iter()
        .filter_map(|s| s.duration_minutes())
        .sum()
}
