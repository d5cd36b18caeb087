//! Clock-in/out planning: combines the session table, the schedule and the geofence
//! into the decision a handler persists.

use chrono::{Datelike, NaiveDateTime};
use derive_more::Display;
use serde::Serialize;
use utoipa::ToSchema;

use super::geofence::{classify_location, GeoPoint, LocationType};
use super::schedule::AgencySchedule;
use super::session::{
    available_session_for_clock_in, available_session_for_clock_out, determine_current_session,
    is_early_departure, is_late, overtime_available, DayPunches, Session,
};

/// Everything a punch decision depends on besides the day itself.
#[derive(Debug, Clone, Copy)]
pub struct PunchContext<'a> {
    pub schedule: &'a AgencySchedule,
    pub agency_point: Option<GeoPoint>,
    /// Agency-local wall clock.
    pub now: NaiveDateTime,
    pub position: Option<GeoPoint>,
}

impl PunchContext<'_> {
    fn location(&self) -> Option<LocationType> {
        self.position
            .and_then(|position| classify_location(position, self.agency_point))
    }

    fn current_session(&self) -> Session {
        determine_current_session(
            self.now.time(),
            self.schedule.lunch_start,
            self.schedule.lunch_end,
            self.schedule.opening,
            self.schedule.closing,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PunchRejection {
    #[display(fmt = "No attendance session is available for clock-in")]
    NoSessionAvailable,
    #[display(fmt = "The {} session is not available for clock-in", _0)]
    SessionUnavailable(Session),
    #[display(fmt = "No session is in progress")]
    NothingToClockOut,
    #[display(fmt = "The {} session is not in progress", _0)]
    SessionNotInProgress(Session),
    #[display(fmt = "Clock-out cannot be earlier than clock-in")]
    OutBeforeIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockInPlan {
    pub session: Session,
    pub at: NaiveDateTime,
    pub late: bool,
    pub location: Option<LocationType>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockOutPlan {
    pub session: Session,
    pub at: NaiveDateTime,
    pub early_departure: bool,
    pub location: Option<LocationType>,
}

/// The decision table, closed while overtime is running.
fn regular_session_for_clock_in(day: &DayPunches, current: Session) -> Option<Session> {
    if day.overtime.in_progress() {
        return None;
    }
    available_session_for_clock_in(day, current)
}

pub fn plan_clock_in(
    day: &DayPunches,
    ctx: &PunchContext<'_>,
    requested: Option<Session>,
) -> Result<ClockInPlan, PunchRejection> {
    let session = match requested {
        Some(Session::Overtime) => {
            if !overtime_available(day) {
                return Err(PunchRejection::SessionUnavailable(Session::Overtime));
            }
            Session::Overtime
        }
        // Feeding the request in as the default makes the table answer "is this one open?"
        Some(wanted) => match regular_session_for_clock_in(day, wanted) {
            Some(session) if session == wanted => session,
            _ => return Err(PunchRejection::SessionUnavailable(wanted)),
        },
        None => regular_session_for_clock_in(day, ctx.current_session())
            .ok_or(PunchRejection::NoSessionAvailable)?,
    };

    let late = is_late(
        session,
        ctx.now.time(),
        ctx.schedule.opening,
        ctx.schedule.lunch_end,
    );

    Ok(ClockInPlan {
        session,
        at: ctx.now,
        late,
        location: ctx.location(),
    })
}

pub fn plan_clock_out(
    day: &DayPunches,
    ctx: &PunchContext<'_>,
    requested: Option<Session>,
) -> Result<ClockOutPlan, PunchRejection> {
    let session = match requested {
        Some(wanted) => {
            if !day.get(wanted).in_progress() {
                return Err(PunchRejection::SessionNotInProgress(wanted));
            }
            wanted
        }
        None => available_session_for_clock_out(day)
            .or_else(|| day.overtime.in_progress().then_some(Session::Overtime))
            .ok_or(PunchRejection::NothingToClockOut)?,
    };

    if day
        .get(session)
        .time_in
        .is_some_and(|time_in| ctx.now < time_in)
    {
        return Err(PunchRejection::OutBeforeIn);
    }

    let early_departure = is_early_departure(
        session,
        ctx.now.time(),
        ctx.schedule.lunch_start,
        ctx.schedule.closing,
    );

    Ok(ClockOutPlan {
        session,
        at: ctx.now,
        early_departure,
        location: ctx.location(),
    })
}

/// What the dashboard offers the student right now.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionPreview {
    pub current_session: Session,
    pub clock_in_session: Option<Session>,
    pub clock_out_session: Option<Session>,
    pub overtime_available: bool,
    pub location_type: Option<LocationType>,
    pub operating_day: bool,
}

pub fn preview(day: &DayPunches, ctx: &PunchContext<'_>) -> SessionPreview {
    let current_session = ctx.current_session();
    SessionPreview {
        current_session,
        clock_in_session: regular_session_for_clock_in(day, current_session),
        clock_out_session: available_session_for_clock_out(day)
            .or_else(|| day.overtime.in_progress().then_some(Session::Overtime)),
        overtime_available: overtime_available(day),
        location_type: ctx.location(),
        operating_day: ctx.schedule.is_operating_day(ctx.now.weekday()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::session::SessionPunch;
    use chrono::NaiveDate;

    fn at(hm: &str) -> NaiveDateTime {
        // 2026-03-02 is a Monday
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_time(chrono::NaiveTime::parse_from_str(hm, "%H:%M").unwrap())
    }

    fn schedule() -> AgencySchedule {
        AgencySchedule::from_raw(
            Some("08:00"),
            Some("17:00"),
            Some("12:00"),
            Some("13:00"),
            Some("Monday,Tuesday,Wednesday,Thursday,Friday"),
        )
    }

    fn ctx<'a>(schedule: &'a AgencySchedule, now: &str) -> PunchContext<'a> {
        PunchContext {
            schedule,
            agency_point: Some(GeoPoint::new(14.0, 121.0)),
            now: at(now),
            position: Some(GeoPoint::new(14.0010, 121.0)),
        }
    }

    fn punch(time_in: Option<&str>, time_out: Option<&str>) -> SessionPunch {
        SessionPunch {
            time_in: time_in.map(at),
            time_out: time_out.map(at),
        }
    }

    #[test]
    fn test_first_clock_in_uses_time_based_default() {
        let s = schedule();
        let plan = plan_clock_in(&DayPunches::default(), &ctx(&s, "07:50"), None).unwrap();
        assert_eq!(plan.session, Session::Morning);
        assert!(!plan.late);
        assert_eq!(plan.location, Some(LocationType::Inside));

        let plan = plan_clock_in(&DayPunches::default(), &ctx(&s, "13:20"), None).unwrap();
        assert_eq!(plan.session, Session::Afternoon);
        assert!(plan.late);
    }

    #[test]
    fn test_requested_session_must_match_table() {
        let s = schedule();
        let day = DayPunches {
            morning: punch(Some("08:00"), Some("12:00")),
            ..DayPunches::default()
        };

        let err = plan_clock_in(&day, &ctx(&s, "13:00"), Some(Session::Morning)).unwrap_err();
        assert_eq!(err, PunchRejection::SessionUnavailable(Session::Morning));

        let plan = plan_clock_in(&day, &ctx(&s, "13:00"), Some(Session::Afternoon)).unwrap();
        assert_eq!(plan.session, Session::Afternoon);
        assert!(!plan.late);
    }

    #[test]
    fn test_afternoon_first_is_allowed() {
        let s = schedule();
        let plan =
            plan_clock_in(&DayPunches::default(), &ctx(&s, "09:00"), Some(Session::Afternoon))
                .unwrap();
        assert_eq!(plan.session, Session::Afternoon);
    }

    #[test]
    fn test_full_day_rejects_clock_in() {
        let s = schedule();
        let day = DayPunches {
            morning: punch(Some("08:00"), Some("12:00")),
            afternoon: punch(Some("13:00"), Some("17:00")),
            ..DayPunches::default()
        };
        let err = plan_clock_in(&day, &ctx(&s, "17:05"), None).unwrap_err();
        assert_eq!(err, PunchRejection::NoSessionAvailable);

        let plan = plan_clock_in(&day, &ctx(&s, "17:05"), Some(Session::Overtime)).unwrap();
        assert_eq!(plan.session, Session::Overtime);
        assert!(!plan.late);
    }

    #[test]
    fn test_overtime_blocked_while_session_open() {
        let s = schedule();
        let day = DayPunches {
            morning: punch(Some("08:00"), None),
            ..DayPunches::default()
        };
        let err = plan_clock_in(&day, &ctx(&s, "10:00"), Some(Session::Overtime)).unwrap_err();
        assert_eq!(err, PunchRejection::SessionUnavailable(Session::Overtime));
    }

    #[test]
    fn test_regular_sessions_blocked_while_overtime_open() {
        let s = schedule();
        let day = DayPunches {
            overtime: punch(Some("06:00"), None),
            ..DayPunches::default()
        };

        let err = plan_clock_in(&day, &ctx(&s, "08:00"), None).unwrap_err();
        assert_eq!(err, PunchRejection::NoSessionAvailable);

        let err = plan_clock_in(&day, &ctx(&s, "08:00"), Some(Session::Morning)).unwrap_err();
        assert_eq!(err, PunchRejection::SessionUnavailable(Session::Morning));

        let err = plan_clock_in(&day, &ctx(&s, "08:00"), Some(Session::Overtime)).unwrap_err();
        assert_eq!(err, PunchRejection::SessionUnavailable(Session::Overtime));

        let p = preview(&day, &ctx(&s, "08:00"));
        assert_eq!(p.clock_in_session, None);
        assert_eq!(p.clock_out_session, Some(Session::Overtime));

        let plan = plan_clock_out(&day, &ctx(&s, "08:00"), None).unwrap();
        assert_eq!(plan.session, Session::Overtime);
    }

    #[test]
    fn test_clock_out_picks_open_session() {
        let s = schedule();
        let day = DayPunches {
            morning: punch(Some("08:00"), Some("12:00")),
            afternoon: punch(Some("13:00"), None),
            ..DayPunches::default()
        };
        let plan = plan_clock_out(&day, &ctx(&s, "16:30"), None).unwrap();
        assert_eq!(plan.session, Session::Afternoon);
        assert!(plan.early_departure);
    }

    #[test]
    fn test_clock_out_falls_back_to_overtime() {
        let s = schedule();
        let day = DayPunches {
            morning: punch(Some("08:00"), Some("12:00")),
            afternoon: punch(Some("13:00"), Some("17:00")),
            overtime: punch(Some("17:30"), None),
        };
        let plan = plan_clock_out(&day, &ctx(&s, "19:00"), None).unwrap();
        assert_eq!(plan.session, Session::Overtime);
        assert!(!plan.early_departure);
    }

    #[test]
    fn test_clock_out_rejections() {
        let s = schedule();
        let err = plan_clock_out(&DayPunches::default(), &ctx(&s, "12:00"), None).unwrap_err();
        assert_eq!(err, PunchRejection::NothingToClockOut);

        let day = DayPunches {
            morning: punch(Some("08:00"), None),
            ..DayPunches::default()
        };
        let err = plan_clock_out(&day, &ctx(&s, "12:00"), Some(Session::Afternoon)).unwrap_err();
        assert_eq!(err, PunchRejection::SessionNotInProgress(Session::Afternoon));

        let err = plan_clock_out(&day, &ctx(&s, "07:30"), None).unwrap_err();
        assert_eq!(err, PunchRejection::OutBeforeIn);
    }

    #[test]
    fn test_preview_reports_state() {
        let s = schedule();
        let day = DayPunches {
            morning: punch(Some("08:00"), None),
            ..DayPunches::default()
        };
        let p = preview(&day, &ctx(&s, "11:00"));
        assert_eq!(p.current_session, Session::Morning);
        assert_eq!(p.clock_in_session, Some(Session::Afternoon));
        assert_eq!(p.clock_out_session, Some(Session::Morning));
        assert!(!p.overtime_available);
        assert_eq!(p.location_type, Some(LocationType::Inside));
        assert!(p.operating_day);
    }

    #[test]
    fn test_preview_without_position_or_agency_point() {
        let s = AgencySchedule::default();
        let c = PunchContext {
            schedule: &s,
            agency_point: None,
            now: at("15:00"),
            position: Some(GeoPoint::new(14.0, 121.0)),
        };
        let p = preview(&DayPunches::default(), &c);
        assert_eq!(p.current_session, Session::Morning);
        assert_eq!(p.clock_in_session, Some(Session::Morning));
        assert_eq!(p.location_type, None);
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(
            PunchRejection::SessionUnavailable(Session::Morning).to_string(),
            "The morning session is not available for clock-in"
        );
    }
}
