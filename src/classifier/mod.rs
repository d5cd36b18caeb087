//! Pure attendance rules: geofencing, session windows and punch planning.
//!
//! Nothing in here touches the database or HTTP; callers pass the latest
//! attendance snapshot and the agency configuration explicitly.

pub mod geofence;
pub mod punch;
pub mod schedule;
pub mod session;

pub use geofence::{GeoPoint, LocationType};
pub use punch::{plan_clock_in, plan_clock_out, preview, PunchContext, PunchRejection, SessionPreview};
pub use schedule::AgencySchedule;
pub use session::{rendered_minutes, DayPunches, Session, SessionPunch};
