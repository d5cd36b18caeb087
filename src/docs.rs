use crate::api::agency::{AgencyFilter, AgencyListResponse, CreateAgency};
use crate::api::announcement::{AnnouncementListResponse, CreateAnnouncement};
use crate::api::attendance::{
    AttendanceFilter, AttendanceListResponse, ClockRequest, ClockResponse, SessionState,
    StatusUpdate, TodayResponse,
};
use crate::api::practicum::{
    CreatePracticum, PracticumFilter, PracticumListResponse, PracticumProgress,
};
use crate::api::requirement::{
    CreateTemplate, RequirementFilter, RequirementListResponse, ReviewRequirement,
    SubmitRequirement,
};
use crate::auth::handlers::{
    CreateUserRequest, LoginRequest, RegisterRequest, TokenResponse, UserProfile,
};
use crate::classifier::{GeoPoint, LocationType, Session, SessionPreview};
use crate::model::agency::Agency;
use crate::model::announcement::Announcement;
use crate::model::attendance::{ApprovalStatus, AttendanceResponse, AttendanceStatus};
use crate::model::practicum::{Practicum, WorkSetup};
use crate::model::requirement::{
    ChecklistItem, Requirement, RequirementStatus, RequirementTemplate,
};
use crate::model::role::Role;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Practicum Attendance API",
        version = "1.0.0",
        description = r#"
## Practicum Attendance & Monitoring

Backend for students on practicum (OJT) placements at host agencies and the
instructors who supervise them.

### Key Features
- **Geofenced attendance**
  - Morning, afternoon and overtime sessions with clock-in/out rules
  - Every punch classified as Inside (≤150 m), In-field (≤500 m) or Outside
  - Late arrival and early departure flags from the agency schedule
- **Practicum tracking**
  - Placements, required hours, progress from approved attendance
- **Requirements**
  - Templates, student submissions and instructor review
- **Agencies and announcements**

### Security
Endpoints other than `/auth/*` need a **JWT Bearer** access token.
Roles: `admin`, `instructor`, `student`.

### Response Format
- JSON; list endpoints are paginated with `page` and `per_page`
- Errors: `{"code": "...", "message": "..."}`
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,
        crate::auth::handlers::create_user,

        crate::api::agency::create_agency,
        crate::api::agency::list_agencies,
        crate::api::agency::get_agency,
        crate::api::agency::update_agency,
        crate::api::agency::delete_agency,

        crate::api::practicum::create_practicum,
        crate::api::practicum::list_practicums,
        crate::api::practicum::my_practicum,
        crate::api::practicum::update_practicum,

        crate::api::attendance::today,
        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::list_attendance,
        crate::api::attendance::approve_attendance,
        crate::api::attendance::decline_attendance,
        crate::api::attendance::set_status,

        crate::api::requirement::list_templates,
        crate::api::requirement::create_template,
        crate::api::requirement::submit_requirement,
        crate::api::requirement::my_requirements,
        crate::api::requirement::list_requirements,
        crate::api::requirement::approve_requirement,
        crate::api::requirement::reject_requirement,

        crate::api::announcement::list_announcements,
        crate::api::announcement::create_announcement,
        crate::api::announcement::delete_announcement
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            CreateUserRequest,
            TokenResponse,
            UserProfile,
            Role,
            Agency,
            CreateAgency,
            AgencyFilter,
            AgencyListResponse,
            Practicum,
            WorkSetup,
            CreatePracticum,
            PracticumFilter,
            PracticumListResponse,
            PracticumProgress,
            Session,
            LocationType,
            GeoPoint,
            SessionPreview,
            SessionState,
            TodayResponse,
            ClockRequest,
            ClockResponse,
            AttendanceStatus,
            ApprovalStatus,
            AttendanceResponse,
            AttendanceFilter,
            AttendanceListResponse,
            StatusUpdate,
            RequirementStatus,
            RequirementTemplate,
            Requirement,
            ChecklistItem,
            CreateTemplate,
            SubmitRequirement,
            ReviewRequirement,
            RequirementFilter,
            RequirementListResponse,
            Announcement,
            CreateAnnouncement,
            AnnouncementListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Agency", description = "Host agency management APIs"),
        (name = "Practicum", description = "Student placement APIs"),
        (name = "Attendance", description = "Geofenced session attendance APIs"),
        (name = "Requirement", description = "Requirement templates and submissions"),
        (name = "Announcement", description = "Instructor announcements"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_clock_endpoints_and_security() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/attendance/clock-in"));
        assert!(doc.paths.paths.contains_key("/api/v1/attendance/clock-out"));
        assert!(doc.paths.paths.contains_key("/api/v1/auth/login"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
