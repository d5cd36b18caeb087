pub mod agency;
pub mod announcement;
pub mod attendance;
pub mod practicum;
pub mod requirement;
pub mod role;
pub mod user;
