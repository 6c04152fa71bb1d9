pub mod attendance;
pub mod comms;
pub mod core;
pub mod fees;
pub mod resources;
pub mod timetable;
