pub mod platform;
pub mod resume;
pub mod session;
pub mod ui;
