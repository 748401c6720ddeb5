pub mod availability;
pub mod booking;
pub mod call_log;
pub mod display;
