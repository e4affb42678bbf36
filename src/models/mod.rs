pub mod booking;
pub mod calendar;
pub mod common;
pub mod slot;
