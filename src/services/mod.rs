pub mod availability;
pub mod booking;
pub mod booking_log;
pub mod notifier;
pub mod time_slots;
