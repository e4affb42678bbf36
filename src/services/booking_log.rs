use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::models::booking::{Appointment, ValidatedBooking};

#[derive(Debug, Error)]
pub enum BookingLogError {
    #[error("Booking log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Booking log CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Booking log lock poisoned")]
    Poisoned,
}

// One row per confirmed appointment
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingRecord {
    pub event_id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub start_time: String, // ISO format
    pub end_time: String,   // ISO format
    pub meet_link: String,  // empty if the calendar created no conference
    pub created_at: String, // ISO format
}

impl BookingRecord {
    pub fn new(booking: &ValidatedBooking, appointment: &Appointment, created_at: DateTime<Utc>) -> Self {
        Self {
            event_id: appointment.id.clone(),
            name: booking.name.clone(),
            email: booking.email.clone(),
            subject: booking.subject.clone(),
            start_time: appointment.start.to_rfc3339(),
            end_time: appointment.end.to_rfc3339(),
            meet_link: appointment.meet_link.clone().unwrap_or_default(),
            created_at: created_at.to_rfc3339(),
        }
    }
}

/// Append-only CSV ledger of confirmed appointments.
pub struct BookingLog {
    csv_path: PathBuf,
    file_mutex: Mutex<()>,
}

impl BookingLog {
    /// Open the ledger at `csv_path`, creating it (and its directory) with a header row if needed.
    pub fn new(csv_path: impl AsRef<Path>) -> Result<Self, BookingLogError> {
        let csv_path = csv_path.as_ref().to_path_buf();

        if !csv_path.exists() {
            info!("Creating new booking log at {}", csv_path.display());

            if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }

            let file = File::create(&csv_path)?;
            let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
            writer.write_record([
                "event_id",
                "name",
                "email",
                "subject",
                "start_time",
                "end_time",
                "meet_link",
                "created_at",
            ])?;
            writer.flush()?;
        }

        Ok(Self {
            csv_path,
            file_mutex: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.csv_path
    }

    pub fn append(&self, record: &BookingRecord) -> Result<(), BookingLogError> {
        let _lock = self.file_mutex.lock().map_err(|_| BookingLogError::Poisoned)?;

        let file = OpenOptions::new().append(true).open(&self.csv_path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;

        info!(
            "Stored booking record for event {} ({} to {})",
            record.event_id, record.start_time, record.end_time
        );

        Ok(())
    }

    pub fn records(&self) -> Result<Vec<BookingRecord>, BookingLogError> {
        let _lock = self.file_mutex.lock().map_err(|_| BookingLogError::Poisoned)?;

        let file = File::open(&self.csv_path)?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let mut records = Vec::new();
        for result in reader.deserialize() {
            records.push(result?);
        }
        Ok(records)
    }

    pub fn find_by_event_id(&self, event_id: &str) -> Result<Option<BookingRecord>, BookingLogError> {
        Ok(self
            .records()?
            .into_iter()
            .find(|record| record.event_id == event_id))
    }
}
