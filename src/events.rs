// src/events.rs

use crate::counting::FirstSeenEvent;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// CSV sink for first-seen events, one row per event in emission order.
/// Every row is flushed as soon as it is written so an abrupt termination
/// loses at most the row in flight.
pub struct CsvEventSink {
    file: File,
}

impl CsvEventSink {
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writeln!(
            file,
            "vehicle_id,lane,frames_seen,first_frame,first_timestamp_seconds"
        )?;
        file.flush()?;
        info!("💾 Vehicle counts will be written to: {}", path.display());
        Ok(Self { file })
    }

    pub fn write_event(&mut self, event: &FirstSeenEvent) -> Result<()> {
        writeln!(
            self.file,
            "{},{},{},{},{:.3}",
            event.vehicle_id,
            event.lane,
            event.frames_seen,
            event.first_frame,
            event.first_timestamp_seconds
        )?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_header_and_row_format() {
        let path = std::env::temp_dir().join("lane_counter_sink_test.csv");
        let mut sink = CsvEventSink::create(&path).unwrap();
        sink.write_event(&FirstSeenEvent {
            vehicle_id: 4,
            lane: 2,
            frames_seen: 1,
            first_frame: 75,
            first_timestamp_seconds: 3.0,
        })
        .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("vehicle_id,lane,frames_seen,first_frame,first_timestamp_seconds")
        );
        assert_eq!(lines.next(), Some("4,2,1,75,3.000"));
        assert_eq!(lines.next(), None);

        fs::remove_file(&path).ok();
    }
}
