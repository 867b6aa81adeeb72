//! Result persistence: the append-as-you-go CSV sink and the JSON dump.
//!
//! The CSV layout is the historical export shape consumers already ingest,
//! so the header text and column order are fixed. Rows are flushed as they
//! are appended; a cancelled or crashed run keeps every finished profile.

use std::fs::File;
use std::path::Path;

use tracing::info;

use crate::core::error::ScrapeError;
use crate::core::types::{ContactField, ProfileResult};

pub const CSV_HEADERS: [&str; 8] = [
    "Profile URL",
    "About",
    "Phone",
    "Email",
    "Website",
    "Address",
    "Birthday",
    "Twitter",
];

/// Contact columns in header order; this intentionally differs from the
/// modal's probe order.
const CSV_CONTACT_COLUMNS: [ContactField; 6] = [
    ContactField::Phone,
    ContactField::Email,
    ContactField::Website,
    ContactField::Address,
    ContactField::Birthday,
    ContactField::Twitter,
];

pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Create the file and write the header immediately, so even a run that
    /// dies before its first profile leaves a well-formed CSV behind.
    pub fn create(path: &Path) -> Result<Self, ScrapeError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(CSV_HEADERS)?;
        writer.flush()?;
        info!("output: writing CSV to {}", path.display());
        Ok(CsvSink { writer })
    }

    /// Append one profile row and push it to disk. Absent contact fields
    /// become empty cells.
    pub fn append(&mut self, profile: &ProfileResult) -> Result<(), ScrapeError> {
        let mut record = Vec::with_capacity(CSV_HEADERS.len());
        record.push(profile.url.as_str());
        record.push(profile.about.as_text());
        for field in CSV_CONTACT_COLUMNS {
            record.push(
                profile
                    .contact_details
                    .get(&field)
                    .map(String::as_str)
                    .unwrap_or(""),
            );
        }
        self.writer.write_record(&record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Dump the whole batch as a pretty-printed JSON array.
pub fn write_json(path: &Path, profiles: &[ProfileResult]) -> Result<(), ScrapeError> {
    let json = serde_json::to_string_pretty(profiles)?;
    std::fs::write(path, json)?;
    info!(
        "output: wrote {} profiles as JSON to {}",
        profiles.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Biography;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("profilecrawl-output-{}-{}", std::process::id(), name))
    }

    fn sample() -> ProfileResult {
        let mut p = ProfileResult::new("https://www.linkedin.com/in/sample/");
        p.about = Biography::Text("Builds data pipelines".into());
        p.contact_details
            .insert(ContactField::Email, "sample@example.com".into());
        p.contact_details
            .insert(ContactField::Phone, "+1 555 0100".into());
        p
    }

    #[test]
    fn csv_has_fixed_header_and_column_order() {
        let path = temp_path("header.csv");
        let mut sink = CsvSink::create(&path).unwrap();
        sink.append(&sample()).unwrap();
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Profile URL,About,Phone,Email,Website,Address,Birthday,Twitter"
        );
        assert_eq!(
            lines.next().unwrap(),
            "https://www.linkedin.com/in/sample/,Builds data pipelines,+1 555 0100,sample@example.com,,,,"
        );
    }

    #[test]
    fn csv_marks_failed_rows_not_found() {
        let path = temp_path("failed.csv");
        let mut sink = CsvSink::create(&path).unwrap();
        sink.append(&ProfileResult::failed("https://x/in/gone", "navigation failed"))
            .unwrap();
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(
            content.lines().nth(1).unwrap(),
            "https://x/in/gone,N/A,,,,,,"
        );
    }

    #[test]
    fn json_dump_round_trips() {
        let path = temp_path("dump.json");
        write_json(&path, &[sample()]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let parsed: Vec<ProfileResult> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].about, Biography::Text("Builds data pipelines".into()));
        assert_eq!(
            parsed[0].contact_details.get(&ContactField::Email).unwrap(),
            "sample@example.com"
        );
    }
}
