//! CSV session logging
//!
//! One CSV file per probing session plus an error summary written at
//! shutdown. The row format is shared with older captures, so column
//! names and order stay fixed:
//!
//! ```text
//! type,ip,seq,sendTimeMs,responseTimeMs
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, Utc};
use udptester_core::{DeviceRegistry, EventSink, ProbeEvent};

const HEADER: &str = "type,ip,seq,sendTimeMs,responseTimeMs";
const SUMMARY_HEADER: &str = "mac,ip,errorCount,mismatchCount,overCount";

fn clock(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%H:%M:%S%.3f").to_string()
}

struct LogState {
    writer: BufWriter<File>,
    /// Send clock per outstanding sequence, for the recv rows
    sent_at: HashMap<u16, DateTime<Utc>>,
}

/// Event sink that appends session rows to a CSV file
pub struct CsvEventSink {
    state: Mutex<LogState>,
    path: PathBuf,
    summary_path: PathBuf,
    /// Target IP recorded in send rows; echoes carry their own source
    target_ip: String,
}

impl CsvEventSink {
    /// Create the session log under `dir`, named by the start time
    pub fn create(dir: &Path, target_ip: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("udptester_{stamp}.csv"));
        let summary_path = dir.join(format!("udptester_{stamp}.err.csv"));

        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{HEADER}")?;
        tracing::info!(path = %path.display(), "Session log created");

        Ok(Self {
            state: Mutex::new(LogState {
                writer,
                sent_at: HashMap::new(),
            }),
            path,
            summary_path,
            target_ip: target_ip.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    fn write_row(&self, kind: &str, ip: &str, seq: u16, sent: &str, responded: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(state.writer, "{kind},{ip},{seq},{sent},{responded}") {
            tracing::warn!(error = %e, "Session log write failed");
        }
    }

    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = state.writer.flush() {
            tracing::warn!(error = %e, "Session log flush failed");
        }
    }

    /// Write the per-device error summary next to the session log
    pub fn write_summary(&self, registry: &DeviceRegistry) -> anyhow::Result<()> {
        let mut writer = BufWriter::new(File::create(&self.summary_path)?);
        writeln!(writer, "{SUMMARY_HEADER}")?;
        for record in registry.snapshot() {
            writeln!(
                writer,
                "{},{},{},{},{}",
                record.identity_key,
                record.secondary_address,
                record.error_count,
                record.mismatch_count,
                record.over_count,
            )?;
        }
        writer.flush()?;
        tracing::info!(path = %self.summary_path.display(), "Error summary written");
        Ok(())
    }
}

impl EventSink for CsvEventSink {
    fn emit(&self, event: &ProbeEvent) {
        match event {
            ProbeEvent::ProbeSent {
                sequence,
                timestamp,
            } => {
                {
                    let mut state =
                        self.state.lock().unwrap_or_else(PoisonError::into_inner);
                    // Only recent sequences can still produce recv rows
                    if state.sent_at.len() > 256 {
                        state.sent_at.clear();
                    }
                    state.sent_at.insert(*sequence, *timestamp);
                }
                let sent = clock(*timestamp);
                self.write_row("send", &self.target_ip, *sequence, &sent, "");
            }
            ProbeEvent::ResponseMatched {
                address, sequence, ..
            } => {
                let sent = {
                    let state =
                        self.state.lock().unwrap_or_else(PoisonError::into_inner);
                    state.sent_at.get(sequence).copied()
                };
                let sent = sent.map(clock).unwrap_or_default();
                self.write_row("recv", address, *sequence, &sent, &clock(Utc::now()));
            }
            ProbeEvent::ResponseMismatched {
                address,
                echoed_sequence,
                ..
            } => {
                self.write_row("mismatch", address, *echoed_sequence, "", &clock(Utc::now()));
            }
            ProbeEvent::ResponseDuplicate {
                address, sequence, ..
            } => {
                self.write_row("over", address, *sequence, "", &clock(Utc::now()));
            }
            ProbeEvent::RunStopped { .. } => self.flush(),
            // Discovery, timeouts, and run start land in the summary /
            // tracing output, not the row log
            _ => {}
        }
    }
}

impl Drop for CsvEventSink {
    fn drop(&mut self) {
        self.flush();
    }
}
