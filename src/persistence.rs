//! Run artifact: recorded and replayed trajectories in one CSV file
//!
//! Layout:
//!
//! ```text
//! timestamp,x,y,z,vx,vy,vz,ax,ay,az
//! Record
//! <recorded rows>
//!
//! Replay
//! <replayed rows>
//! ```
//!
//! Channels that were not streamed are left blank. An optional JSON sidecar with
//! the same stem carries the run's [`SessionMetadata`].

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{ReplayError, Result};
use crate::session::types::SessionMetadata;
use crate::types::{TelemetrySample, Vec3};

/// Column header of the artifact
pub const CSV_HEADER: &str = "timestamp,x,y,z,vx,vy,vz,ax,ay,az";
/// Marker row preceding the recorded samples
pub const RECORD_MARKER: &str = "Record";
/// Marker row preceding the replayed samples
pub const REPLAY_MARKER: &str = "Replay";
/// Default file name prefix
pub const DEFAULT_FILE_PREFIX: &str = "kinematics_log";
/// Columns of a full row
const ROW_FIELDS: usize = 10;
const MAX_NAME_SUFFIX: u32 = 999;

/// Both trajectories read back from an artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifact {
    pub recorded: Vec<TelemetrySample>,
    pub replayed: Vec<TelemetrySample>,
}

/// Writes run artifacts into a directory
#[derive(Debug, Clone)]
pub struct PersistenceSink {
    output_dir: PathBuf,
    file_prefix: String,
    write_metadata: bool,
}

impl PersistenceSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            write_metadata: false,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Also write the JSON metadata sidecar
    pub fn with_metadata(mut self, enabled: bool) -> Self {
        self.write_metadata = enabled;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Artifact path for a run started at `at`
    pub fn artifact_path(&self, at: DateTime<Local>) -> PathBuf {
        self.numbered_path(at, 0)
    }

    fn numbered_path(&self, at: DateTime<Local>, n: u32) -> PathBuf {
        let stamp = at.format("%Y%m%d_%H%M%S");
        let name = match n {
            0 => format!("{}_{}.csv", self.file_prefix, stamp),
            n => format!("{}_{}_{}.csv", self.file_prefix, stamp, n),
        };
        self.output_dir.join(name)
    }

    /// Create a fresh artifact file; an existing name gets a `_N` suffix
    fn create_artifact(&self, at: DateTime<Local>) -> std::io::Result<(PathBuf, File)> {
        let mut n = 0;
        loop {
            let path = self.numbered_path(at, n);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && n < MAX_NAME_SUFFIX => n += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Write both trajectories, plus the sidecar when enabled
    ///
    /// Single attempt; a failure to write the CSV is reported as
    /// [`ReplayError::Persistence`]. The sidecar is best effort and only logged.
    pub fn write(
        &self,
        recorded: &[TelemetrySample],
        replayed: &[TelemetrySample],
        metadata: Option<&SessionMetadata>,
    ) -> Result<PathBuf> {
        self.write_at(Local::now(), recorded, replayed, metadata)
    }

    pub(crate) fn write_at(
        &self,
        at: DateTime<Local>,
        recorded: &[TelemetrySample],
        replayed: &[TelemetrySample],
        metadata: Option<&SessionMetadata>,
    ) -> Result<PathBuf> {
        let dir_err = |e: std::io::Error| {
            ReplayError::Persistence(format!("{}: {}", self.output_dir.display(), e))
        };
        std::fs::create_dir_all(&self.output_dir).map_err(dir_err)?;
        let (path, file) = self.create_artifact(at).map_err(dir_err)?;

        let persist_err =
            |e: std::io::Error| ReplayError::Persistence(format!("{}: {}", path.display(), e));
        let mut writer = BufWriter::new(file);
        write_csv(&mut writer, recorded, replayed).map_err(persist_err)?;
        writer.flush().map_err(persist_err)?;

        tracing::info!(
            "Saved {} recorded and {} replayed samples to {}",
            recorded.len(),
            replayed.len(),
            path.display()
        );

        if let (true, Some(metadata)) = (self.write_metadata, metadata) {
            let sidecar = metadata_path(&path);
            match save_metadata(&sidecar, metadata) {
                Ok(()) => tracing::debug!("Saved run metadata to {}", sidecar.display()),
                Err(e) => tracing::warn!("Run metadata not saved: {}", e),
            }
        }
        Ok(path)
    }
}

/// Sidecar path for an artifact
pub fn metadata_path(artifact: &Path) -> PathBuf {
    artifact.with_extension("json")
}

pub fn save_metadata(path: &Path, metadata: &SessionMetadata) -> Result<()> {
    let persist_err = |e: &dyn std::fmt::Display| {
        ReplayError::Persistence(format!("{}: {}", path.display(), e))
    };
    let json = serde_json::to_string_pretty(metadata).map_err(|e| persist_err(&e))?;
    std::fs::write(path, json).map_err(|e| persist_err(&e))
}

pub fn load_metadata(path: &Path) -> Result<SessionMetadata> {
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| ReplayError::Serialization(e.to_string()))
}

fn write_vec(out: &mut String, v: Option<Vec3>) {
    match v {
        Some(v) => out.push_str(&format!(",{},{},{}", v.x, v.y, v.z)),
        None => out.push_str(",,,"),
    }
}

fn format_row(sample: &TelemetrySample) -> String {
    let p = sample.position();
    let mut row = format!("{},{},{},{}", sample.timestamp(), p.x, p.y, p.z);
    write_vec(&mut row, sample.velocity());
    write_vec(&mut row, sample.acceleration());
    row
}

/// Write the artifact body
pub fn write_csv<W: Write>(
    writer: &mut W,
    recorded: &[TelemetrySample],
    replayed: &[TelemetrySample],
) -> std::io::Result<()> {
    writeln!(writer, "{}", CSV_HEADER)?;
    writeln!(writer, "{}", RECORD_MARKER)?;
    for sample in recorded {
        writeln!(writer, "{}", format_row(sample))?;
    }
    writeln!(writer)?;
    writeln!(writer, "{}", REPLAY_MARKER)?;
    for sample in replayed {
        writeln!(writer, "{}", format_row(sample))?;
    }
    Ok(())
}

fn parse_err(line: usize, msg: impl std::fmt::Display) -> ReplayError {
    ReplayError::Serialization(format!("line {}: {}", line, msg))
}

fn parse_f64(field: &str, line: usize) -> Result<f64> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|e| parse_err(line, format!("'{}': {}", field, e)))
}

fn parse_vec(fields: &[&str], line: usize) -> Result<Option<Vec3>> {
    if fields.iter().all(|f| f.trim().is_empty()) {
        return Ok(None);
    }
    Ok(Some(Vec3::new(
        parse_f64(fields[0], line)?,
        parse_f64(fields[1], line)?,
        parse_f64(fields[2], line)?,
    )))
}

fn parse_row(text: &str, line: usize) -> Result<TelemetrySample> {
    let mut fields: Vec<&str> = text.split(',').collect();
    if fields.len() < 4 || fields.len() > ROW_FIELDS {
        return Err(parse_err(
            line,
            format!("expected 4 to {} fields, got {}", ROW_FIELDS, fields.len()),
        ));
    }
    fields.resize(ROW_FIELDS, "");

    let timestamp = fields[0]
        .trim()
        .parse::<u64>()
        .map_err(|e| parse_err(line, format!("timestamp '{}': {}", fields[0], e)))?;
    let position = Vec3::new(
        parse_f64(fields[1], line)?,
        parse_f64(fields[2], line)?,
        parse_f64(fields[3], line)?,
    );

    let mut sample = TelemetrySample::new(timestamp, position);
    if let Some(v) = parse_vec(&fields[4..7], line)? {
        sample = sample.with_velocity(v);
    }
    if let Some(a) = parse_vec(&fields[7..10], line)? {
        sample = sample.with_acceleration(a);
    }
    Ok(sample)
}

#[derive(Clone, Copy)]
enum Section {
    Preamble,
    Record,
    Replay,
}

/// Parse an artifact body
pub fn parse_csv<R: BufRead>(reader: R) -> Result<Artifact> {
    let mut artifact = Artifact::default();
    let mut section = Section::Preamble;
    let mut saw_header = false;

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line?;
        let text = line.trim();

        if !saw_header {
            if text != CSV_HEADER {
                return Err(parse_err(line_no, format!("unexpected header '{}'", text)));
            }
            saw_header = true;
            continue;
        }
        // Separator rows may come back as a run of commas from spreadsheet tools
        if text.chars().all(|c| c == ',') {
            continue;
        }
        if text.trim_end_matches(',') == RECORD_MARKER {
            section = Section::Record;
            continue;
        }
        if text.trim_end_matches(',') == REPLAY_MARKER {
            section = Section::Replay;
            continue;
        }

        let sample = parse_row(text, line_no)?;
        match section {
            Section::Record => artifact.recorded.push(sample),
            Section::Replay => artifact.replayed.push(sample),
            Section::Preamble => {
                return Err(parse_err(line_no, "sample row before the Record marker"))
            }
        }
    }

    if !saw_header {
        return Err(parse_err(1, "empty artifact"));
    }
    Ok(artifact)
}

/// Read an artifact written by [`PersistenceSink::write`]
pub fn read_artifact(path: &Path) -> Result<Artifact> {
    let file = File::open(path)?;
    parse_csv(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn full(t: u64) -> TelemetrySample {
        let f = t as f64;
        TelemetrySample::new(t, Vec3::new(f * 0.001, -0.25, 0.5))
            .with_velocity(Vec3::new(0.1, 0.0, -0.0))
            .with_acceleration(Vec3::new(0.0, 9.81, 1e-7))
    }

    #[test]
    fn test_layout() {
        let recorded = [TelemetrySample::new(10, Vec3::new(1.0, 2.0, 3.0))];
        let replayed = [full(20)];
        let mut out = Vec::new();
        write_csv(&mut out, &recorded, &replayed).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "Record");
        assert_eq!(lines[2], "10,1,2,3,,,,,,");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "Replay");
        assert!(lines[5].starts_with("20,0.02,-0.25,0.5,0.1,"));
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_round_trip_in_memory() {
        let recorded: Vec<_> = (0..5).map(|i| full(i * 100)).collect();
        let replayed = vec![TelemetrySample::new(7, Vec3::new(0.1, 0.2, 0.3))];
        let mut out = Vec::new();
        write_csv(&mut out, &recorded, &replayed).unwrap();

        let artifact = parse_csv(Cursor::new(out)).unwrap();
        assert_eq!(artifact.recorded, recorded);
        assert_eq!(artifact.replayed, replayed);
    }

    #[test]
    fn test_empty_sections() {
        let mut out = Vec::new();
        write_csv(&mut out, &[], &[]).unwrap();
        let artifact = parse_csv(Cursor::new(out)).unwrap();
        assert!(artifact.recorded.is_empty());
        assert!(artifact.replayed.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_csv(Cursor::new("")).is_err());
        assert!(parse_csv(Cursor::new("t,x\n")).is_err());
        let orphan = format!("{}\n1,2,3,4\n", CSV_HEADER);
        assert!(parse_csv(Cursor::new(orphan)).is_err());
        let bad = format!("{}\nRecord\n1,abc,3,4\n", CSV_HEADER);
        assert!(matches!(
            parse_csv(Cursor::new(bad)),
            Err(ReplayError::Serialization(msg)) if msg.starts_with("line 3")
        ));
    }

    #[test]
    fn test_parse_rejects_long_rows() {
        let long = format!("{}\nRecord\n1,0,0,0,0,0,0,0,0,0,7\n", CSV_HEADER);
        assert!(matches!(
            parse_csv(Cursor::new(long)),
            Err(ReplayError::Serialization(msg)) if msg.contains("got 11")
        ));
    }

    #[test]
    fn test_short_rows_are_position_only() {
        let text = format!("{}\nRecord\n5,1.5,2.5,3.5\n,,,\nReplay\n", CSV_HEADER);
        let artifact = parse_csv(Cursor::new(text)).unwrap();
        assert_eq!(artifact.recorded.len(), 1);
        assert_eq!(artifact.recorded[0].velocity(), None);
    }

    #[test]
    fn test_artifact_name() {
        let sink = PersistenceSink::new("/tmp/runs");
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            sink.artifact_path(at),
            PathBuf::from("/tmp/runs/kinematics_log_20240309_140507.csv")
        );
        let sink = sink.with_prefix("flight");
        assert!(sink
            .artifact_path(at)
            .ends_with("flight_20240309_140507.csv"));
    }

    #[test]
    fn test_write_to_directory_with_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PersistenceSink::new(dir.path().join("nested")).with_metadata(true);
        let metadata = SessionMetadata {
            uri: "sim://test".to_string(),
            recorded_at: chrono::Utc::now(),
            sample_period_ms: 100,
            channels: Default::default(),
            recorded_samples: 1,
            recorded_duration_ms: 0,
            replayed_samples: 0,
            moves: 0,
            skips: 0,
            aborted_at_step: None,
            outcome: "completed".to_string(),
        };

        let path = sink.write(&[full(1)], &[], Some(&metadata)).unwrap();
        assert!(path.exists());
        let artifact = read_artifact(&path).unwrap();
        assert_eq!(artifact.recorded, vec![full(1)]);

        let loaded = load_metadata(&metadata_path(&path)).unwrap();
        assert_eq!(loaded.uri, "sim://test");
        assert_eq!(loaded.recorded_samples, 1);
    }

    #[test]
    fn test_unwritable_directory_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a dir").unwrap();
        let sink = PersistenceSink::new(blocker.join("sub"));
        assert!(matches!(sink.write(&[], &[], None), Err(ReplayError::Persistence(_))));
    }

    fn sample_metadata() -> SessionMetadata {
        SessionMetadata {
            uri: "sim://test".to_string(),
            recorded_at: chrono::Utc::now(),
            sample_period_ms: 100,
            channels: Default::default(),
            recorded_samples: 1,
            recorded_duration_ms: 0,
            replayed_samples: 0,
            moves: 0,
            skips: 0,
            aborted_at_step: None,
            outcome: "completed".to_string(),
        }
    }

    #[test]
    fn test_sidecar_failure_keeps_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PersistenceSink::new(dir.path()).with_metadata(true);
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        // A directory where the sidecar should go makes its write fail
        std::fs::create_dir(metadata_path(&sink.artifact_path(at))).unwrap();

        let path = sink.write_at(at, &[full(1)], &[], Some(&sample_metadata())).unwrap();
        assert_eq!(path, sink.artifact_path(at));
        assert_eq!(read_artifact(&path).unwrap().recorded, vec![full(1)]);
        assert!(metadata_path(&path).is_dir());
    }

    #[test]
    fn test_same_second_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PersistenceSink::new(dir.path());
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let first = sink.write_at(at, &[full(1)], &[], None).unwrap();
        let second = sink.write_at(at, &[full(2)], &[], None).unwrap();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("kinematics_log_20240309_140507_1.csv"));
        assert_eq!(read_artifact(&first).unwrap().recorded, vec![full(1)]);
        assert_eq!(read_artifact(&second).unwrap().recorded, vec![full(2)]);
    }
}
