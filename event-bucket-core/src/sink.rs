//! Day-partitioned storage layout and NDJSON encoding for finished batches.
//!
//! Bucket objects live at
//! `<prefix>/TYPE=<eventType>/DATE_PARTITION=<day>/data-<recordCount>.json`;
//! local mirror files are named `TYPE=<eventType>-DATE_PARTITION=<day>-<eventType>.json`.
//! Both hold one compact JSON object per line.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::contract::Record;
use crate::error::SinkError;

pub fn object_key(key_prefix: &str, event_type: &str, day: &str, record_count: usize) -> String {
    let partition = format!("TYPE={event_type}/DATE_PARTITION={day}/data-{record_count}.json");
    let prefix = key_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        partition
    } else {
        format!("{prefix}/{partition}")
    }
}

pub fn mirror_file_name(event_type: &str, day: &str) -> String {
    format!("TYPE={event_type}-DATE_PARTITION={day}-{event_type}.json")
}

/// Newline-delimited JSON, every line terminated by `\n`.
pub fn encode_ndjson(records: &[Record]) -> Result<Vec<u8>, SinkError> {
    let mut out = Vec::new();
    write_ndjson(&mut out, records)?;
    Ok(out)
}

fn write_ndjson<W: Write>(writer: &mut W, records: &[Record]) -> Result<(), SinkError> {
    for record in records {
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Writes a copy of each batch to a local directory.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    dir: PathBuf,
}

impl LocalMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, event_type: &str, day: &str) -> PathBuf {
        self.dir.join(mirror_file_name(event_type, day))
    }

    /// Writes (or overwrites) the mirror file for one batch and returns its path.
    pub fn write(
        &self,
        event_type: &str,
        day: &str,
        records: &[Record],
    ) -> Result<PathBuf, SinkError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            debug!(path = %self.dir.display(), "Created local mirror directory");
        }
        let path = self.path_for(event_type, day);
        let mut writer = BufWriter::new(fs::File::create(&path)?);
        write_ndjson(&mut writer, records)?;
        writer.flush()?;
        info!(
            path = %path.display(),
            records = records.len(),
            "Wrote batch to local mirror"
        );
        Ok(path)
    }
}
