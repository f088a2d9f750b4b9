//! ---
//! rchan_section: "03-persistence-logging"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Append-only JSON-lines journal of channel events."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::events::ChannelEvent;

/// Journal format version written into the header line.
pub const JOURNAL_VERSION: u16 = 1;

/// Result alias used by the journal.
pub type Result<T> = std::result::Result<T, JournalError>;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported journal version {found}, expected {expected}")]
    Version { found: u16, expected: u16 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalHeader {
    version: u16,
    created_at: DateTime<Utc>,
}

/// One journaled event with its position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub event: ChannelEvent,
}

struct JournalWriter {
    writer: BufWriter<File>,
    next_sequence: u64,
}

/// Append-only event journal. Clones share the same file handle.
#[derive(Clone)]
pub struct EventJournal {
    path: PathBuf,
    inner: Arc<Mutex<JournalWriter>>,
}

impl EventJournal {
    /// Open a journal for appending, writing a header if the file is new.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let fresh = !path.exists() || fs::metadata(path)?.len() == 0;
        let next_sequence = if fresh { 0 } else { last_sequence(path)? };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);

        if fresh {
            let header = JournalHeader {
                version: JOURNAL_VERSION,
                created_at: Utc::now(),
            };
            serde_json::to_writer(&mut writer, &header)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            inner: Arc::new(Mutex::new(JournalWriter {
                writer,
                next_sequence,
            })),
        })
    }

    /// Append an event and return its sequence number.
    pub fn append(&self, event: &ChannelEvent) -> Result<u64> {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence + 1;
        let entry = JournalEntry {
            sequence,
            event: event.clone(),
        };
        serde_json::to_writer(&mut inner.writer, &entry)?;
        inner.writer.write_all(b"\n")?;
        inner.writer.flush()?;
        inner.next_sequence = sequence;
        Ok(sequence)
    }

    /// Closure suitable for [`DataService::subscribe`](crate::DataService::subscribe).
    pub fn listener(&self) -> impl Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync + 'static {
        let journal = self.clone();
        move |event| {
            journal.append(event)?;
            Ok(())
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for EventJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventJournal")
            .field("path", &self.path)
            .finish()
    }
}

fn last_sequence(path: &Path) -> Result<u64> {
    let mut last = 0;
    replay(path, |entry| {
        last = entry.sequence;
        Ok(())
    })?;
    Ok(last)
}

/// Replay the journal in order, invoking the handler for each entry.
pub fn replay<F>(path: &Path, mut handler: F) -> Result<usize>
where
    F: FnMut(JournalEntry) -> Result<()>,
{
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();
    if let Some(header) = lines.next() {
        let header: JournalHeader = serde_json::from_str(&header?)?;
        if header.version != JOURNAL_VERSION {
            return Err(JournalError::Version {
                found: header.version,
                expected: JOURNAL_VERSION,
            });
        }
    }

    let mut count = 0usize;
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        handler(serde_json::from_str(&line)?)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelEventKind;

    #[test]
    fn appends_and_replays_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal").join("events.jsonl");
        let journal = EventJournal::open(&path).unwrap();
        journal
            .append(&ChannelEvent::for_channel(
                ChannelEventKind::ChannelConnected,
                "primary",
            ))
            .unwrap();
        journal
            .append(&ChannelEvent::new(ChannelEventKind::AllChannelsUnavailable))
            .unwrap();

        let mut seen = Vec::new();
        let count = replay(&path, |entry| {
            seen.push((entry.sequence, entry.event.kind));
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            seen,
            vec![
                (1, ChannelEventKind::ChannelConnected),
                (2, ChannelEventKind::AllChannelsUnavailable),
            ]
        );
    }

    #[test]
    fn reopening_continues_the_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        {
            let journal = EventJournal::open(&path).unwrap();
            journal
                .append(&ChannelEvent::new(ChannelEventKind::ChannelRecovered))
                .unwrap();
        }
        let journal = EventJournal::open(&path).unwrap();
        let sequence = journal
            .append(&ChannelEvent::new(ChannelEventKind::ChannelRecovered))
            .unwrap();
        assert_eq!(sequence, 2);
    }

    #[test]
    fn rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        fs::write(
            &path,
            "{\"version\":99,\"created_at\":\"2024-01-01T00:00:00Z\"}\n",
        )
        .unwrap();
        let err = replay(&path, |_| Ok(())).unwrap_err();
        assert!(matches!(err, JournalError::Version { found: 99, .. }));
    }
}
