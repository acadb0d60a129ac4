//! Event directory layout: one JSON file per event.
//!
//! Files are named `<yyyyMMddHHmmssSSS>-<EventType>-<ref16>.json`, where
//! `ref16` is the first 16 hex digits of the event reference. The legacy
//! form without the reference suffix is still read. Replay order is the
//! lexicographic order of file names, which sorts by issue time first.
//!
//! References are domain-separated BLAKE3 digests. Directories written by
//! an implementation that used a different digest cannot be read: every
//! file carrying an explicit `ref` fails with [`EventError::RefMismatch`]
//! wrapped in [`EventError::File`] naming the file, and no event is
//! committed past it. Such logs must be migrated, recomputing `ref` and
//! `prev` values, before replay.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use hreg_types::{EventType, FileTimestamp, TypeError};

use crate::error::{EventError, EventResult};
use crate::event::Event;

const EXTENSION: &str = ".json";
const REF_SUFFIX_LEN: usize = 16;

/// A parsed event file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFileName {
    pub timestamp: FileTimestamp,
    pub event_type: EventType,
    pub ref_suffix: Option<String>,
}

impl EventFileName {
    /// File name under which `event` is stored.
    ///
    /// Legacy events without `issuedAt` must be backfilled first.
    pub fn for_event(event: &Event) -> EventResult<Self> {
        let issued_at = event.issued_at().ok_or_else(|| {
            EventError::Parse(format!(
                "event {} has no issuedAt to derive a file name from",
                event.reference()
            ))
        })?;
        let mut suffix = event.reference().to_hex();
        suffix.truncate(REF_SUFFIX_LEN);
        Ok(Self {
            timestamp: FileTimestamp::new(issued_at),
            event_type: event.event_type().clone(),
            ref_suffix: Some(suffix),
        })
    }

    /// Parse a file name.
    ///
    /// Names that do not look like event files at all yield `Ok(None)` and
    /// are skipped by the loader. A name that does look like one but carries
    /// a malformed timestamp is an error.
    pub fn parse(name: &str) -> Result<Option<Self>, TypeError> {
        let Some(stem) = name.strip_suffix(EXTENSION) else {
            return Ok(None);
        };
        let Some((timestamp, rest)) = stem.split_once('-') else {
            return Ok(None);
        };
        if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) || rest.is_empty()
        {
            return Ok(None);
        }
        let timestamp = FileTimestamp::parse(timestamp)?;

        let (event_type, ref_suffix) = match rest.rsplit_once('-') {
            Some((event_type, suffix)) if is_ref_suffix(suffix) && !event_type.is_empty() => {
                (event_type, Some(suffix.to_string()))
            }
            _ => (rest, None),
        };

        Ok(Some(Self {
            timestamp,
            event_type: EventType::new(event_type)?,
            ref_suffix,
        }))
    }

    pub fn file_name(&self) -> String {
        match &self.ref_suffix {
            Some(suffix) => format!("{}-{}-{suffix}{EXTENSION}", self.timestamp, self.event_type),
            None => format!("{}-{}{EXTENSION}", self.timestamp, self.event_type),
        }
    }
}

fn is_ref_suffix(s: &str) -> bool {
    s.len() == REF_SUFFIX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Atomically write the serialized event into `dir`, returning its path.
pub fn write_event(dir: &Path, event: &Event) -> EventResult<PathBuf> {
    let name = EventFileName::for_event(event)?;
    let bytes = event.marshal()?;
    fs::create_dir_all(dir).map_err(|e| EventError::io(dir, e))?;

    let path = dir.join(name.file_name());
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| EventError::io(dir, e))?;
    tmp.write_all(&bytes).map_err(|e| EventError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| EventError::io(tmp.path(), e))?;
    tmp.persist(&path)
        .map_err(|e| EventError::io(&path, e.error))?;

    debug!(path = %path.display(), event_ref = %event.reference(), "event written");
    Ok(path)
}

/// A listed event file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFile {
    pub path: PathBuf,
    pub name: EventFileName,
}

/// Listing of an event directory.
#[derive(Debug, Default)]
pub struct DirectoryListing {
    /// Event files in replay order.
    pub files: Vec<EventFile>,
    /// Entries that do not follow the naming scheme.
    pub skipped: usize,
}

/// List event files in `dir` in replay order.
///
/// Fails with [`EventError::File`] naming the first entry whose name looks
/// like an event file but cannot be parsed.
pub fn list_events(dir: &Path) -> EventResult<DirectoryListing> {
    let entries = fs::read_dir(dir).map_err(|e| EventError::io(dir, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EventError::io(dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| EventError::io(entry.path(), e))?
            .is_file();
        if is_file {
            names.push(entry.path());
        }
    }
    names.sort();

    let mut listing = DirectoryListing::default();
    for path in names {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            listing.skipped += 1;
            continue;
        };
        match EventFileName::parse(file_name) {
            Ok(Some(name)) => listing.files.push(EventFile { path, name }),
            Ok(None) => listing.skipped += 1,
            Err(e) => return Err(EventError::in_file(&path, e.into())),
        }
    }
    Ok(listing)
}

/// Read and parse one event file, backfilling `issuedAt` from its name.
pub fn read_event(file: &EventFile) -> EventResult<Event> {
    let bytes = fs::read(&file.path).map_err(|e| EventError::io(&file.path, e))?;
    let mut event = Event::parse(&bytes).map_err(|e| EventError::in_file(&file.path, e))?;
    if event.backfill_issued_at(file.name.timestamp.instant()) {
        debug!(path = %file.path.display(), "issuedAt backfilled from file name");
    }
    Ok(event)
}
