//! Sequential readers for archived data and metadata journals.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::{
    ArchiveError,
    metadata::{MetadataEntry, MetadataLine},
    slot::SlotFile,
};
use crate::{
    codec::{CodecError, RecordReader},
    event::LogEvent,
};

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Iterate over every event in a SlotFile, in write order.
pub fn scan_slot_file(path: &Path) -> Result<RecordReader<BufReader<File>>, ArchiveError> {
    let file = File::open(path).map_err(io_error(path))?;
    Ok(RecordReader::new(BufReader::new(file)))
}

/// Read the single event a journal entry points at.
pub fn read_event_at(path: &Path, entry: &MetadataEntry) -> Result<LogEvent, ArchiveError> {
    let mut file = File::open(path).map_err(io_error(path))?;
    file.seek(SeekFrom::Start(entry.start_offset))
        .map_err(io_error(path))?;
    let mut reader = RecordReader::new(BufReader::new(file.take(entry.len())));
    match reader.read()? {
        Some(event) => Ok(event),
        None => Err(CodecError::Truncated {
            expected: entry.len() as usize,
            read: 0,
        }
        .into()),
    }
}

/// Parse a metadata journal. A malformed line fails with its 1-based line
/// number.
pub fn read_metadata(path: &Path) -> Result<Vec<MetadataLine>, ArchiveError> {
    let file = File::open(path).map_err(io_error(path))?;
    let mut lines = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_error(path))?;
        if line.is_empty() {
            continue;
        }
        let parsed = MetadataLine::parse(&line).ok_or_else(|| ArchiveError::Metadata {
            path: path.to_path_buf(),
            line: idx + 1,
            content: line.clone(),
        })?;
        lines.push(parsed);
    }
    Ok(lines)
}

/// Ids of journalled events without a matching ack, in journal order.
pub fn unacked(lines: &[MetadataLine]) -> Vec<u64> {
    let acked: HashSet<u64> = lines
        .iter()
        .filter_map(|line| match line {
            MetadataLine::Ack(id) => Some(*id),
            MetadataLine::Entry(_) => None,
        })
        .collect();
    lines
        .iter()
        .filter_map(|line| match line {
            MetadataLine::Entry(entry) if !acked.contains(&entry.event_id) => Some(entry.event_id),
            _ => None,
        })
        .collect()
}

/// SlotFiles under `root`, ordered by slot then rotation index.
pub fn list_slot_files(root: &Path) -> Result<Vec<SlotFile>, ArchiveError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(root).map_err(io_error(root))? {
        let entry = entry.map_err(io_error(root))?;
        if let Some(slot_file) = entry.file_name().to_str().and_then(SlotFile::parse) {
            files.push(slot_file);
        }
    }
    files.sort();
    Ok(files)
}
