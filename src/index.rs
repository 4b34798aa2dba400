//! # Frame-Offset Index
//!
//! Dump files carry no table of contents, so reaching frame `N` normally
//! means parsing every frame before it. A [`FrameIndex`] records where each
//! `TIMESTEP` marker starts, which lets [`DumpReader`](crate::DumpReader)
//! jump straight to a frame.
//!
//! Building the index from a path memory-maps the file and scans the raw
//! bytes without decoding any particle rows. Rows are only counted, so a
//! trailing frame cut short by the end of the file is left out of the index
//! just as the reader leaves it out of the trajectory.

use crate::dump::{DumpError, ATOMS_MARKER, BOX_MARKER, NATOMS_MARKER, TIMESTEP_MARKER};
use log::{info, warn};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufRead, Seek, SeekFrom};
use std::path::Path;

/// Location of one frame in a dump file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOffset {
    /// Byte offset of the frame's `TIMESTEP` marker line
    pub offset: u64,

    /// 1-based line number of the marker line
    pub line: u64,

    /// Timestep recorded on the line after the marker
    pub timestep: i64,
}

/// Byte offsets of every frame in a dump file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameIndex {
    entries: Vec<FrameOffset>,
}

/// Incremental index construction, one line at a time
///
/// Markers are matched in the same order the frame parser uses, and the
/// particle rows after a column header are skipped without a marker check.
#[derive(Default)]
struct IndexBuilder {
    entries: Vec<FrameOffset>,

    /// Offset and line of a marker still waiting for its timestep line
    pending: Option<(u64, u64)>,

    /// The next line holds the particle count
    expect_natoms: bool,

    /// Particle count of the last indexed frame, once seen
    natoms: Option<u64>,

    /// Particle rows of the last indexed frame still to come
    rows_remaining: u64,

    /// The last indexed frame has not reached the end of its particle rows
    incomplete: bool,
}

impl IndexBuilder {
    fn push_line(&mut self, offset: u64, line: u64, bytes: &[u8]) -> Result<(), DumpError> {
        if let Some((marker_offset, marker_line)) = self.pending.take() {
            let timestep = std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .ok_or_else(|| DumpError::MalformedFrame {
                    frame: self.entries.len(),
                    line,
                    reason: "expected an integer timestep".to_string(),
                    text: String::from_utf8_lossy(bytes).trim_end().to_string(),
                })?;

            self.entries.push(FrameOffset {
                offset: marker_offset,
                line: marker_line,
                timestep,
            });
            self.natoms = None;
            self.rows_remaining = 0;
            self.incomplete = true;
            return Ok(());
        }

        // Particle rows are data, whatever text they hold
        if self.rows_remaining > 0 {
            self.rows_remaining -= 1;
            self.incomplete = self.rows_remaining > 0;
            return Ok(());
        }

        if self.expect_natoms {
            // A bad count is the reader's error to report; the frame just
            // stays incomplete here
            self.expect_natoms = false;
            self.natoms = std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok());
            return Ok(());
        }

        if contains(bytes, TIMESTEP_MARKER.as_bytes()) {
            self.pending = Some((offset, line));
        } else if contains(bytes, NATOMS_MARKER.as_bytes()) {
            self.expect_natoms = true;
        } else if contains(bytes, BOX_MARKER.as_bytes()) {
            // Box rows carry no markers and need no tracking
        } else if contains(bytes, ATOMS_MARKER.as_bytes()) && self.incomplete {
            if let Some(natoms) = self.natoms {
                self.rows_remaining = natoms;
                self.incomplete = natoms > 0;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> FrameIndex {
        // A marker on the last line has no timestep and no frame behind it.
        // A frame whose rows run past the end of the file is dropped too.
        if self.incomplete {
            if let Some(dropped) = self.entries.pop() {
                warn!(
                    "Frame {} at line {} is truncated; leaving it out of the index",
                    self.entries.len(),
                    dropped.line
                );
            }
        }
        FrameIndex {
            entries: self.entries,
        }
    }
}

/// Substring search on raw bytes
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

impl FrameIndex {
    /// Index a dump file through a memory map
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the dump file
    ///
    /// # Returns
    ///
    /// The index, or an error if the file cannot be mapped or a timestep
    /// line is not an integer
    pub fn build<P: AsRef<Path>>(path: P) -> Result<Self, DumpError> {
        let file = File::open(path.as_ref())?;

        // Mapping an empty file fails on some platforms
        if file.metadata()?.len() == 0 {
            return Ok(Self::default());
        }

        // Safety: the map is read-only and dropped before this call returns.
        // Truncating the file concurrently is outside what we support.
        let mmap = unsafe { Mmap::map(&file)? };
        let index = Self::from_bytes(&mmap)?;

        info!(
            "Indexed {} frames in {}",
            index.len(),
            path.as_ref().display()
        );
        Ok(index)
    }

    /// Index an in-memory dump
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DumpError> {
        let mut builder = IndexBuilder::default();
        let mut offset = 0u64;

        for (i, line) in bytes.split_inclusive(|&b| b == b'\n').enumerate() {
            builder.push_line(offset, i as u64 + 1, line)?;
            offset += line.len() as u64;
        }

        Ok(builder.finish())
    }

    /// Index any seekable buffered source
    ///
    /// Scans from the start of the source and leaves it rewound.
    pub fn scan<R: BufRead + Seek>(reader: &mut R) -> Result<Self, DumpError> {
        reader.seek(SeekFrom::Start(0))?;

        let mut builder = IndexBuilder::default();
        let mut buffer = Vec::new();
        let mut offset = 0u64;
        let mut line = 0u64;

        loop {
            buffer.clear();
            let read = reader.read_until(b'\n', &mut buffer)?;
            if read == 0 {
                break;
            }
            line += 1;
            builder.push_line(offset, line, &buffer)?;
            offset += read as u64;
        }

        reader.seek(SeekFrom::Start(0))?;
        Ok(builder.finish())
    }

    /// Number of indexed frames
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no frames were found
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Location of a frame
    pub fn get(&self, frame: usize) -> Option<&FrameOffset> {
        self.entries.get(frame)
    }

    /// Iterate over all indexed frames in file order
    pub fn iter(&self) -> impl Iterator<Item = &FrameOffset> {
        self.entries.iter()
    }

    /// Index of the first frame at or after the given timestep
    ///
    /// Assumes timesteps do not decrease through the file.
    pub fn frame_at_timestep(&self, timestep: i64) -> Option<usize> {
        let frame = self.entries.partition_point(|entry| entry.timestep < timestep);
        (frame < self.entries.len()).then_some(frame)
    }
}
