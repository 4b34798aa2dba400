//! # Granular Dump Trajectory Reader
//!
//! This module reads the text snapshot ("dump") trajectories written by
//! LAMMPS and LIGGGHTS. A dump is a sequence of frames, each introduced by
//! a handful of `ITEM:` section markers:
//!
//! ```text
//! ITEM: TIMESTEP
//! 1000
//! ITEM: NUMBER OF ATOMS
//! 2
//! ITEM: BOX BOUNDS pp pp ff
//! 0 10
//! 0 10
//! 0 20
//! ITEM: ATOMS id type x y z radius
//! 1 1 1.0 2.0 3.0 0.5
//! 2 1 4.0 5.0 6.0 0.5
//! ```
//!
//! Markers are recognised by substring containment, and the column set of
//! each frame comes from its own `ATOMS` header, so frames with different
//! columns can follow each other in the same file.
//!
//! ## Streaming model
//!
//! [`DumpReader`] keeps only the most recently parsed [`Frame`]. Moving
//! forward parses the next frame from the current stream position; moving
//! backward rewinds to the start of the file and parses forward again. The
//! format carries no index, so a seek costs a linear scan unless a
//! [`FrameIndex`] was built up front.
//!
//! ## Example
//!
//! ```no_run
//! use resgran::DumpReader;
//!
//! let mut reader = DumpReader::open("dump.liggghts").unwrap();
//! while let Some(timestep) = reader.advance().unwrap() {
//!     let frame = reader.current_frame().unwrap();
//!     println!("timestep {} has {} particles", timestep, frame.natoms);
//! }
//! ```

use crate::frame::{BoundingBox, Frame, Value};
use crate::index::FrameIndex;
use indexmap::IndexMap;
use log::{debug, trace, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Substring marking the start of a frame
pub(crate) const TIMESTEP_MARKER: &str = "TIMESTEP";

/// Substring marking the particle count section
pub(crate) const NATOMS_MARKER: &str = "NUMBER OF ATOMS";

/// Substring marking the simulation box section
pub(crate) const BOX_MARKER: &str = "BOX";

/// Substring marking the per-particle column header
///
/// `NUMBER OF ATOMS` also contains this, so it has to be tested last.
pub(crate) const ATOMS_MARKER: &str = "ATOMS";

/// Leading tokens of the column header (`ITEM:` and `ATOMS`)
const ATOMS_HEADER_PREFIX: usize = 2;

/// Upper bound on rows reserved per column before any row is read
///
/// The particle count comes straight from the file, so larger frames grow
/// their columns as rows arrive.
const MAX_RESERVED_ROWS: usize = 1 << 16;

/// Possible errors when reading dump trajectories
#[derive(Error, Debug)]
pub enum DumpError {
    /// I/O errors from the underlying source
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame violates the dump structure
    ///
    /// No part of the offending frame is published.
    #[error("malformed frame {frame} at line {line}: {reason} (line: {text:?})")]
    MalformedFrame {
        /// 0-based index of the frame being parsed
        frame: usize,
        /// 1-based line number of the offending line
        line: u64,
        /// What was wrong
        reason: String,
        /// The offending line
        text: String,
    },

    /// The reader was used after [`DumpReader::close`]
    #[error("trajectory source is closed")]
    ClosedSource,

    /// A seek was requested to a negative frame index
    #[error("invalid seek target: frame {0}")]
    InvalidSeekTarget(i64),
}

/// Section markers recognised on a single line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Timestep,
    Natoms,
    Box,
    Atoms,
}

impl Marker {
    /// Find the marker on a line, testing the more specific markers first
    fn detect(line: &str) -> Option<Self> {
        if line.contains(TIMESTEP_MARKER) {
            Some(Marker::Timestep)
        } else if line.contains(NATOMS_MARKER) {
            Some(Marker::Natoms)
        } else if line.contains(BOX_MARKER) {
            Some(Marker::Box)
        } else if line.contains(ATOMS_MARKER) {
            Some(Marker::Atoms)
        } else {
            None
        }
    }
}

/// Sections seen so far in the frame being parsed
///
/// Nothing in here is visible to callers; a [`Frame`] is only built once
/// the particle section has been read in full.
#[derive(Default)]
struct PartialFrame {
    /// Set by the `TIMESTEP` section; also marks that the frame has started
    timestep: Option<i64>,

    /// Set by the `NUMBER OF ATOMS` section; required before the box and
    /// particle sections
    natoms: Option<usize>,

    /// Set by the `BOX` section
    bounds: Option<BoundingBox>,
}

/// A malformed frame remembered until the cursor is repositioned
///
/// `DumpError` holds an `io::Error` and cannot be cloned, so the fields of
/// the malformed-frame error are kept instead.
#[derive(Debug, Clone)]
struct Failure {
    frame: usize,
    line: u64,
    reason: String,
    text: String,
}

impl Failure {
    fn to_error(&self) -> DumpError {
        DumpError::MalformedFrame {
            frame: self.frame,
            line: self.line,
            reason: self.reason.clone(),
            text: self.text.clone(),
        }
    }
}

/// Line-oriented frame parser
///
/// Holds only a reusable line buffer and the current line number; every
/// call to [`FrameParser::parse_frame`] starts a fresh frame.
#[derive(Debug, Default)]
pub(crate) struct FrameParser {
    /// Reused for every line to avoid an allocation per read
    line: String,

    /// 1-based number of the line held in `line`
    line_no: u64,
}

impl FrameParser {
    /// Set the number of lines already consumed from the source
    pub(crate) fn reset(&mut self, lines_consumed: u64) {
        self.line.clear();
        self.line_no = lines_consumed;
    }

    /// Read the next line into the buffer, returning `false` at end of stream
    fn next_line<R: BufRead>(&mut self, reader: &mut R) -> Result<bool, DumpError> {
        self.line.clear();
        if reader.read_line(&mut self.line)? == 0 {
            return Ok(false);
        }
        self.line_no += 1;

        let trimmed = self.line.trim_end_matches(|c: char| c == '\n' || c == '\r').len();
        self.line.truncate(trimmed);
        Ok(true)
    }

    /// Build an error pointing at the current line
    fn malformed(&self, frame: usize, reason: impl Into<String>) -> DumpError {
        DumpError::MalformedFrame {
            frame,
            line: self.line_no,
            reason: reason.into(),
            text: self.line.clone(),
        }
    }

    /// Report a frame cut short by the end of the stream
    fn truncated(&self, frame: usize, partial: &PartialFrame) -> Option<Frame> {
        if partial.timestep.is_some() {
            warn!(
                "Frame {} is truncated at line {}; treating it as the end of the trajectory",
                frame, self.line_no
            );
        }
        None
    }

    /// Parse the current line as a single integer
    fn parse_int<T: std::str::FromStr>(&self, frame: usize, what: &str) -> Result<T, DumpError> {
        self.line
            .trim()
            .parse::<T>()
            .map_err(|_| self.malformed(frame, format!("expected {}", what)))
    }

    /// Parse the current line as one row of the box section
    ///
    /// # Returns
    ///
    /// The `[min, max]` pair and the tilt factor, if the row carries one
    fn parse_box_row(&self, frame: usize) -> Result<([f64; 2], Option<f64>), DumpError> {
        let mut tokens = self.line.split_whitespace();
        let mut bound = [0.0; 2];
        for value in bound.iter_mut() {
            let token = tokens
                .next()
                .ok_or_else(|| self.malformed(frame, "box row needs a lower and upper bound"))?;
            *value = token
                .parse::<f64>()
                .map_err(|_| self.malformed(frame, format!("non-numeric box bound {:?}", token)))?;
        }

        let tilt = match tokens.next() {
            Some(token) => Some(
                token
                    .parse::<f64>()
                    .map_err(|_| self.malformed(frame, format!("non-numeric tilt factor {:?}", token)))?,
            ),
            None => None,
        };

        Ok((bound, tilt))
    }

    /// Boundary flags from a box header such as `ITEM: BOX BOUNDS xy xz yz pp pp ff`
    fn boundary_flags(&self) -> Vec<String> {
        let tokens: Vec<&str> = self.line.split_whitespace().collect();
        let start = tokens
            .iter()
            .rposition(|t| t.contains(BOX_MARKER) || t.contains("BOUNDS"))
            .map_or(tokens.len(), |i| i + 1);

        tokens[start..]
            .iter()
            .filter(|t| !matches!(**t, "xy" | "xz" | "yz"))
            .map(|t| t.to_string())
            .collect()
    }

    /// Parse the next complete frame from the stream
    ///
    /// Lines before the frame's `TIMESTEP` marker and lines that carry no
    /// marker are skipped. The frame is complete once all of its particle
    /// rows have been read.
    ///
    /// # Arguments
    ///
    /// * `reader` - Source positioned anywhere before the next frame
    /// * `frame` - Index to assign to the parsed frame
    ///
    /// # Returns
    ///
    /// - `Some(Frame)` for a fully parsed frame
    /// - `None` if the stream ends before a frame completes
    /// - An error if the frame is malformed
    pub(crate) fn parse_frame<R: BufRead>(
        &mut self,
        reader: &mut R,
        frame: usize,
    ) -> Result<Option<Frame>, DumpError> {
        let mut partial = PartialFrame::default();

        loop {
            // End of stream between sections ends the trajectory
            if !self.next_line(reader)? {
                return Ok(self.truncated(frame, &partial));
            }

            let marker = match Marker::detect(&self.line) {
                Some(marker) => marker,
                None => {
                    trace!("Skipping line {}: {:?}", self.line_no, self.line);
                    continue;
                }
            };

            // A frame only starts at its timestep marker; anything earlier
            // belongs to a header or to a frame we are not positioned in
            if marker != Marker::Timestep && partial.timestep.is_none() {
                trace!("Skipping {:?} section before any timestep marker", marker);
                continue;
            }

            match marker {
                Marker::Timestep => {
                    // A second marker means the previous frame never reached
                    // its particle section
                    if partial.timestep.is_some() {
                        return Err(self.malformed(frame, "new timestep before the particle section"));
                    }
                    if !self.next_line(reader)? {
                        return Ok(self.truncated(frame, &partial));
                    }
                    partial.timestep = Some(self.parse_int(frame, "an integer timestep")?);
                }

                Marker::Natoms => {
                    if !self.next_line(reader)? {
                        return Ok(self.truncated(frame, &partial));
                    }
                    partial.natoms = Some(self.parse_int(frame, "a non-negative particle count")?);
                }

                Marker::Box => {
                    // The format puts the count first; columns are sized from it
                    if partial.natoms.is_none() {
                        return Err(self.malformed(frame, "box section before the particle count"));
                    }

                    // Flags come from the header line itself, bounds from the
                    // three rows after it (x, y, z in that order)
                    let boundary = self.boundary_flags();
                    let mut bounds = [[0.0; 2]; 3];
                    let mut tilt = [0.0; 3];
                    let mut tilted = 0;
                    for (axis, bound) in bounds.iter_mut().enumerate() {
                        if !self.next_line(reader)? {
                            return Ok(self.truncated(frame, &partial));
                        }
                        let (row, row_tilt) = self.parse_box_row(frame)?;
                        *bound = row;
                        if let Some(t) = row_tilt {
                            tilt[axis] = t;
                            tilted += 1;
                        }
                    }

                    // Tilt only applies when every row carries one
                    partial.bounds = Some(BoundingBox {
                        bounds,
                        tilt: (tilted == 3).then_some(tilt),
                        boundary,
                    });
                }

                // The column header closes the frame: the rows follow directly
                Marker::Atoms => {
                    return self.parse_particles(reader, frame, partial);
                }
            }
        }
    }

    /// Parse the column header on the current line and the particle rows after it
    fn parse_particles<R: BufRead>(
        &mut self,
        reader: &mut R,
        frame: usize,
        partial: PartialFrame,
    ) -> Result<Option<Frame>, DumpError> {
        let (timestep, natoms) = match (partial.timestep, partial.natoms) {
            (Some(timestep), Some(natoms)) => (timestep, natoms),
            _ => return Err(self.malformed(frame, "particle section before the particle count")),
        };
        let bounds = match &partial.bounds {
            Some(bounds) => bounds.clone(),
            None => return Err(self.malformed(frame, "particle section before the box section")),
        };

        // Column names follow `ITEM: ATOMS`, in the order the rows use them
        let names: Vec<String> = self
            .line
            .split_whitespace()
            .skip(ATOMS_HEADER_PREFIX)
            .map(str::to_owned)
            .collect();
        if names.is_empty() && natoms > 0 {
            return Err(self.malformed(frame, "column header names no columns"));
        }

        // Reserve for the declared count only up to a cap; a bogus count must
        // end in a truncated or malformed frame, not a failed allocation
        let reserved = natoms.min(MAX_RESERVED_ROWS);
        let mut values: Vec<Vec<f64>> = names.iter().map(|_| Vec::with_capacity(reserved)).collect();
        for _ in 0..natoms {
            if !self.next_line(reader)? {
                return Ok(self.truncated(frame, &partial));
            }

            // Tokens are assigned to columns by position; extra tokens are ignored
            let mut tokens = self.line.split_whitespace();
            for (name, column) in names.iter().zip(values.iter_mut()) {
                let token = tokens.next().ok_or_else(|| {
                    self.malformed(
                        frame,
                        format!("particle row has fewer than {} columns", names.len()),
                    )
                })?;
                let value = token.parse::<f64>().map_err(|_| {
                    self.malformed(frame, format!("non-numeric value {:?} in column {}", token, name))
                })?;
                column.push(value);
            }
        }

        // Repeated names keep the last column, like a dictionary would
        let mut columns = IndexMap::with_capacity(names.len());
        for (name, column) in names.into_iter().zip(values) {
            if columns.contains_key(&name) {
                warn!("Frame {} repeats column {}; keeping the last one", frame, name);
            }
            columns.insert(name, column);
        }

        Ok(Some(Frame::from_parts(frame, timestep, natoms, bounds, columns)))
    }
}

/// Builder for DumpReader to allow flexible construction
///
/// ```no_run
/// use resgran::DumpReaderBuilder;
///
/// let reader = DumpReaderBuilder::new("dump.liggghts")
///     .with_index(true)
///     .build()
///     .unwrap();
/// println!("{:?} frames", reader.num_frames());
/// ```
pub struct DumpReaderBuilder {
    /// Path to the dump file
    path: PathBuf,

    /// Scan the file for frame offsets up front
    ///
    /// Makes seeking constant-time at the cost of one pass over the file.
    build_index: bool,

    /// Capacity of the buffered reader
    buffer_size: Option<usize>,

    /// Warn when a frame's timestep is lower than the previous one
    check_monotonic: bool,
}

impl DumpReaderBuilder {
    /// Create a new builder
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the dump file
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            build_index: false,
            buffer_size: None,
            check_monotonic: true,
        }
    }

    /// Build a frame-offset index when the reader is opened
    pub fn with_index(mut self, build_index: bool) -> Self {
        self.build_index = build_index;
        self
    }

    /// Set the capacity of the buffered reader in bytes
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Enable or disable the decreasing-timestep warning
    pub fn check_monotonic(mut self, check: bool) -> Self {
        self.check_monotonic = check;
        self
    }

    /// Build the reader
    ///
    /// # Returns
    ///
    /// A Result containing either the DumpReader or an error
    pub fn build(self) -> Result<DumpReader, DumpError> {
        let file = File::open(&self.path)?;

        let index = if self.build_index {
            Some(FrameIndex::build(&self.path)?)
        } else {
            None
        };

        let source = match self.buffer_size {
            Some(size) => BufReader::with_capacity(size, file),
            None => BufReader::new(file),
        };

        let mut reader = DumpReader::from_reader(source);
        reader.index = index;
        reader.check_monotonic = self.check_monotonic;
        debug!("Opened dump trajectory {}", self.path.display());
        Ok(reader)
    }
}

/// A streaming cursor over a dump trajectory
///
/// The reader owns its source and the most recently parsed [`Frame`].
/// Borrowed frames are only valid until the next call that moves the
/// cursor. A single reader must not be shared between threads; open one
/// reader per frame range instead.
#[derive(Debug)]
pub struct DumpReader<R = BufReader<File>> {
    /// The underlying source, `None` once closed
    source: Option<R>,

    /// Frame parser with its reusable line buffer
    parser: FrameParser,

    /// Most recently parsed frame
    current: Option<Frame>,

    /// Number of frames consumed from the start of the source
    ///
    /// The next parsed frame gets this index.
    frames_read: usize,

    /// Set once the end of the trajectory is reached, cleared by rewind
    exhausted: bool,

    /// Set when a frame is malformed, cleared by rewind or an indexed seek
    ///
    /// The stream position is then inside the broken frame, so later
    /// advances report the same error instead of resyncing silently.
    failure: Option<Failure>,

    /// Optional frame-offset index for constant-time seeks
    index: Option<FrameIndex>,

    /// Warn on decreasing timesteps
    check_monotonic: bool,
}

impl DumpReader {
    /// Opens a dump file for reading
    ///
    /// This is a convenience method that uses the builder pattern internally.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DumpError> {
        DumpReaderBuilder::new(path).build()
    }
}

impl<R: BufRead + Seek> DumpReader<R> {
    /// Wrap any seekable buffered source
    pub fn from_reader(source: R) -> Self {
        Self {
            source: Some(source),
            parser: FrameParser::default(),
            current: None,
            frames_read: 0,
            exhausted: false,
            failure: None,
            index: None,
            check_monotonic: true,
        }
    }

    /// Scan the whole source for frame offsets and keep the index
    ///
    /// Rewinds the reader afterwards.
    pub fn build_index(&mut self) -> Result<&FrameIndex, DumpError> {
        let source = self.source.as_mut().ok_or(DumpError::ClosedSource)?;
        let index = FrameIndex::scan(source)?;
        self.rewind()?;
        Ok(self.index.insert(index))
    }

    /// Parse the next frame and make it the current one
    ///
    /// # Returns
    ///
    /// - `Some(timestep)` of the newly parsed frame
    /// - `None` once the trajectory is exhausted; repeated calls keep
    ///   returning `None` until [`DumpReader::rewind`]
    /// - An error if the frame is malformed; the previous frame stays current
    ///   and the same error is returned until the reader is rewound
    pub fn advance(&mut self) -> Result<Option<i64>, DumpError> {
        let source = self.source.as_mut().ok_or(DumpError::ClosedSource)?;
        if let Some(failure) = &self.failure {
            return Err(failure.to_error());
        }
        if self.exhausted {
            return Ok(None);
        }

        let frame = match self.parser.parse_frame(source, self.frames_read) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("End of trajectory after {} frames", self.frames_read);
                self.exhausted = true;
                return Ok(None);
            }
            Err(e) => {
                // Only structural errors stick; I/O errors may be transient
                if let DumpError::MalformedFrame {
                    frame,
                    line,
                    reason,
                    text,
                } = &e
                {
                    self.failure = Some(Failure {
                        frame: *frame,
                        line: *line,
                        reason: reason.clone(),
                        text: text.clone(),
                    });
                }
                return Err(e);
            }
        };

        if self.check_monotonic {
            if let Some(previous) = &self.current {
                if previous.index + 1 == frame.index && frame.timestep < previous.timestep {
                    warn!(
                        "Timestep decreases from {} to {} at frame {}",
                        previous.timestep, frame.timestep, frame.index
                    );
                }
            }
        }

        debug!(
            "Parsed frame {} (timestep {}, {} particles, {} columns)",
            frame.index,
            frame.timestep,
            frame.natoms,
            frame.num_columns()
        );

        let timestep = frame.timestep;
        self.frames_read += 1;
        self.current = Some(frame);
        Ok(Some(timestep))
    }

    /// Parse the next frame and return it
    pub fn read_next(&mut self) -> Result<Option<&Frame>, DumpError> {
        match self.advance()? {
            Some(_) => Ok(self.current.as_ref()),
            None => Ok(None),
        }
    }

    /// Move the cursor to a specific frame
    ///
    /// Seeking to the current frame does nothing. Seeking backward rewinds
    /// first. Without an index every frame up to the target is parsed and
    /// discarded; with one the reader jumps straight to the target.
    ///
    /// # Arguments
    ///
    /// * `frame_idx` - The frame index to seek to (0-based)
    ///
    /// # Returns
    ///
    /// The target frame's timestep, or `None` if the trajectory ends first
    pub fn seek_frame(&mut self, frame_idx: i64) -> Result<Option<i64>, DumpError> {
        if frame_idx < 0 {
            return Err(DumpError::InvalidSeekTarget(frame_idx));
        }
        if self.source.is_none() {
            return Err(DumpError::ClosedSource);
        }

        let target = frame_idx as usize;
        if let Some(frame) = &self.current {
            if frame.index == target {
                return Ok(Some(frame.timestep));
            }
        }

        if self.index.is_some() {
            return self.seek_indexed(target);
        }

        if target < self.frames_read {
            self.rewind()?;
        }

        while self.frames_read <= target {
            if self.advance()?.is_none() {
                return Ok(None);
            }
        }
        Ok(self.current.as_ref().map(|frame| frame.timestep))
    }

    /// Jump to a frame using the offset index
    fn seek_indexed(&mut self, target: usize) -> Result<Option<i64>, DumpError> {
        let (entry, indexed) = match &self.index {
            Some(index) => (index.get(target).copied(), index.len()),
            None => return Ok(None),
        };
        let source = self.source.as_mut().ok_or(DumpError::ClosedSource)?;

        let entry = match entry {
            Some(entry) => entry,
            None => {
                // Park at the end, as a linear scan past the last frame would
                source.seek(SeekFrom::End(0))?;
                self.parser.reset(0);
                self.frames_read = indexed;
                self.exhausted = true;
                self.failure = None;
                return Ok(None);
            }
        };

        // The marker line is the first line the parser reads, so its line
        // counter starts one before it
        source.seek(SeekFrom::Start(entry.offset))?;
        self.parser.reset(entry.line - 1);
        self.frames_read = target;
        self.exhausted = false;
        self.failure = None;
        self.advance()
    }

    /// Return to the start of the trajectory
    ///
    /// Clears the current frame, the end-of-trajectory state and any
    /// remembered malformed frame.
    pub fn rewind(&mut self) -> Result<(), DumpError> {
        let source = self.source.as_mut().ok_or(DumpError::ClosedSource)?;
        source.seek(SeekFrom::Start(0))?;
        self.parser.reset(0);
        self.current = None;
        self.frames_read = 0;
        self.exhausted = false;
        self.failure = None;
        Ok(())
    }

    /// Look up metadata or a column of the current frame
    ///
    /// Yields `Ok(None)` when no frame is current or the key is absent.
    pub fn extract(&self, key: &str) -> Result<Option<Value<'_>>, DumpError> {
        if self.source.is_none() {
            return Err(DumpError::ClosedSource);
        }
        Ok(self.current.as_ref().and_then(|frame| frame.extract(key)))
    }

    /// Release the source
    ///
    /// Every later cursor operation fails with [`DumpError::ClosedSource`].
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!("Closed dump trajectory after {} frames", self.frames_read);
        }
        self.current = None;
    }

    /// Whether [`DumpReader::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// The most recently parsed frame
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    /// Index of the most recently parsed frame
    pub fn current_frame_index(&self) -> Option<usize> {
        self.current.as_ref().map(|frame| frame.index)
    }

    /// Number of frames consumed since the start of the trajectory
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Total number of frames, known only when an index was built
    ///
    /// Counts the frames whose particle section is complete, so a trailing
    /// frame cut short by the end of the file is not included. Malformed
    /// frames are still counted; reading them fails as usual.
    pub fn num_frames(&self) -> Option<usize> {
        self.index.as_ref().map(FrameIndex::len)
    }

    /// The frame-offset index, if one was built
    pub fn index(&self) -> Option<&FrameIndex> {
        self.index.as_ref()
    }

    /// Iterate over the remaining frames as owned values
    ///
    /// The iterator starts from the current stream position. Any error,
    /// including [`DumpError::ClosedSource`], is yielded once and ends the
    /// iteration; the reader itself keeps reporting it.
    pub fn frames(&mut self) -> Frames<'_, R> {
        Frames {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over owned frames, created by [`DumpReader::frames`]
///
/// Each frame is a copy; the reader keeps its own as the current frame.
pub struct Frames<'a, R> {
    reader: &'a mut DumpReader<R>,

    /// Set after the end of the trajectory or the first error
    done: bool,
}

impl<R: BufRead + Seek> Iterator for Frames<'_, R> {
    type Item = Result<Frame, DumpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.advance() {
            Ok(Some(_)) => self.reader.current.clone().map(Ok),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: BufRead + Seek> FusedIterator for Frames<'_, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> DumpReader<Cursor<Vec<u8>>> {
        DumpReader::from_reader(Cursor::new(text.as_bytes().to_vec()))
    }

    const TWO_FRAMES: &str = "\
ITEM: TIMESTEP
0
ITEM: NUMBER OF ATOMS
3
ITEM: BOX BOUNDS pp pp ff
0 10
0 10
0 10
ITEM: ATOMS x y z
1 2 3
4 5 6
7 8 9
ITEM: TIMESTEP
100
ITEM: NUMBER OF ATOMS
3
ITEM: BOX BOUNDS pp pp ff
0 10
0 10
0 10
ITEM: ATOMS x y z radius
1 2 3 0.1
4 5 6 0.2
7 8 9 0.3
";

    #[test]
    fn marker_precedence() {
        assert_eq!(Marker::detect("ITEM: NUMBER OF ATOMS"), Some(Marker::Natoms));
        assert_eq!(Marker::detect("ITEM: ATOMS id x y z"), Some(Marker::Atoms));
        assert_eq!(Marker::detect("ITEM: BOX BOUNDS pp pp pp"), Some(Marker::Box));
        assert_eq!(Marker::detect("ITEM: TIMESTEP"), Some(Marker::Timestep));
        assert_eq!(Marker::detect("1 2 3"), None);
    }

    #[test]
    fn box_rows_and_boundary_flags() {
        let mut reader = reader(TWO_FRAMES);
        reader.advance().unwrap();
        let frame = reader.current_frame().unwrap();
        assert_eq!(frame.bounds.bounds, [[0.0, 10.0]; 3]);
        assert_eq!(frame.bounds.tilt, None);
        assert_eq!(frame.bounds.boundary, ["pp", "pp", "ff"]);
    }

    #[test]
    fn triclinic_box_records_tilt() {
        let text = "\
ITEM: TIMESTEP
5
ITEM: NUMBER OF ATOMS
0
ITEM: BOX BOUNDS xy xz yz pp pp pp
0 10 0.5
0 10 0
0 10 -0.5
ITEM: ATOMS x y z
";
        let mut reader = reader(text);
        assert_eq!(reader.advance().unwrap(), Some(5));
        let frame = reader.current_frame().unwrap();
        assert_eq!(frame.bounds.tilt, Some([0.5, 0.0, -0.5]));
        assert_eq!(frame.bounds.boundary, ["pp", "pp", "pp"]);
        assert_eq!(frame.natoms, 0);
    }

    #[test]
    fn schema_changes_between_frames() {
        let mut reader = reader(TWO_FRAMES);
        reader.advance().unwrap();
        assert_eq!(reader.extract("radius").unwrap(), None);
        reader.advance().unwrap();
        assert_eq!(
            reader.extract("radius").unwrap().and_then(|v| v.as_column()),
            Some(&[0.1, 0.2, 0.3][..])
        );
        reader.seek_frame(0).unwrap();
        assert_eq!(reader.extract("radius").unwrap(), None);
    }

    #[test]
    fn skips_lines_before_first_timestep() {
        let text = format!("# written by liggghts\nITEM: NUMBER OF ATOMS\n9\n{}", TWO_FRAMES);
        let mut reader = reader(&text);
        assert_eq!(reader.advance().unwrap(), Some(0));
        assert_eq!(reader.current_frame().unwrap().natoms, 3);
    }

    #[test]
    fn extra_tokens_are_ignored() {
        let text = "\
ITEM: TIMESTEP
1
ITEM: NUMBER OF ATOMS
1
ITEM: BOX BOUNDS pp pp pp
0 1
0 1
0 1
ITEM: ATOMS x y
0.5 0.25 99
";
        let mut reader = reader(text);
        reader.advance().unwrap();
        let frame = reader.current_frame().unwrap();
        assert_eq!(frame.column("x"), Some(&[0.5][..]));
        assert_eq!(frame.column("y"), Some(&[0.25][..]));
    }

    #[test]
    fn short_particle_row_is_malformed() {
        let text = TWO_FRAMES.replacen("4 5 6\n", "4 5\n", 1);
        let mut reader = reader(&text);
        match reader.advance() {
            Err(DumpError::MalformedFrame { frame, line, text, .. }) => {
                assert_eq!(frame, 0);
                assert_eq!(line, 11);
                assert_eq!(text, "4 5");
            }
            other => panic!("expected malformed frame, got {:?}", other),
        }
        assert!(reader.current_frame().is_none());
    }

    #[test]
    fn box_before_natoms_is_malformed() {
        let text = "ITEM: TIMESTEP\n0\nITEM: BOX BOUNDS pp pp pp\n0 1\n0 1\n0 1\n";
        let mut reader = reader(text);
        assert!(matches!(reader.advance(), Err(DumpError::MalformedFrame { .. })));
    }

    #[test]
    fn missing_box_is_malformed() {
        let text = "ITEM: TIMESTEP\n0\nITEM: NUMBER OF ATOMS\n1\nITEM: ATOMS x\n1.0\n";
        let mut reader = reader(text);
        assert!(matches!(reader.advance(), Err(DumpError::MalformedFrame { .. })));
    }

    #[test]
    fn truncated_frame_ends_trajectory() {
        let cut = TWO_FRAMES.rfind("7 8 9 0.3").unwrap();
        let mut reader = reader(&TWO_FRAMES[..cut]);
        assert_eq!(reader.advance().unwrap(), Some(0));
        assert_eq!(reader.advance().unwrap(), None);
        assert_eq!(reader.current_frame_index(), Some(0));

        // The index agrees with what advance can produce
        reader.build_index().unwrap();
        assert_eq!(reader.num_frames(), Some(1));
        assert_eq!(reader.seek_frame(1).unwrap(), None);
    }

    #[test]
    fn crlf_line_endings() {
        let text = TWO_FRAMES.replace('\n', "\r\n");
        let mut reader = reader(&text);
        assert_eq!(reader.advance().unwrap(), Some(0));
        assert_eq!(reader.advance().unwrap(), Some(100));
        assert_eq!(reader.advance().unwrap(), None);
    }

    #[test]
    fn iterator_yields_owned_frames() {
        let mut reader = reader(TWO_FRAMES);
        let frames: Vec<Frame> = reader.frames().collect::<Result<_, _>>().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].index, 1);
        assert_eq!(frames[1].timestep, 100);
        assert_eq!(reader.current_frame(), Some(&frames[1]));
    }

    #[test]
    fn iterator_stops_after_error() {
        let text = TWO_FRAMES.replacen("100", "abc", 1);
        let mut reader = reader(&text);
        let results: Vec<_> = reader.frames().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());

        // The broken frame is still reported, not mistaken for the end
        assert!(matches!(reader.advance(), Err(DumpError::MalformedFrame { frame: 1, .. })));
        assert!(matches!(reader.seek_frame(1), Err(DumpError::MalformedFrame { .. })));

        reader.rewind().unwrap();
        assert_eq!(reader.advance().unwrap(), Some(0));
    }

    #[test]
    fn iterator_on_closed_reader_reports_closed_source() {
        let mut reader = reader(TWO_FRAMES);
        reader.close();
        let mut frames = reader.frames();
        assert!(matches!(frames.next(), Some(Err(DumpError::ClosedSource))));
        assert!(frames.next().is_none());
    }

    #[test]
    fn huge_particle_count_does_not_preallocate() {
        let text = "\
ITEM: TIMESTEP
0
ITEM: NUMBER OF ATOMS
1000000000000000
ITEM: BOX BOUNDS pp pp pp
0 1
0 1
0 1
ITEM: ATOMS x y z
0.1 0.2 0.3
";
        let mut truncated = reader(text);
        assert_eq!(truncated.advance().unwrap(), None);
        assert!(truncated.current_frame().is_none());

        let mut broken = reader(&format!("{}0.4 0.5\n", text));
        assert!(matches!(broken.advance(), Err(DumpError::MalformedFrame { line: 11, .. })));
    }

    #[test]
    fn build_index_enables_frame_count() {
        let mut reader = reader(TWO_FRAMES);
        assert_eq!(reader.num_frames(), None);
        reader.build_index().unwrap();
        assert_eq!(reader.num_frames(), Some(2));
        assert_eq!(reader.seek_frame(1).unwrap(), Some(100));
        assert_eq!(reader.seek_frame(0).unwrap(), Some(0));
        assert_eq!(reader.seek_frame(2).unwrap(), None);
    }
}
