//! # Frame Data Store
//!
//! A [`Frame`] holds one snapshot of a granular trajectory: a fixed set of
//! metadata (timestep, particle count, simulation box) plus an open-ended
//! set of per-particle columns. The column set is taken from the dump's
//! `ITEM: ATOMS` header, so it can change from one frame to the next.
//!
//! ## Example
//!
//! ```no_run
//! use resgran::{DumpReader, Value};
//!
//! let mut reader = DumpReader::open("dump.liggghts").unwrap();
//! if let Some(frame) = reader.read_next().unwrap() {
//!     if let Some(Value::Column(radius)) = frame.extract("radius") {
//!         println!("first radius: {}", radius[0]);
//!     }
//! }
//! ```

use glam::DVec3; // Double precision vectors for particle positions
use indexmap::IndexMap; // Keeps columns in header order

/// Reserved key returning the frame's timestep from [`Frame::extract`]
pub const TIMESTEP_KEY: &str = "TIMESTEP";

/// Reserved key returning the frame's particle count from [`Frame::extract`]
pub const NATOMS_KEY: &str = "NATOMS";

/// Reserved key returning the frame's bounding box from [`Frame::extract`]
pub const BOX_KEY: &str = "BOX";

/// Simulation domain extent for a single frame
///
/// Each row of the dump's box section gives the lower and upper bound of
/// one axis. Triclinic dumps carry a third tilt factor per row.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    /// `[min, max]` pairs for the x, y and z axes
    pub bounds: [[f64; 2]; 3],

    /// Tilt factors `xy`, `xz`, `yz` for triclinic boxes
    pub tilt: Option<[f64; 3]>,

    /// Boundary flags from the box header (e.g. `pp pp ff`)
    pub boundary: Vec<String>,
}

impl BoundingBox {
    /// Create an orthogonal box from three `[min, max]` pairs
    pub fn new(bounds: [[f64; 2]; 3]) -> Self {
        Self {
            bounds,
            tilt: None,
            boundary: Vec::new(),
        }
    }

    /// Edge lengths along x, y and z
    pub fn lengths(&self) -> DVec3 {
        DVec3::new(
            self.bounds[0][1] - self.bounds[0][0],
            self.bounds[1][1] - self.bounds[1][0],
            self.bounds[2][1] - self.bounds[2][0],
        )
    }

    /// Volume of the box, ignoring tilt
    pub fn volume(&self) -> f64 {
        let lengths = self.lengths();
        lengths.x * lengths.y * lengths.z
    }
}

/// A value returned by [`Frame::extract`]
///
/// Reserved keys map to metadata; every other key names a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// Timestep of the frame (`TIMESTEP`)
    Timestep(i64),
    /// Number of particles in the frame (`NATOMS`)
    Natoms(usize),
    /// Simulation box (`BOX`)
    Box(&'a BoundingBox),
    /// A per-particle column
    Column(&'a [f64]),
}

impl<'a> Value<'a> {
    /// The column slice, if this value is a column
    pub fn as_column(&self) -> Option<&'a [f64]> {
        match self {
            Value::Column(values) => Some(values),
            _ => None,
        }
    }
}

/// One parsed simulation snapshot
///
/// Every column holds exactly `natoms` values; ordinal `i` refers to the
/// same particle in all columns of this frame. Nothing ties ordinals
/// together across frames unless the dump carries an `id` column.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 0-based position of this frame in the trajectory
    ///
    /// Assigned by the reader, not read from the file.
    pub index: usize,

    /// Simulation timestep of this snapshot
    pub timestep: i64,

    /// Number of particles in this frame
    pub natoms: usize,

    /// Simulation domain extent
    pub bounds: BoundingBox,

    /// Per-particle columns in header order
    columns: IndexMap<String, Vec<f64>>,
}

impl Frame {
    /// Assemble a frame from already validated parts
    ///
    /// Callers guarantee that every column has `natoms` entries.
    pub(crate) fn from_parts(
        index: usize,
        timestep: i64,
        natoms: usize,
        bounds: BoundingBox,
        columns: IndexMap<String, Vec<f64>>,
    ) -> Self {
        debug_assert!(columns.values().all(|c| c.len() == natoms));
        Self {
            index,
            timestep,
            natoms,
            bounds,
            columns,
        }
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Whether this frame carries a column with the given name
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names in the order they appeared in the header
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of columns in this frame
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Iterate over `(name, values)` pairs in header order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Particle positions built from the `x`, `y` and `z` columns
    ///
    /// # Returns
    ///
    /// `None` if any of the three coordinate columns is missing
    pub fn positions(&self) -> Option<Vec<DVec3>> {
        let x = self.column("x")?;
        let y = self.column("y")?;
        let z = self.column("z")?;

        Some(
            x.iter()
                .zip(y)
                .zip(z)
                .map(|((&x, &y), &z)| DVec3::new(x, y, z))
                .collect(),
        )
    }

    /// Look up metadata or a column by key
    ///
    /// `TIMESTEP`, `NATOMS` and `BOX` return metadata. Any other key is
    /// treated as a column name. Unknown keys yield `None`.
    pub fn extract(&self, key: &str) -> Option<Value<'_>> {
        match key {
            TIMESTEP_KEY => Some(Value::Timestep(self.timestep)),
            NATOMS_KEY => Some(Value::Natoms(self.natoms)),
            BOX_KEY => Some(Value::Box(&self.bounds)),
            _ => self.column(key).map(Value::Column),
        }
    }
}
