//! # resgran - Rust Granular Trajectory Library
//!
//! `resgran` reads the text dump trajectories written by DEM codes such as
//! LIGGGHTS and LAMMPS, and computes bulk measures of granular beds from
//! the particle data in each frame.
//!
//! ## Features
//!
//! - Streaming dump reader that holds one frame in memory at a time
//! - Per-frame column sets: columns may appear or disappear between frames
//! - Forward iteration, rewind, and random access by frame index
//! - Optional memory-mapped frame-offset index for constant-time seeks
//! - Region selection, bulk density, flow rate, bed height, angle of
//!   repose and pair correlation (`analysis` feature)
//!
//! ## Example
//!
//! ```no_run
//! use resgran::DumpReader;
//!
//! let mut reader = DumpReader::open("dump.liggghts").unwrap();
//!
//! // Iterate through all frames as owned values
//! for frame_result in reader.frames() {
//!     let frame = frame_result.unwrap();
//!     println!("Frame timestep: {}", frame.timestep);
//!     println!("Contains {} particles", frame.natoms);
//! }
//!
//! // Jump back to an earlier frame and read one of its columns
//! reader.seek_frame(0).unwrap();
//! if let Some(radius) = reader.extract("radius").unwrap() {
//!     println!("{:?}", radius);
//! }
//! ```

#[cfg(feature = "dump")]
pub use dump::{DumpError, DumpReader, DumpReaderBuilder};
#[cfg(feature = "dump")]
pub use frame::{BoundingBox, Frame, Value};
#[cfg(feature = "dump")]
pub use index::{FrameIndex, FrameOffset};

#[cfg(feature = "dump")]
pub mod dump;
#[cfg(feature = "dump")]
pub mod frame;
#[cfg(feature = "dump")]
pub mod index;

#[cfg(feature = "analysis")]
pub mod analysis;
