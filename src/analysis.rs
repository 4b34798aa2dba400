//! # Granular Bed Analytics
//!
//! Physical measures computed from a single [`Frame`]: region selection,
//! bulk density, mass flow rate, bed height, angle of repose and the pair
//! correlation function. All of them read the `x`, `y`, `z` and `radius`
//! columns and treat particles as spheres.
//!
//! ## Example
//!
//! ```no_run
//! use glam::DVec3;
//! use resgran::analysis::{bulk_density, select, Region, Shape};
//! use resgran::DumpReader;
//!
//! let mut reader = DumpReader::open("dump.liggghts").unwrap();
//! let frame = reader.read_next().unwrap().unwrap();
//! let region = Region::new(DVec3::new(-1.0, -1.0, 0.0), DVec3::new(1.0, 1.0, 0.5));
//! let sel = select(frame, Some(&region)).unwrap();
//! let rho = bulk_density(frame, 2500.0, Shape::Box, &sel).unwrap();
//! println!("bulk density {:.1} kg/m^3", rho);
//! ```

use crate::frame::Frame;
use glam::DVec3;
use std::f64::consts::PI;
use thiserror::Error;

/// Possible errors when analysing a frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The frame lacks a column the measure needs
    #[error("frame has no {0:?} column")]
    MissingColumn(String),

    /// The selection contains no particles
    #[error("selection is empty")]
    EmptySelection,

    /// No particle is far enough from the cube faces
    #[error("no particle lies at least r_max = {0} inside every face of the cube")]
    NoInteriorParticles(f64),

    /// A parameter is out of range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Cartesian axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Name of the coordinate column for this axis
    pub fn column(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    fn component(self, v: DVec3) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }

    /// The two axes perpendicular to this one
    fn others(self) -> (Axis, Axis) {
        match self {
            Axis::X => (Axis::Y, Axis::Z),
            Axis::Y => (Axis::X, Axis::Z),
            Axis::Z => (Axis::X, Axis::Y),
        }
    }
}

/// Volume used to embed a selection when computing bulk density
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Axis-aligned bounding box of the selection
    Box,
    /// Cylinder along the given axis
    ///
    /// Its radius is the mean half-extent of the two other axes.
    Cylinder(Axis),
}

/// Axis-aligned region with open bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub min: DVec3,
    pub max: DVec3,
}

impl Region {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Region covering all of space
    pub fn everywhere() -> Self {
        Self::new(DVec3::splat(f64::NEG_INFINITY), DVec3::splat(f64::INFINITY))
    }

    /// Limit the region to an open interval along one axis
    pub fn with_axis(mut self, axis: Axis, min: f64, max: f64) -> Self {
        match axis {
            Axis::X => {
                self.min.x = min;
                self.max.x = max;
            }
            Axis::Y => {
                self.min.y = min;
                self.max.y = max;
            }
            Axis::Z => {
                self.min.z = min;
                self.max.z = max;
            }
        }
        self
    }

    /// Strict containment on every axis
    pub fn contains(&self, p: DVec3) -> bool {
        p.cmpgt(self.min).all() && p.cmplt(self.max).all()
    }
}

/// Reference point for [`flow_rate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowReference {
    /// Timestep of the reference frame
    pub timestep: i64,
    /// Particles selected in the reference frame
    pub count: usize,
}

/// Result of [`pair_correlation`]
#[derive(Debug, Clone, PartialEq)]
pub struct PairCorrelation {
    /// g(r) for each shell
    pub g: Vec<f64>,
    /// Mid radius of each shell
    pub radii: Vec<f64>,
    /// Particles used as shell centres
    pub reference_indices: Vec<usize>,
}

fn column<'a>(frame: &'a Frame, name: &str) -> Result<&'a [f64], AnalysisError> {
    frame
        .column(name)
        .ok_or_else(|| AnalysisError::MissingColumn(name.to_string()))
}

fn positions(frame: &Frame) -> Result<Vec<DVec3>, AnalysisError> {
    for axis in [Axis::X, Axis::Y, Axis::Z] {
        column(frame, axis.column())?;
    }
    frame
        .positions()
        .ok_or_else(|| AnalysisError::MissingColumn("x".to_string()))
}

/// Reject ordinals that do not name a particle of this frame
///
/// Selections are plain ordinals, so one taken from another frame can
/// point past the end of this one.
fn check_selection(frame: &Frame, sel: &[usize]) -> Result<(), AnalysisError> {
    match sel.iter().find(|&&i| i >= frame.natoms) {
        Some(i) => Err(AnalysisError::InvalidParameter(format!(
            "ordinal {} out of range for {} particles",
            i, frame.natoms
        ))),
        None => Ok(()),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn sphere_volume(radius: f64) -> f64 {
    4.0 / 3.0 * PI * radius.powi(3)
}

/// Select the particles inside a region
///
/// # Arguments
///
/// * `frame` - Frame to select from
/// * `region` - Region to test; `None` selects every particle
///
/// # Returns
///
/// Particle ordinals in ascending order
pub fn select(frame: &Frame, region: Option<&Region>) -> Result<Vec<usize>, AnalysisError> {
    let region = match region {
        Some(region) => region,
        None => return Ok((0..frame.natoms).collect()),
    };

    Ok(positions(frame)?
        .into_iter()
        .enumerate()
        .filter(|(_, p)| region.contains(*p))
        .map(|(i, _)| i)
        .collect())
}

/// Bulk density of a selection
///
/// The mass of the selected spheres divided by the volume of the shape
/// embedding them.
///
/// # Arguments
///
/// * `true_density` - Density of the particle material
/// * `shape` - Shape used to approximate the occupied volume
/// * `sel` - Particle ordinals, as returned by [`select`]
pub fn bulk_density(
    frame: &Frame,
    true_density: f64,
    shape: Shape,
    sel: &[usize],
) -> Result<f64, AnalysisError> {
    if sel.is_empty() {
        return Err(AnalysisError::EmptySelection);
    }
    check_selection(frame, sel)?;
    let positions = positions(frame)?;
    let radius = column(frame, "radius")?;

    let (min, max) = sel.iter().map(|&i| positions[i]).fold(
        (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
        |(min, max), p| (min.min(p), max.max(p)),
    );
    let extent = max - min;

    let volume = match shape {
        Shape::Box => extent.x * extent.y * extent.z,
        Shape::Cylinder(axis) => {
            let (a, b) = axis.others();
            let cylinder_radius = 0.25 * a.component(extent) + 0.25 * b.component(extent);
            PI * cylinder_radius.powi(2) * axis.component(extent)
        }
    };
    if volume <= 0.0 {
        return Err(AnalysisError::InvalidParameter(
            "selection spans no volume".to_string(),
        ));
    }

    let mass: f64 = sel.iter().map(|&i| true_density * sphere_volume(radius[i])).sum();
    Ok(mass / volume)
}

/// Mass flow rate through a selection
///
/// Computed from the change in the number of selected particles since a
/// reference frame, using the mean radius of the current selection.
/// Particles leaving the selection give a positive rate.
///
/// # Arguments
///
/// * `true_density` - Density of the particle material
/// * `reference` - Timestep and selected count of the reference frame
/// * `sel` - Particle ordinals selected in this frame
/// * `dt` - Simulation time per timestep
pub fn flow_rate(
    frame: &Frame,
    true_density: f64,
    reference: FlowReference,
    sel: &[usize],
    dt: f64,
) -> Result<f64, AnalysisError> {
    if dt <= 0.0 {
        return Err(AnalysisError::InvalidParameter(format!("dt must be positive, got {}", dt)));
    }
    if frame.timestep == reference.timestep {
        return Err(AnalysisError::InvalidParameter(
            "frame and reference share a timestep".to_string(),
        ));
    }

    check_selection(frame, sel)?;
    let radius = column(frame, "radius")?;
    let mean_radius = mean(sel.iter().map(|&i| radius[i])).ok_or(AnalysisError::EmptySelection)?;

    let delta = sel.len() as f64 - reference.count as f64;
    let mass = true_density * delta * sphere_volume(mean_radius);
    let elapsed = (frame.timestep - reference.timestep) as f64 * dt;
    Ok(-mass / elapsed)
}

/// Mean height of the top layer along an axis
///
/// Averages the coordinates within 1% of the highest particle.
pub fn bed_height(frame: &Frame, axis: Axis) -> Result<f64, AnalysisError> {
    let values = column(frame, axis.column())?;
    if values.is_empty() {
        return Err(AnalysisError::EmptySelection);
    }
    let top = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let (lo, hi) = (top * 0.99, top * 1.01);
    let (lo, hi) = (lo.min(hi), lo.max(hi));
    mean(values.iter().copied().filter(|v| (lo..=hi).contains(v)))
        .ok_or(AnalysisError::EmptySelection)
}

/// Angle of repose of a heap in a cylindrical container, in radians
///
/// The heap height is the highest particle minus the mean height of the
/// top 10% band of particles touching the wall. The container spans
/// `[-lx, lx] x [-ly, ly]` in the horizontal plane. Returns 0 when no
/// particle touches the wall.
pub fn angle_of_repose(frame: &Frame, lx: f64, ly: f64) -> Result<f64, AnalysisError> {
    if lx <= 0.0 || ly <= 0.0 {
        return Err(AnalysisError::InvalidParameter(format!(
            "container half-widths must be positive, got {} and {}",
            lx, ly
        )));
    }

    let positions = positions(frame)?;
    let radius = column(frame, "radius")?;
    let r = mean(radius.iter().copied()).ok_or(AnalysisError::EmptySelection)?;
    let h_max = positions.iter().map(|p| p.z).fold(f64::NEG_INFINITY, f64::max);

    let wall = (0.5 * (lx + ly) - r).powi(2);
    let wall_z: Vec<f64> = positions
        .iter()
        .filter(|p| p.x * p.x + p.y * p.y >= wall)
        .map(|p| p.z)
        .collect();
    if wall_z.is_empty() {
        return Ok(0.0);
    }

    let zm = wall_z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = ((zm * 0.9).min(zm), (zm * 0.9).max(zm));
    let rim = mean(wall_z.into_iter().filter(|z| (lo..=hi).contains(z)))
        .ok_or(AnalysisError::EmptySelection)?;

    Ok(((h_max - rim) / lx).atan())
}

/// Three-dimensional pair correlation function g(r)
///
/// Only particles whose shell of radius `r_max` fits entirely inside the
/// cube serve as reference particles, so no edge correction is needed.
/// Positions are shifted so that their minimum sits at the origin.
///
/// # Arguments
///
/// * `positions` - Particle centres
/// * `side` - Edge length of the cubic domain
/// * `r_max` - Outer radius of the largest shell
/// * `dr` - Shell thickness
pub fn pair_correlation(
    positions: &[DVec3],
    side: f64,
    r_max: f64,
    dr: f64,
) -> Result<PairCorrelation, AnalysisError> {
    if side <= 0.0 || r_max <= 0.0 || dr <= 0.0 {
        return Err(AnalysisError::InvalidParameter(format!(
            "side, r_max and dr must be positive, got {}, {}, {}",
            side, r_max, dr
        )));
    }

    let origin = positions
        .iter()
        .fold(DVec3::splat(f64::INFINITY), |min, p| min.min(*p));
    let shifted: Vec<DVec3> = positions.iter().map(|p| *p - origin).collect();

    let interior = Region::new(DVec3::splat(r_max), DVec3::splat(side - r_max));
    let reference_indices: Vec<usize> = shifted
        .iter()
        .enumerate()
        .filter(|(_, p)| interior.contains(**p))
        .map(|(i, _)| i)
        .collect();
    if reference_indices.is_empty() {
        return Err(AnalysisError::NoInteriorParticles(r_max));
    }

    let num_edges = ((r_max + 1.1 * dr) / dr).ceil() as usize;
    let edges: Vec<f64> = (0..num_edges).map(|k| k as f64 * dr).collect();
    let num_bins = num_edges - 1;
    let number_density = positions.len() as f64 / side.powi(3);

    let mut counts = vec![0.0; num_bins];
    for &p in &reference_indices {
        for (j, q) in shifted.iter().enumerate() {
            if j == p {
                continue;
            }
            let d = shifted[p].distance(*q);
            if d > edges[num_bins] {
                continue;
            }
            // The last bin is closed on the right
            let bin = ((d / dr) as usize).min(num_bins - 1);
            counts[bin] += 1.0;
        }
    }

    let n_ref = reference_indices.len() as f64;
    let (g, radii) = (0..num_bins)
        .map(|i| {
            let (inner, outer) = (edges[i], edges[i + 1]);
            let shell = 4.0 / 3.0 * PI * (outer.powi(3) - inner.powi(3));
            (counts[i] / number_density / n_ref / shell, 0.5 * (inner + outer))
        })
        .unzip();

    Ok(PairCorrelation {
        g,
        radii,
        reference_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BoundingBox;
    use indexmap::IndexMap;

    fn frame(timestep: i64, columns: &[(&str, &[f64])]) -> Frame {
        let natoms = columns.first().map_or(0, |(_, values)| values.len());
        let columns: IndexMap<String, Vec<f64>> = columns
            .iter()
            .map(|(name, values)| (name.to_string(), values.to_vec()))
            .collect();
        Frame::from_parts(0, timestep, natoms, BoundingBox::new([[0.0, 10.0]; 3]), columns)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn select_uses_open_bounds() {
        let f = frame(
            0,
            &[
                ("x", &[0.0, 0.5, 1.0]),
                ("y", &[0.5, 0.5, 0.5]),
                ("z", &[0.5, 0.5, 0.5]),
            ],
        );
        let region = Region::new(DVec3::ZERO, DVec3::ONE);
        assert_eq!(select(&f, Some(&region)).unwrap(), vec![1]);
        assert_eq!(select(&f, None).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn select_all_needs_no_coordinates() {
        let f = frame(0, &[("radius", &[1.0, 1.0])]);
        assert_eq!(select(&f, None).unwrap(), vec![0, 1]);
        assert_eq!(
            select(&f, Some(&Region::everywhere())),
            Err(AnalysisError::MissingColumn("x".to_string()))
        );
    }

    #[test]
    fn density_in_box() {
        let f = frame(
            0,
            &[
                ("x", &[0.0, 2.0]),
                ("y", &[0.0, 2.0]),
                ("z", &[0.0, 2.0]),
                ("radius", &[0.5, 0.5]),
            ],
        );
        let rho = bulk_density(&f, 3.0, Shape::Box, &[0, 1]).unwrap();
        assert!(approx(rho, 2.0 * 3.0 * sphere_volume(0.5) / 8.0));
    }

    #[test]
    fn density_in_cylinder() {
        let f = frame(
            0,
            &[
                ("x", &[0.0, 2.0]),
                ("y", &[0.0, 2.0]),
                ("z", &[0.0, 4.0]),
                ("radius", &[0.5, 0.5]),
            ],
        );
        let rho = bulk_density(&f, 1.0, Shape::Cylinder(Axis::Z), &[0, 1]).unwrap();
        let volume = PI * 1.0 * 4.0;
        assert!(approx(rho, 2.0 * sphere_volume(0.5) / volume));
    }

    #[test]
    fn density_of_empty_selection() {
        let f = frame(0, &[("x", &[0.0]), ("y", &[0.0]), ("z", &[0.0]), ("radius", &[1.0])]);
        assert_eq!(
            bulk_density(&f, 1.0, Shape::Box, &[]),
            Err(AnalysisError::EmptySelection)
        );
    }

    #[test]
    fn flow_from_particle_loss() {
        let f = frame(1000, &[("radius", &[0.5, 0.5, 0.5])]);
        let reference = FlowReference {
            timestep: 0,
            count: 1,
        };
        let rate = flow_rate(&f, 2.0, reference, &[0, 1, 2], 1e-4).unwrap();
        assert!(approx(rate, -20.0 * PI / 3.0));
    }

    #[test]
    fn density_rejects_selection_from_larger_frame() {
        let larger = frame(0, &[("x", &[0.5; 3]), ("y", &[0.5; 3]), ("z", &[0.5; 3])]);
        let sel = select(&larger, None).unwrap();

        let f = frame(
            100,
            &[
                ("x", &[0.0, 2.0]),
                ("y", &[0.0, 2.0]),
                ("z", &[0.0, 2.0]),
                ("radius", &[0.5, 0.5]),
            ],
        );
        assert_eq!(
            bulk_density(&f, 1.0, Shape::Box, &sel),
            Err(AnalysisError::InvalidParameter(
                "ordinal 2 out of range for 2 particles".to_string()
            ))
        );
    }

    #[test]
    fn flow_rejects_selection_from_larger_frame() {
        let f = frame(1000, &[("radius", &[0.5, 0.5])]);
        let reference = FlowReference {
            timestep: 0,
            count: 3,
        };
        assert!(matches!(
            flow_rate(&f, 1.0, reference, &[0, 1, 2], 1e-4),
            Err(AnalysisError::InvalidParameter(_))
        ));
    }

    #[test]
    fn flow_needs_elapsed_time() {
        let f = frame(10, &[("radius", &[0.5])]);
        let reference = FlowReference {
            timestep: 10,
            count: 0,
        };
        assert!(matches!(
            flow_rate(&f, 1.0, reference, &[0], 1e-4),
            Err(AnalysisError::InvalidParameter(_))
        ));
    }

    #[test]
    fn height_of_top_layer() {
        let f = frame(0, &[("z", &[1.0, 9.95, 10.0, 10.05, 5.0])]);
        let h = bed_height(&f, Axis::Z).unwrap();
        assert!(approx(h, (9.95 + 10.0 + 10.05) / 3.0));
    }

    #[test]
    fn repose_angle_from_wall_band() {
        // Two wall particles at the rim, one peak particle at the centre
        let f = frame(
            0,
            &[
                ("x", &[1.0, -1.0, 0.0]),
                ("y", &[0.0, 0.0, 0.0]),
                ("z", &[1.0, 1.0, 2.0]),
                ("radius", &[0.1, 0.1, 0.1]),
            ],
        );
        let angle = angle_of_repose(&f, 1.0, 1.0).unwrap();
        assert!(approx(angle, (1.0f64).atan()));
    }

    #[test]
    fn repose_angle_without_wall_particles() {
        let f = frame(
            0,
            &[("x", &[0.0]), ("y", &[0.0]), ("z", &[1.0]), ("radius", &[0.1])],
        );
        assert_eq!(angle_of_repose(&f, 1.0, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn pair_correlation_shells() {
        let positions = [
            DVec3::ZERO,
            DVec3::new(5.0, 5.0, 5.0),
            DVec3::new(4.0, 5.0, 5.0),
            DVec3::new(6.0, 5.0, 5.0),
        ];
        let result = pair_correlation(&positions, 10.0, 2.0, 0.5).unwrap();

        assert_eq!(result.reference_indices, vec![1, 2, 3]);
        assert_eq!(result.radii, vec![0.25, 0.75, 1.25, 1.75, 2.25]);

        let density = 4.0 / 1000.0;
        let shell = |inner: f64, outer: f64| 4.0 / 3.0 * PI * (outer.powi(3) - inner.powi(3));
        assert_eq!(result.g[0], 0.0);
        assert!(approx(result.g[2], 4.0 / density / 3.0 / shell(1.0, 1.5)));
        assert!(approx(result.g[4], 2.0 / density / 3.0 / shell(2.0, 2.5)));
    }

    #[test]
    fn pair_correlation_needs_interior_particles() {
        let positions = [DVec3::ZERO, DVec3::ONE];
        assert_eq!(
            pair_correlation(&positions, 2.0, 1.5, 0.5),
            Err(AnalysisError::NoInteriorParticles(1.5))
        );
    }
}
