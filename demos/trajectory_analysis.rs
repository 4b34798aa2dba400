use resgran::analysis::{bed_height, bulk_density, flow_rate, select, Axis, FlowReference, Region, Shape};
use resgran::DumpReaderBuilder;
use std::error::Error;
use std::time::Instant;

/// Particle material density (kg/m^3)
const TRUE_DENSITY: f64 = 2500.0;

/// Simulation time per timestep (s)
const DT: f64 = 1e-4;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .expect("Usage: cargo run --example trajectory_analysis <dump file>");

    let start = Instant::now();
    let mut reader = DumpReaderBuilder::new(&path).build()?;

    let mut reference: Option<FlowReference> = None;
    while let Some(frame) = reader.read_next()? {
        // Everything above the bottom tenth of the box counts as the bed
        let [_, _, [zlo, zhi]] = frame.bounds.bounds;
        let bed = Region::everywhere().with_axis(Axis::Z, zlo + 0.1 * (zhi - zlo), zhi);
        let sel = select(frame, Some(&bed))?;

        let height = bed_height(frame, Axis::Z)?;
        let density = bulk_density(frame, TRUE_DENSITY, Shape::Cylinder(Axis::Z), &sel).ok();

        let flow = match reference {
            Some(reference) => Some(flow_rate(frame, TRUE_DENSITY, reference, &sel, DT)?),
            None => None,
        };
        reference = Some(FlowReference {
            timestep: frame.timestep,
            count: sel.len(),
        });

        println!(
            "timestep {:>8}: height {:.4}, bulk density {:?}, flow {:?}",
            frame.timestep, height, density, flow
        );
    }

    println!("Analysed {} frames in {:.2?}", reader.frames_read(), start.elapsed());
    Ok(())
}
