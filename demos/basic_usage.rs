use resgran::DumpReader;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let path = std::env::args()
        .nth(1)
        .expect("Usage: cargo run --example basic_usage <dump file>");
    let mut reader = DumpReader::open(&path)?;

    // Count particles in the upper half of the box in each frame
    let mut frame_count = 0;
    let mut particles_in_top_half = 0;

    while let Some(frame) = reader.read_next()? {
        frame_count += 1;

        let [_, _, [zlo, zhi]] = frame.bounds.bounds;
        let middle = 0.5 * (zlo + zhi);
        if let Some(z) = frame.column("z") {
            particles_in_top_half += z.iter().filter(|&&z| z > middle).count();
        }
    }

    if frame_count > 0 {
        let avg_top_half = particles_in_top_half as f64 / frame_count as f64;
        println!("{} frames, average particles in top half: {:.1}", frame_count, avg_top_half);
    }

    Ok(())
}
