//! # resgran CLI Tool
//!
//! Opens a dump trajectory, prints a summary of every frame, and optionally
//! seeks to one frame and prints its columns.
//!
//! ```text
//! resgran <dump file> [frame]
//! ```
//!
//! Set `RUST_LOG=debug` to see per-frame parsing logs.

use resgran::DumpReaderBuilder;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("Usage: resgran <dump file> [frame]");
            return Ok(ExitCode::FAILURE);
        }
    };
    let target = args.next().map(|arg| arg.parse::<i64>()).transpose()?;

    if !Path::new(&path).exists() {
        eprintln!("File not found: {}", path);
        return Ok(ExitCode::FAILURE);
    }

    let start_time = Instant::now();

    // Index up front so the seek below is a direct jump
    let mut reader = DumpReaderBuilder::new(&path).with_index(true).build()?;

    println!("Dump trajectory: {}", path);
    if let Some(frames) = reader.num_frames() {
        println!("  Number of frames: {}", frames);
    }
    if let Some(index) = reader.index() {
        if let (Some(first), Some(last)) = (index.get(0), index.iter().last()) {
            println!("  Timesteps: {} to {}", first.timestep, last.timestep);
        }
    }

    let mut frame_count = 0;
    while let Some(frame) = reader.read_next()? {
        frame_count += 1;
        let columns: Vec<&str> = frame.column_names().collect();
        println!(
            "Frame {} (timestep {}): {} particles, box {:?}, columns [{}]",
            frame.index,
            frame.timestep,
            frame.natoms,
            frame.bounds.bounds,
            columns.join(" ")
        );
    }

    if let Some(target) = target {
        println!("\nSeeking to frame {}:", target);
        match reader.seek_frame(target)? {
            Some(timestep) => {
                println!("  Timestep: {}", timestep);
                if let Some(frame) = reader.current_frame() {
                    for (name, values) in frame.columns() {
                        println!("  {}: {:?}", name, &values[..values.len().min(5)]);
                    }
                }
            }
            None => println!("  Trajectory has only {} frames", reader.frames_read()),
        }
    }

    reader.close();

    let elapsed = start_time.elapsed();
    println!("\nRead {} frames in {:.2?}", frame_count, elapsed);
    let fps = frame_count as f64 / elapsed.as_secs_f64();
    println!("Performance: {:.1} frames/sec", fps);

    Ok(ExitCode::SUCCESS)
}
