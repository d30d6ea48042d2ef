mod io;

use anyhow::Result;
use clap::Parser;
use precinct::{Crs, PipelineConfig};
use std::path::PathBuf;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GeoJSON file with the street network (lines or polygon outlines)
    #[arg(long, env = "CLOVER_NETWORK")]
    network: PathBuf,

    /// GeoJSON polygons outlining the served area; the network is clipped
    /// to them and stitched onto their boundary
    #[arg(long, env = "CLOVER_AREA")]
    area: Option<PathBuf>,

    /// GeoJSON file with labeled address points
    #[arg(long, env = "CLOVER_POINTS")]
    points: PathBuf,

    /// Point property holding the district label
    #[arg(long, default_value = "label")]
    label_property: String,

    /// EPSG code of both inputs
    #[arg(long, default_value_t = 3857)]
    crs: u32,

    /// RON file overriding pipeline defaults
    #[arg(long, env = "CLOVER_CONFIG")]
    config: Option<PathBuf>,

    /// Where to write the district GeoJSON
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let crs = Crs(args.crs);

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let mut network = io::read_network(&args.network, crs)?;
    if let Some(path) = &args.area {
        network.area = Some(io::read_area(path)?);
    }
    let points = io::read_points(&args.points, &args.label_property, crs)?;

    let output = precinct::run(&network, &points, &config)?;
    io::write_districts(&args.output, &output.table)?;

    println!(
        "Wrote {} districts to {}",
        output.table.rows.len(),
        args.output.display()
    );
    println!("{}", output.diagnostics);
    if output.diagnostics.has_issues() {
        log::warn!("Run finished with unresolved issues, see report above");
    }

    Ok(())
}
