use crate::base_regions::build_base_regions;
use crate::bisect::bisect;
use crate::config::PipelineConfig;
use crate::consolidate::consolidate;
use crate::diagnostics::Diagnostics;
use crate::error::{PartitionError, Result};
use crate::impute::impute_labels;
use crate::model::{DistrictTable, LineNetwork, PointTable};
use crate::noding::prepare_network;
use crate::palette::assign_colors;
use log::info;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: DistrictTable,
    pub diagnostics: Diagnostics,
}

/// Line network and labeled points in, one district polygon per label out.
pub fn run(
    network: &LineNetwork,
    points: &PointTable,
    config: &PipelineConfig,
) -> Result<PipelineOutput> {
    config.validate()?;
    if network.crs.is_none() {
        return Err(PartitionError::MissingCrs { input: "network" });
    }
    if points.crs.is_none() {
        return Err(PartitionError::MissingCrs { input: "points" });
    }

    let start = Instant::now();
    let mut diagnostics = Diagnostics::default();

    let segments = prepare_network(network, &config.network);
    let (islands, absorption) = build_base_regions(&segments, network.crs, &config.slivers)?;
    diagnostics.absorption = absorption;
    info!("Base regions ready in {:?}", start.elapsed());

    let mut points = points.clone();
    assign_colors(&mut points.points);

    let (mut leaves, bisect_report) = bisect(&islands, &points, &config.bisect)?;
    diagnostics.bisect = bisect_report;
    info!("Bisecting done in {:?}", start.elapsed());

    diagnostics.impute = impute_labels(&mut leaves, &config.impute);

    let (table, consolidate_report) = consolidate(&leaves, &config.consolidate);
    diagnostics.consolidate = consolidate_report;
    info!(
        "Pipeline finished in {:?}: {} districts",
        start.elapsed(),
        table.rows.len()
    );

    Ok(PipelineOutput { table, diagnostics })
}
