use crate::crs::Crs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions. Anything recoverable ends up in
/// [`Diagnostics`](crate::diagnostics::Diagnostics) instead.
#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("{input} has no coordinate reference system")]
    MissingCrs { input: &'static str },
    #[error("cannot reproject from {from} to {to}")]
    CrsMismatch { from: Crs, to: Crs },
    #[error("polygonize produced no polygons (no closed loops or broken noding)")]
    NoPolygonsProduced,
    #[error("no usable candidate regions left after building the base subdivision")]
    NoCandidateRegions,
    #[error("split at depth {depth} produced no geometry")]
    DegenerateSplit { depth: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error reading config '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),
}

pub type Result<T> = std::result::Result<T, PartitionError>;
