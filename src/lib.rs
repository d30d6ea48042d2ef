// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::cmp_null,
    clippy::op_ref
)]

//! Voting-district partitioning: carve a base subdivision out of a street
//! network, split it until every piece holds one label, fill the gaps from
//! neighbors and merge each label into as few polygons as possible.

pub mod base_regions;
pub mod bisect;
pub mod config;
pub mod consolidate;
pub mod crs;
pub mod diagnostics;
pub mod error;
pub mod geometry_utils;
pub mod impute;
pub mod model;
pub mod noding;
pub mod palette;
pub mod pipeline;
pub mod polygonize;
pub mod spatial_index;
pub mod stitch;

pub use config::PipelineConfig;
pub use crs::Crs;
pub use diagnostics::Diagnostics;
pub use error::{PartitionError, Result};
pub use model::{
    Color, DistrictRow, DistrictTable, Label, LabeledPoint, LineNetwork, Partition, PointTable,
    Region,
};
pub use pipeline::{PipelineOutput, run};
