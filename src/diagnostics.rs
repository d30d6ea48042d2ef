use crate::model::Label;
use std::fmt;

/// Relative area discrepancy above which a stage logs a warning
pub const AREA_WARN_RATIO: f64 = 1e-9;

pub fn area_discrepancy_is_significant(symdiff: f64, reference_area: f64) -> bool {
    symdiff > AREA_WARN_RATIO * reference_area.max(1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedSliver {
    /// Index in the base partition after absorption finished
    pub index: usize,
    pub area: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AbsorptionReport {
    pub polygons_in: usize,
    pub merges: usize,
    pub unresolved: Vec<UnresolvedSliver>,
    pub budget_exhausted: bool,
    /// `area(before_union XOR after_union)`
    pub area_symmetric_difference: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BisectReport {
    pub islands: usize,
    pub leaves: usize,
    /// Branches dropped at the depth ceiling
    pub depth_drops: usize,
    pub dropped_area: f64,
    /// Splits that returned a single piece; emitted as unlabeled leaves
    pub degenerate_leaves: usize,
    /// Points skipped because they carry no label
    pub unlabeled_points: usize,
    /// Labeled points lying exactly on a cut, so inside neither half
    pub points_on_cuts: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ImputeReport {
    pub imputed: usize,
    /// Partition indices still unlabeled after the sweep
    pub unlabeled: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelOutcome {
    /// `None` for the row of regions nobody could label
    pub label: Option<Label>,
    pub parts: usize,
    /// Last closing tolerance applied, `None` if the union was already good enough
    pub last_tolerance: Option<f64>,
    pub converged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidateReport {
    pub outcomes: Vec<LabelOutcome>,
    pub area_symmetric_difference: f64,
}

impl ConsolidateReport {
    pub fn unconverged(&self) -> impl Iterator<Item = &LabelOutcome> {
        self.outcomes.iter().filter(|o| !o.converged)
    }
}

/// Everything recoverable that went wrong (or nearly did) during a run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub absorption: AbsorptionReport,
    pub bisect: BisectReport,
    pub impute: ImputeReport,
    pub consolidate: ConsolidateReport,
}

impl Diagnostics {
    pub fn has_issues(&self) -> bool {
        !self.absorption.unresolved.is_empty()
            || self.absorption.budget_exhausted
            || self.bisect.depth_drops > 0
            || self.bisect.degenerate_leaves > 0
            || self.bisect.points_on_cuts > 0
            || !self.impute.unlabeled.is_empty()
            || self.consolidate.unconverged().next().is_some()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.absorption;
        writeln!(
            f,
            "Slivers: {} polygons in, {} merges, {} unresolved{}, area drift {:.3e}",
            a.polygons_in,
            a.merges,
            a.unresolved.len(),
            if a.budget_exhausted { " (step budget exhausted)" } else { "" },
            a.area_symmetric_difference
        )?;
        for s in &a.unresolved {
            writeln!(f, "  unresolved sliver #{} (area {:.3})", s.index, s.area)?;
        }

        let b = &self.bisect;
        writeln!(
            f,
            "Bisect: {} islands -> {} leaves, {} branches dropped at depth ceiling (area {:.3}), {} degenerate leaves, {} unlabeled points ignored, {} points on cut lines",
            b.islands,
            b.leaves,
            b.depth_drops,
            b.dropped_area,
            b.degenerate_leaves,
            b.unlabeled_points,
            b.points_on_cuts
        )?;

        let i = &self.impute;
        writeln!(
            f,
            "Impute: {} labels imputed, {} still unlabeled {:?}",
            i.imputed,
            i.unlabeled.len(),
            i.unlabeled
        )?;

        let c = &self.consolidate;
        writeln!(
            f,
            "Consolidate: {} labels, area drift {:.3e}",
            c.outcomes.len(),
            c.area_symmetric_difference
        )?;
        for o in c.unconverged() {
            writeln!(
                f,
                "  {} did not converge: {} parts at tolerance {:?}",
                o.label.as_ref().map_or("unlabeled", Label::as_str),
                o.parts,
                o.last_tolerance
            )?;
        }
        Ok(())
    }
}
