//! Execution planning.
//!
//! A plan is built once per shape configuration from the concrete input
//! descriptors and the node attributes. It carries everything an executor
//! needs: output descriptors, folded dims and strides, and the static work
//! partition. Executors never recompute shapes.

use std::ops::Range;

use log::trace;

use crate::ops::tensor::{Tensor, TensorDesc};

pub mod broadcast;
pub mod gather_tree;
pub mod matrix_nms;
pub mod pad;
pub mod reorder;

pub use broadcast::BroadcastPlan;
pub use gather_tree::GatherTreePlan;
pub use matrix_nms::MatrixNmsPlan;
pub use pad::{PadParams, PadPlan};
pub use reorder::ReorderPlan;

/// Whether a plan may be reused while input descriptors stay the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanValidity {
    /// Depends only on shapes and attributes
    Static,
    /// Depends on input tensor contents (runtime pads, target shape, mean)
    PerInvocation,
}

/// Inputs to plan construction that come from the runtime rather than the
/// node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanContext {
    /// Worker threads available to the executor
    pub threads: usize,
    /// Kernel configuration picked by the selector or the tuning cache
    pub config_index: usize,
}

impl PlanContext {
    pub fn new(threads: usize, config_index: usize) -> Self {
        Self {
            threads: threads.max(1),
            config_index,
        }
    }

    /// Number of chunks the work is split into. Each configuration step
    /// adds one chunk per worker.
    pub fn team_size(&self) -> usize {
        self.threads * (self.config_index + 1)
    }
}

impl Default for PlanContext {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

/// Splits `n` work items over `team` workers: the first `T1` workers get
/// `ceil(n / team)` items, the rest one item less.
pub fn balance211(n: usize, team: usize, tid: usize) -> Range<usize> {
    if team <= 1 || n == 0 {
        return if tid == 0 { 0..n } else { n..n };
    }
    let n1 = (n + team - 1) / team;
    let n2 = n1 - 1;
    let t1 = n - n2 * team;
    let my = if tid < t1 { n1 } else { n2 };
    let start = if tid <= t1 {
        tid * n1
    } else {
        t1 * n1 + (tid - t1) * n2
    };
    start..start + my
}

/// Static per-worker ranges over the work items of a plan. Ranges are
/// disjoint, ordered and cover `0..work_amount` without gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPartition {
    work_amount: usize,
    ranges: Vec<Range<usize>>,
}

impl WorkPartition {
    pub fn new(work_amount: usize, team: usize) -> Self {
        let team = team.max(1).min(work_amount.max(1));
        let ranges = (0..team)
            .map(|tid| balance211(work_amount, team, tid))
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>();
        trace!("Partitioned {} work items into {} ranges", work_amount, ranges.len());
        Self { work_amount, ranges }
    }

    /// Everything on one worker.
    pub fn single(work_amount: usize) -> Self {
        Self::new(work_amount, 1)
    }

    pub fn work_amount(&self) -> usize {
        self.work_amount
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Per-operation part of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanBody {
    Pad(PadPlan),
    PadReference(PadParams),
    Broadcast(BroadcastPlan),
    Reorder(ReorderPlan),
    MatrixNms(MatrixNmsPlan),
    GatherTree(GatherTreePlan),
}

/// Everything an executor needs for one shape configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    /// Input descriptors the plan was built for
    pub inputs: Vec<TensorDesc>,
    pub outputs: Vec<TensorDesc>,
    pub validity: PlanValidity,
    pub partition: WorkPartition,
    pub body: PlanBody,
}

impl ExecutionPlan {
    /// The single place deciding whether a new plan must be built.
    pub fn is_reusable_for(&self, inputs: &[&Tensor]) -> bool {
        self.validity == PlanValidity::Static
            && self.inputs.len() == inputs.len()
            && self.inputs.iter().zip(inputs).all(|(desc, t)| desc == t.desc())
    }
}

pub(crate) fn input_descs(inputs: &[&Tensor]) -> Vec<TensorDesc> {
    inputs.iter().map(|t| t.desc().clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::tensor::DataType;

    #[test]
    fn test_balance211_covers_range() {
        for n in [0usize, 1, 7, 10, 64] {
            for team in 1..6 {
                let mut next = 0;
                for tid in 0..team {
                    let r = balance211(n, team, tid);
                    assert_eq!(r.start, next);
                    next = r.end;
                }
                assert_eq!(next, n);
            }
        }
        // 10 over 4: 3, 3, 2, 2
        assert_eq!(balance211(10, 4, 0), 0..3);
        assert_eq!(balance211(10, 4, 1), 3..6);
        assert_eq!(balance211(10, 4, 2), 6..8);
        assert_eq!(balance211(10, 4, 3), 8..10);
    }

    #[test]
    fn test_partition_caps_team() {
        let p = WorkPartition::new(3, 8);
        assert_eq!(p.len(), 3);
        assert_eq!(p.work_amount(), 3);
        assert!(WorkPartition::new(0, 4).is_empty());
        assert_eq!(PlanContext::new(4, 1).team_size(), 8);
        assert_eq!(PlanContext::new(0, 0).threads, 1);
    }

    #[test]
    fn test_plan_reuse() {
        let t = Tensor::from_vec(&[2], vec![1.0f32, 2.0]).unwrap();
        let other = Tensor::from_vec(&[3], vec![1.0f32, 2.0, 3.0]).unwrap();
        let mut plan = ExecutionPlan {
            inputs: input_descs(&[&t]),
            outputs: vec![TensorDesc::plain(&[2], DataType::F32)],
            validity: PlanValidity::Static,
            partition: WorkPartition::single(1),
            body: PlanBody::GatherTree(GatherTreePlan::default()),
        };
        assert!(plan.is_reusable_for(&[&t]));
        assert!(!plan.is_reusable_for(&[&other]));
        plan.validity = PlanValidity::PerInvocation;
        assert!(!plan.is_reusable_for(&[&t]));
    }
}
