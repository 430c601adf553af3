use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

pub mod broadcast;
pub mod gather_tree;
pub mod matrix_nms;
pub mod pad;
pub mod registry;
pub mod reorder;
pub mod tensor;

pub use registry::{Operator, OperatorRegistry};
pub use tensor::{DataType, Tensor, TensorDesc};

use broadcast::BroadcastAttrs;
use matrix_nms::MatrixNmsAttrs;
use pad::PadAttrs;
use reorder::ReorderAttrs;

/// Operation kinds known to the shape-inference and kernel layers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    Serialize, Deserialize,
)]
pub enum OpKind {
    GatherTree,
    Pad,
    Broadcast,
    Reorder,
    MatrixNms,
}

/// Typed, immutable attributes of one node.
#[derive(Debug, Clone, PartialEq)]
pub enum OpAttributes {
    GatherTree,
    Pad(PadAttrs),
    Broadcast(BroadcastAttrs),
    Reorder(ReorderAttrs),
    MatrixNms(MatrixNmsAttrs),
}

impl OpAttributes {
    pub fn kind(&self) -> OpKind {
        match self {
            OpAttributes::GatherTree => OpKind::GatherTree,
            OpAttributes::Pad(_) => OpKind::Pad,
            OpAttributes::Broadcast(_) => OpKind::Broadcast,
            OpAttributes::Reorder(_) => OpKind::Reorder,
            OpAttributes::MatrixNms(_) => OpKind::MatrixNms,
        }
    }
}
