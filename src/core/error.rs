//! Error handling logic

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of one physical carrier (a rail, a flag, or half of an
/// entangled pair) inside a [`Register`](crate::simulation::Register).
///
/// The value is the bit position of the carrier in the register's basis
/// labels, so at most 64 carriers can be live at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QubitId(pub u32);

impl QubitId {
    pub(crate) fn mask(self) -> u64 {
        1u64 << self.0
    }
}

impl fmt::Display for QubitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Position of a node in the binary routing tree.
///
/// Level 0 holds the root router; level `height` holds the leaves. Children of
/// `(level, i)` are `(level + 1, 2i)` (left, address bit 0) and
/// `(level + 1, 2i + 1)` (right, address bit 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub level: u32,
    pub index: u64,
}

impl NodeId {
    /// The root router.
    pub const ROOT: NodeId = NodeId { level: 0, index: 0 };

    pub fn left(self) -> NodeId {
        NodeId { level: self.level + 1, index: self.index * 2 }
    }

    pub fn right(self) -> NodeId {
        NodeId { level: self.level + 1, index: self.index * 2 + 1 }
    }

    /// True when the node sits at the leaf level of a tree of `height`.
    pub fn is_leaf(self, height: u32) -> bool {
        self.level >= height
    }

    /// Offset of this node in a level-ordered (heap) layout of the tree.
    pub fn heap_offset(self) -> usize {
        ((1u64 << self.level) - 1 + self.index) as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node({}.{})", self.level, self.index)
    }
}

/// Why a link transfer could not deliver the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportFailureCause {
    /// Every distillation attempt on one rail failed its parity verification.
    DistillationExhausted { attempts: u32 },
    /// The delivered cell did not hold exactly one excitation.
    ArrivalCheck { excitations: u32 },
}

impl fmt::Display for TransportFailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailureCause::DistillationExhausted { attempts } => {
                write!(f, "distillation failed {} times", attempts)
            }
            TransportFailureCause::ArrivalCheck { excitations } => {
                write!(f, "arrival check saw {} excitations", excitations)
            }
        }
    }
}

/// Errors raised by the register, the protocol primitives and the controller.
///
/// Physical faults that the protocol is designed to catch surface here only
/// as `AddressInvalid` and `TransportFailure`; the query controller turns both
/// into abort decisions. Everything else is a usage or simulation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QramError {
    /// The address cell failed its conservation pre-check.
    #[error("address cell failed its conservation pre-check ({excitations} excitations)")]
    AddressInvalid { excitations: u32 },

    /// A link transfer failed verification; the bus content is destroyed.
    #[error("transport into {node} failed: {cause}")]
    TransportFailure { node: NodeId, cause: TransportFailureCause },

    /// A carrier was used that is not allocated in the register.
    #[error("carrier {0} is not allocated in this register")]
    UnknownQubit(QubitId),

    /// No free carrier slot is left.
    #[error("register exhausted: at most {max} carriers may be live")]
    RegisterExhausted { max: usize },

    /// An operation is inconsistent with the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// The amplitude state lost its normalisation.
    #[error("incoherent state: {message}")]
    Incoherence { message: String },

    /// A configuration value is out of range or could not be parsed.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A query does not fit the tree it was issued against.
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },
}
