// src/core/cell.rs

use super::error::QubitId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two carriers of a dual-rail cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rail {
    /// Active for logical 1.
    Rail0,
    /// Active for logical 0.
    Rail1,
}

impl Rail {
    pub const BOTH: [Rail; 2] = [Rail::Rail0, Rail::Rail1];
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rail::Rail0 => write!(f, "rail0"),
            Rail::Rail1 => write!(f, "rail1"),
        }
    }
}

/// A logical bit value carried by a dual-rail cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalBit {
    Zero,
    One,
}

impl LogicalBit {
    /// The rail that is active when the cell holds this value.
    pub fn active_rail(self) -> Rail {
        match self {
            LogicalBit::Zero => Rail::Rail1,
            LogicalBit::One => Rail::Rail0,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            LogicalBit::Zero => 0,
            LogicalBit::One => 1,
        }
    }
}

impl From<bool> for LogicalBit {
    fn from(bit: bool) -> Self {
        if bit { LogicalBit::One } else { LogicalBit::Zero }
    }
}

impl TryFrom<u8> for LogicalBit {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LogicalBit::Zero),
            1 => Ok(LogicalBit::One),
            other => Err(other),
        }
    }
}

impl fmt::Display for LogicalBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// A dual-rail logical qubit: two physical carriers of which exactly one is
/// active in a fault-free state.
///
/// Cells are neither `Copy` nor `Clone`; routing and transport consume them
/// by value.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DualRailCell {
    rail0: QubitId,
    rail1: QubitId,
}

impl DualRailCell {
    pub(crate) fn new(rail0: QubitId, rail1: QubitId) -> Self {
        Self { rail0, rail1 }
    }

    pub fn rail0(&self) -> QubitId {
        self.rail0
    }

    pub fn rail1(&self) -> QubitId {
        self.rail1
    }

    pub fn rail(&self, rail: Rail) -> QubitId {
        match rail {
            Rail::Rail0 => self.rail0,
            Rail::Rail1 => self.rail1,
        }
    }

    /// Both carriers, `rail0` first.
    pub fn qubits(&self) -> [QubitId; 2] {
        [self.rail0, self.rail1]
    }
}

impl fmt::Display for DualRailCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell({}, {})", self.rail0, self.rail1)
    }
}

/// Classical readout of both rails of a cell.
///
/// `Erasure` and `Violation` are not logical values; they are the observable
/// signatures of loss and of duplicated excitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellReading {
    Logical(LogicalBit),
    /// Both rails inactive.
    Erasure,
    /// Both rails active.
    Violation,
}

impl CellReading {
    pub fn from_rails(rail0_active: bool, rail1_active: bool) -> Self {
        match (rail0_active, rail1_active) {
            (true, false) => CellReading::Logical(LogicalBit::One),
            (false, true) => CellReading::Logical(LogicalBit::Zero),
            (false, false) => CellReading::Erasure,
            (true, true) => CellReading::Violation,
        }
    }

    pub fn logical(&self) -> Option<LogicalBit> {
        match self {
            CellReading::Logical(bit) => Some(*bit),
            _ => None,
        }
    }

    /// Conservation invariant: exactly one rail active.
    pub fn is_conserved(&self) -> bool {
        matches!(self, CellReading::Logical(_))
    }
}

impl fmt::Display for CellReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellReading::Logical(bit) => write!(f, "logical {}", bit),
            CellReading::Erasure => write!(f, "erasure"),
            CellReading::Violation => write!(f, "violation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_from_rails() {
        assert_eq!(CellReading::from_rails(false, true), CellReading::Logical(LogicalBit::Zero));
        assert_eq!(CellReading::from_rails(true, false), CellReading::Logical(LogicalBit::One));
        assert_eq!(CellReading::from_rails(false, false), CellReading::Erasure);
        assert_eq!(CellReading::from_rails(true, true), CellReading::Violation);
    }

    #[test]
    fn test_active_rail_mapping() {
        assert_eq!(LogicalBit::Zero.active_rail(), Rail::Rail1);
        assert_eq!(LogicalBit::One.active_rail(), Rail::Rail0);
        assert_eq!(LogicalBit::try_from(2), Err(2));
    }
}
