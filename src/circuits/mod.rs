// src/circuits/mod.rs

//! Defines structures for representing and building ordered sequences of
//! operations (`drqram::operations::Operation`).
//!
//! Router and transport steps are emitted as a `Circuit` first and executed
//! afterwards, so the exact gate order of a step can be inspected and printed.

use crate::core::QubitId;
use crate::operations::Operation;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// An ordered sequence of operations over a set of carriers.
#[derive(Clone, PartialEq, Default)]
pub struct Circuit {
    /// The carriers named by any operation in this circuit.
    qubits: BTreeSet<QubitId>,

    /// The ordered sequence of operations. Order is significant.
    operations: Vec<Operation>,
}

impl Circuit {
    /// Creates a new, empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation and records the carriers it involves.
    pub fn add_operation(&mut self, op: Operation) {
        self.qubits.extend(op.involved_qubits());
        self.operations.push(op);
    }

    pub fn add_operations<I>(&mut self, ops: I)
    where
        I: IntoIterator<Item = Operation>,
    {
        for op in ops {
            self.add_operation(op);
        }
    }

    /// Carriers touched by this circuit, in ascending order.
    pub fn qubits(&self) -> &BTreeSet<QubitId> {
        &self.qubits
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations that are not checkpoints.
    pub fn gate_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| !matches!(op, Operation::Checkpoint { .. }))
            .count()
    }
}

//-------------------------------------------------------------------------
// Circuit Builder
//-------------------------------------------------------------------------

/// A helper struct for constructing `Circuit` instances using method chaining.
#[derive(Default)]
pub struct CircuitBuilder {
    circuit: Circuit,
}

impl CircuitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single operation to the circuit being built.
    pub fn add_op(mut self, op: Operation) -> Self {
        self.circuit.add_operation(op);
        self
    }

    /// Adds multiple operations to the circuit being built.
    pub fn add_ops<I>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = Operation>,
    {
        self.circuit.add_operations(ops);
        self
    }

    pub fn build(self) -> Circuit {
        self.circuit
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operations.is_empty() {
            return writeln!(f, "drqram::Circuit[0 operations on 0 carriers]");
        }

        // --- Setup ---
        let ops = &self.operations;
        let num_ops = ops.len();

        let rows: Vec<QubitId> = self.qubits.iter().copied().collect();
        let num_rows = rows.len();
        let row_of: HashMap<QubitId, usize> = rows.iter().enumerate().map(|(i, q)| (*q, i)).collect();

        let max_label_width = rows.iter().map(|q| format!("{}", q).len()).max().unwrap_or(0);
        let label_padding = " ".repeat(max_label_width + 2);

        const GATE_WIDTH: usize = 7; // e.g., "───H───"
        const WIRE: &str = "───────";
        const V_WIRE: char = '│';
        const H_WIRE: char = '─';

        // op_grid[row][time] holds the gate or wire segment,
        // v_connect[row][time] the connector drawn below that row.
        let mut op_grid: Vec<Vec<String>> = vec![vec![WIRE.to_string(); num_ops]; num_rows];
        let mut v_connect: Vec<Vec<char>> = vec![vec![' '; num_ops]; num_rows];

        fn format_gate(symbol: &str) -> String {
            let slen = symbol.chars().count();
            if slen >= GATE_WIDTH {
                symbol.chars().take(GATE_WIDTH).collect()
            } else {
                let total_dashes = GATE_WIDTH - slen;
                let pre_dashes = total_dashes / 2;
                let post_dashes = total_dashes - pre_dashes;
                format!(
                    "{}{}{}",
                    H_WIRE.to_string().repeat(pre_dashes),
                    symbol,
                    H_WIRE.to_string().repeat(post_dashes)
                )
            }
        }

        // --- Populate Grids ---
        for (t, op) in ops.iter().enumerate() {
            let mut mark = |q: &QubitId, symbol: &str| {
                if let Some(r) = row_of.get(q) {
                    op_grid[*r][t] = format_gate(symbol);
                }
            };
            let symbols: Vec<(QubitId, &str)> = match op {
                Operation::Flip { target } => vec![(*target, "X")],
                Operation::PhaseFlip { target } => vec![(*target, "Z")],
                Operation::Hadamard { target } => vec![(*target, "H")],
                Operation::Reset { target } => vec![(*target, "|0>")],
                Operation::Measure { target, .. } => vec![(*target, "M")],
                Operation::MeasureExcitations { targets, .. } => targets.iter().map(|q| (*q, "N")).collect(),
                Operation::Cnot { control, target } => vec![(*control, "@"), (*target, "X")],
                Operation::Cz { control, target } => vec![(*control, "@"), (*target, "Z")],
                Operation::Toffoli { controls, target } => {
                    vec![(controls[0], "@"), (controls[1], "@"), (*target, "X")]
                }
                Operation::ControlledSwap { control, a, b } => vec![(*control, "@"), (*a, "×"), (*b, "×")],
                Operation::LogicalHadamard { rail0, rail1 } => vec![(*rail0, "H_L"), (*rail1, "H_L")],
                Operation::Checkpoint { .. } => Vec::new(),
            };
            for (q, symbol) in symbols {
                mark(&q, symbol);
            }

            // Multi-carrier gates get a vertical connector spanning their rows.
            let touched: Vec<usize> = op.involved_qubits().iter().filter_map(|q| row_of.get(q).copied()).collect();
            let joined = !matches!(op, Operation::MeasureExcitations { .. });
            if joined && touched.len() > 1 {
                let r_min = touched.iter().copied().min().unwrap_or(0);
                let r_max = touched.iter().copied().max().unwrap_or(0);
                for row_vec in v_connect.iter_mut().take(r_max).skip(r_min) {
                    row_vec[t] = V_WIRE;
                }
            }
        }

        // --- Format Output String ---
        writeln!(f, "drqram::Circuit[{} operations on {} carriers]", num_ops, num_rows)?;
        for r in 0..num_rows {
            let label = format!("{}: ", rows[r]);
            write!(f, "{:<width$}", label, width = max_label_width + 2)?;
            writeln!(f, "{}", op_grid[r].join(""))?;

            if r < num_rows - 1 {
                write!(f, "{}", label_padding)?;
                for t in 0..num_ops {
                    let connector = v_connect[r][t];
                    let padding_needed = GATE_WIDTH.saturating_sub(1);
                    let pre_pad = padding_needed / 2;
                    let post_pad = padding_needed - pre_pad;
                    write!(f, "{}{}{}", " ".repeat(pre_pad), connector, " ".repeat(post_pad))?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

// Keep the Debug impl delegating to Display
impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::FaultSite;

    #[test]
    fn test_builder_tracks_carriers() {
        let circuit = CircuitBuilder::new()
            .add_op(Operation::Cnot { control: QubitId(4), target: QubitId(1) })
            .add_op(Operation::Checkpoint { site: FaultSite::BeforeRouting })
            .add_op(Operation::Flip { target: QubitId(1) })
            .build();
        assert_eq!(circuit.len(), 3);
        assert_eq!(circuit.gate_count(), 2);
        assert_eq!(circuit.qubits().iter().copied().collect::<Vec<_>>(), vec![QubitId(1), QubitId(4)]);
    }

    #[test]
    fn test_display_draws_every_carrier() {
        let circuit = CircuitBuilder::new()
            .add_op(Operation::ControlledSwap { control: QubitId(0), a: QubitId(1), b: QubitId(2) })
            .build();
        let text = circuit.to_string();
        assert!(text.starts_with("drqram::Circuit[1 operations on 3 carriers]"));
        for label in ["q0:", "q1:", "q2:"] {
            assert!(text.contains(label), "missing row {}", label);
        }
    }
}
