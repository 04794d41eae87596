// src/tree/mod.rs

//! The routing tree: classical leaf payloads and per-node shared resources.

use crate::core::constants::MAX_TREE_HEIGHT;
use crate::core::{LogicalBit, NodeId, QramError};
use crate::router::FlagCarrier;
use crate::transport::{PairPool, PoolStats};
use parking_lot::{Mutex, MutexGuard};

/// Resources of one router node. Each sits behind its own lock so that a
/// query holds a node for one step only.
#[derive(Debug)]
struct NodeResources {
    flag: Mutex<FlagCarrier>,
    pool: Mutex<PairPool>,
}

/// A binary tree of `height` router levels over `2^height` one-bit leaves.
#[derive(Debug)]
pub struct QramTree {
    height: u32,
    payloads: Vec<LogicalBit>,
    /// Router nodes in heap order.
    nodes: Vec<NodeResources>,
}

impl QramTree {
    /// Builds a tree holding `payloads`, leaf 0 first.
    pub fn new(height: u32, payloads: Vec<LogicalBit>) -> Result<Self, QramError> {
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(QramError::InvalidConfig {
                message: format!("tree height must be in 1..={}, got {}", MAX_TREE_HEIGHT, height),
            });
        }
        let leaves = 1usize << height;
        if payloads.len() != leaves {
            return Err(QramError::InvalidConfig {
                message: format!("a tree of height {} needs {} payloads, got {}", height, leaves, payloads.len()),
            });
        }
        let mut nodes = Vec::with_capacity(leaves - 1);
        for level in 0..height {
            for index in 0..(1u64 << level) {
                let node = NodeId { level, index };
                nodes.push(NodeResources { flag: Mutex::new(FlagCarrier::new(node)), pool: Mutex::new(PairPool::new(node)) });
            }
        }
        Ok(Self { height, payloads, nodes })
    }

    /// Builds a tree from `0`/`1` values.
    pub fn from_bits(height: u32, bits: &[u8]) -> Result<Self, QramError> {
        let payloads = bits
            .iter()
            .map(|b| {
                LogicalBit::try_from(*b).map_err(|v| QramError::InvalidConfig {
                    message: format!("leaf payloads must be 0 or 1, got {}", v),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(height, payloads)
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn leaf_count(&self) -> usize {
        self.payloads.len()
    }

    /// Classical payload of leaf `index`.
    pub fn payload(&self, index: u64) -> Option<LogicalBit> {
        self.payloads.get(index as usize).copied()
    }

    /// Locks the flag resource of a router node.
    pub fn lock_flag(&self, node: NodeId) -> Result<MutexGuard<'_, FlagCarrier>, QramError> {
        Ok(self.resources(node)?.flag.lock())
    }

    /// Locks the pair pool of a router node.
    pub fn lock_pool(&self, node: NodeId) -> Result<MutexGuard<'_, PairPool>, QramError> {
        Ok(self.resources(node)?.pool.lock())
    }

    /// Pair accounting of a router node.
    pub fn pool_stats(&self, node: NodeId) -> Result<PoolStats, QramError> {
        Ok(self.lock_pool(node)?.stats())
    }

    /// Pair accounting summed over all nodes.
    pub fn total_pool_stats(&self) -> PoolStats {
        self.nodes.iter().fold(PoolStats::default(), |mut acc, n| {
            let s = n.pool.lock().stats();
            acc.raw_pairs += s.raw_pairs;
            acc.distillation_failures += s.distillation_failures;
            acc.deliveries += s.deliveries;
            acc.failures += s.failures;
            acc
        })
    }

    fn resources(&self, node: NodeId) -> Result<&NodeResources, QramError> {
        if node.is_leaf(self.height) || node.index >= (1u64 << node.level) {
            return Err(QramError::InvalidQuery { message: format!("{} is not a router node", node) });
        }
        self.nodes
            .get(node.heap_offset())
            .ok_or_else(|| QramError::InvalidQuery { message: format!("{} is outside the tree", node) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_count_checked() {
        assert!(QramTree::from_bits(2, &[0, 1, 1, 0]).is_ok());
        assert!(matches!(QramTree::from_bits(2, &[0, 1, 1]), Err(QramError::InvalidConfig { .. })));
        assert!(matches!(QramTree::from_bits(1, &[0, 2]), Err(QramError::InvalidConfig { .. })));
        assert!(matches!(QramTree::from_bits(0, &[0]), Err(QramError::InvalidConfig { .. })));
    }

    #[test]
    fn test_node_resources() -> Result<(), QramError> {
        let tree = QramTree::from_bits(2, &[0, 0, 1, 1])?;
        let node = NodeId::ROOT.right();
        assert_eq!(tree.lock_flag(node)?.node(), node);
        assert_eq!(tree.lock_pool(node)?.node(), node);
        assert!(tree.lock_flag(node.left()).is_err(), "leaves carry no router resources");
        assert_eq!(tree.payload(2), Some(LogicalBit::One));
        assert_eq!(tree.payload(4), None);
        Ok(())
    }
}
