//! Symbolic input heap: objects materialized by lazy initialization.

use crate::expr::ExprRef;
use std::fmt;
use std::sync::Arc;

/// One lazily materialized object: its heap index, its declared class and
/// the symbolic integer that stands for its reference in heap constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeapNode {
    pub index: u32,
    pub type_name: Arc<str>,
    pub discriminator: ExprRef,
}

/// Materialized nodes in the order they were created on the current path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SymbolicInputHeap {
    nodes: Vec<HeapNode>,
}

impl SymbolicInputHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn push(&mut self, node: HeapNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[HeapNode] {
        &self.nodes
    }

    /// Nodes whose type satisfies `compatible`, in creation order. The
    /// caller decides compatibility since it owns the class hierarchy.
    pub fn nodes_of_type<'a>(
        &'a self,
        compatible: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = &'a HeapNode> + 'a {
        self.nodes.iter().filter(move |n| compatible(&n.type_name))
    }

    pub fn node_at(&self, index: u32) -> Option<&HeapNode> {
        self.nodes.iter().find(|n| n.index == index)
    }
}

impl fmt::Display for SymbolicInputHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "heap # = {}", self.nodes.len())?;
        for node in &self.nodes {
            write!(f, "\n  @{} : {} ({})", node.index, node.type_name, node.discriminator)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    fn node(index: u32, ty: &str) -> HeapNode {
        HeapNode {
            index,
            type_name: ty.into(),
            discriminator: Expr::int_var(format!("{}_{}", ty, index), -1, i32::MAX as i64),
        }
    }

    #[test]
    fn test_nodes_of_type_keeps_order() {
        let mut heap = SymbolicInputHeap::new();
        heap.push(node(3, "Node"));
        heap.push(node(5, "Leaf"));
        heap.push(node(7, "Node"));
        let found: Vec<u32> = heap.nodes_of_type(|t| t == "Node").map(|n| n.index).collect();
        assert_eq!(found, vec![3, 7]);
        assert_eq!(heap.node_at(5).map(|n| n.type_name.as_ref()), Some("Leaf"));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut parent = SymbolicInputHeap::new();
        parent.push(node(1, "Node"));
        let mut child = parent.clone();
        child.push(node(2, "Node"));
        assert_eq!(parent.len(), 1);
        assert_eq!(child.len(), 2);
    }
}
