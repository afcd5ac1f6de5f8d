//! The generator chain of the current path.
//!
//! Generators live in an arena indexed by their position on the path.
//! Backtracking truncates the arena, and every id carries the generation
//! it was created in so a stale id from an abandoned subtree never
//! resolves to its successor.

use crate::choice::{CgId, CgKind, ChoicePoint, HeapState, Site};
use crate::error::{VmError, VmResult};
use cortex_symbolic::PathCondition;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct SystemState {
    chain: Vec<ChoicePoint>,
    /// Registered by the last instruction, adopted when the transition ends.
    next: Option<ChoicePoint>,
    /// Set when the current path turned out infeasible.
    ignored: bool,
    generation: u32,
}

impl SystemState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The generator whose choice the current transition runs under.
    pub fn current(&self) -> Option<&ChoicePoint> {
        self.chain.last()
    }

    /// Root first.
    pub fn chain(&self) -> &[ChoicePoint] {
        &self.chain
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub fn get(&self, id: CgId) -> Option<&ChoicePoint> {
        self.chain
            .get(id.index())
            .filter(|cp| cp.id.generation == id.generation)
    }

    pub fn next_choice_generator(&self) -> Option<&ChoicePoint> {
        self.next.as_ref()
    }

    pub fn has_next_choice_generator(&self) -> bool {
        self.next.is_some()
    }

    /// Register the generator that ends the current transition. Refused
    /// when one is already pending.
    pub fn set_next_choice_generator(&mut self, site: Site, reason: &'static str, kind: CgKind) -> bool {
        if self.next.is_some() {
            return false;
        }
        self.generation += 1;
        let cp = ChoicePoint {
            id: CgId {
                index: self.chain.len() as u32,
                generation: self.generation,
            },
            prev: self.chain.last().map(|cp| cp.id),
            site,
            reason,
            kind,
        };
        debug!(cg = %cp, "choice generator registered");
        self.next = Some(cp);
        true
    }

    pub(crate) fn take_next(&mut self) -> Option<ChoicePoint> {
        self.next.take()
    }

    /// Append a generator taken from [`Self::take_next`].
    pub(crate) fn push(&mut self, cp: ChoicePoint) -> VmResult<()> {
        if cp.id.index() != self.chain.len() {
            return Err(VmError::Invariant(format!(
                "generator {} adopted at depth {}",
                cp.id,
                self.chain.len()
            )));
        }
        self.chain.push(cp);
        Ok(())
    }

    /// Drop everything above depth `len`, plus any pending registration.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.chain.truncate(len);
        self.next = None;
        self.ignored = false;
    }

    /// Resume the current generator with choice `index`.
    pub(crate) fn select(&mut self, index: usize) -> VmResult<()> {
        let cp = self
            .chain
            .last_mut()
            .ok_or_else(|| VmError::Invariant("select on empty chain".into()))?;
        if !cp.select(index) {
            return Err(VmError::Invariant(format!(
                "choice {} out of range for {}",
                index, cp
            )));
        }
        Ok(())
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn set_ignored(&mut self) {
        self.ignored = true;
    }

    /// Walk the `prev` links starting below `from`.
    pub fn previous_of(&self, from: CgId, pred: impl Fn(&ChoicePoint) -> bool) -> Option<&ChoicePoint> {
        let mut cursor = self.get(from).and_then(|cp| cp.prev);
        while let Some(id) = cursor {
            let cp = self.get(id)?;
            if pred(cp) {
                return Some(cp);
            }
            cursor = cp.prev;
        }
        None
    }

    /// Path condition committed by the nearest branch generator below `from`.
    pub fn inherited_path_condition(&self, from: CgId) -> PathCondition {
        self.previous_of(from, |cp| cp.path_condition().is_some())
            .and_then(|cp| cp.path_condition())
            .cloned()
            .unwrap_or_default()
    }

    /// Heap state committed by the nearest heap generator below `from`.
    pub fn inherited_heap_state(&self, from: CgId) -> HeapState {
        self.previous_of(from, |cp| cp.heap_state().is_some())
            .and_then(|cp| cp.heap_state())
            .cloned()
            .unwrap_or_default()
    }

    /// Path condition of the path so far.
    pub fn path_condition(&self) -> PathCondition {
        self.chain
            .iter()
            .rev()
            .find_map(|cp| cp.path_condition())
            .cloned()
            .unwrap_or_default()
    }

    /// Heap path condition and input heap of the path so far.
    pub fn heap_state(&self) -> HeapState {
        self.chain
            .iter()
            .rev()
            .find_map(|cp| cp.heap_state())
            .cloned()
            .unwrap_or_default()
    }

    /// Choice indices from the root.
    pub fn choice_trace(&self) -> Vec<usize> {
        self.chain.iter().filter_map(|cp| cp.cursor()).collect()
    }

    pub(crate) fn commit_path_condition(&mut self, pc: PathCondition) -> VmResult<()> {
        match self.chain.last_mut().map(|cp| &mut cp.kind) {
            Some(CgKind::Branch { committed, .. }) => {
                *committed = Some(pc);
                Ok(())
            }
            _ => Err(VmError::Invariant(
                "path condition committed outside a branch choice".into(),
            )),
        }
    }

    pub(crate) fn commit_heap_state(&mut self, state: HeapState) -> VmResult<()> {
        match self.chain.last_mut().map(|cp| &mut cp.kind) {
            Some(CgKind::Heap { committed, .. }) => {
                *committed = Some(state);
                Ok(())
            }
            _ => Err(VmError::Invariant(
                "heap state committed outside a heap choice".into(),
            )),
        }
    }
}
