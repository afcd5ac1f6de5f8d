//! Choice generators: the nondeterministic decisions of one path.

use crate::program::MethodId;
use crate::value::ThreadId;
use cortex_symbolic::{PathCondition, SymbolicInputHeap};
use std::fmt;

/// An ordered, finite set of choices with a cursor that is only set once
/// the generator has been resumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceGenerator<T> {
    choices: Vec<T>,
    cursor: Option<usize>,
}

impl<T> ChoiceGenerator<T> {
    pub fn new(choices: Vec<T>) -> Self {
        Self {
            choices,
            cursor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn choices(&self) -> &[T] {
        &self.choices
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The selected choice, `None` until resumed.
    pub fn current(&self) -> Option<&T> {
        self.cursor.and_then(|i| self.choices.get(i))
    }

    pub(crate) fn select(&mut self, index: usize) -> bool {
        if index < self.choices.len() {
            self.cursor = Some(index);
            true
        } else {
            false
        }
    }
}

impl ChoiceGenerator<usize> {
    /// Outcomes `0..n`.
    pub fn outcomes(n: usize) -> Self {
        Self::new((0..n).collect())
    }
}

/// Arena index of a generator plus the generation it was created in. A
/// stale id (one whose slot was truncated and reused) never resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CgId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl CgId {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for CgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// The instruction that registered a generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Site {
    pub thread: ThreadId,
    pub method: MethodId,
    pub pc: usize,
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.thread, self.method, self.pc)
    }
}

/// Heap path condition and input heap committed by a lazy initialization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HeapState {
    pub condition: PathCondition,
    pub heap: SymbolicInputHeap,
}

#[derive(Clone, Debug)]
pub enum CgKind {
    /// Which runnable thread runs next.
    Thread(ChoiceGenerator<ThreadId>),
    /// Outcome of a symbolic decision, with the path condition committed
    /// for the current outcome.
    Branch {
        outcomes: ChoiceGenerator<usize>,
        committed: Option<PathCondition>,
    },
    /// Alias, null or fresh object for a symbolic reference.
    Heap {
        outcomes: ChoiceGenerator<usize>,
        committed: Option<HeapState>,
    },
}

impl CgKind {
    pub fn threads(threads: Vec<ThreadId>) -> Self {
        CgKind::Thread(ChoiceGenerator::new(threads))
    }

    pub fn branch(n: usize) -> Self {
        CgKind::Branch {
            outcomes: ChoiceGenerator::outcomes(n),
            committed: None,
        }
    }

    pub fn heap(n: usize) -> Self {
        CgKind::Heap {
            outcomes: ChoiceGenerator::outcomes(n),
            committed: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CgKind::Thread(_) => "thread",
            CgKind::Branch { .. } => "branch",
            CgKind::Heap { .. } => "heap",
        }
    }
}

/// One link of the generator chain.
#[derive(Clone, Debug)]
pub struct ChoicePoint {
    pub id: CgId,
    pub prev: Option<CgId>,
    pub site: Site,
    pub reason: &'static str,
    pub kind: CgKind,
}

impl ChoicePoint {
    pub fn len(&self) -> usize {
        match &self.kind {
            CgKind::Thread(cg) => cg.len(),
            CgKind::Branch { outcomes, .. } | CgKind::Heap { outcomes, .. } => outcomes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cursor(&self) -> Option<usize> {
        match &self.kind {
            CgKind::Thread(cg) => cg.cursor(),
            CgKind::Branch { outcomes, .. } | CgKind::Heap { outcomes, .. } => outcomes.cursor(),
        }
    }

    pub fn is_thread(&self) -> bool {
        matches!(self.kind, CgKind::Thread(_))
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.kind, CgKind::Branch { .. })
    }

    pub fn is_heap(&self) -> bool {
        matches!(self.kind, CgKind::Heap { .. })
    }

    pub fn chosen_thread(&self) -> Option<ThreadId> {
        match &self.kind {
            CgKind::Thread(cg) => cg.current().copied(),
            _ => None,
        }
    }

    pub fn path_condition(&self) -> Option<&PathCondition> {
        match &self.kind {
            CgKind::Branch { committed, .. } => committed.as_ref(),
            _ => None,
        }
    }

    pub fn heap_state(&self) -> Option<&HeapState> {
        match &self.kind {
            CgKind::Heap { committed, .. } => committed.as_ref(),
            _ => None,
        }
    }

    /// Move the cursor and drop whatever the previous choice committed.
    pub(crate) fn select(&mut self, index: usize) -> bool {
        match &mut self.kind {
            CgKind::Thread(cg) => cg.select(index),
            CgKind::Branch {
                outcomes,
                committed,
            } => {
                *committed = None;
                outcomes.select(index)
            }
            CgKind::Heap {
                outcomes,
                committed,
            } => {
                *committed = None;
                outcomes.select(index)
            }
        }
    }
}

impl fmt::Display for ChoicePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cursor() {
            Some(c) => write!(f, "{} {} [{}/{}] at {}", self.kind.name(), self.reason, c, self.len(), self.site),
            None => write!(f, "{} {} [-/{}] at {}", self.kind.name(), self.reason, self.len(), self.site),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_unset_until_selected() {
        let mut cg = ChoiceGenerator::new(vec![ThreadId(0), ThreadId(2)]);
        assert_eq!(cg.current(), None);
        assert!(cg.select(1));
        assert_eq!(cg.current(), Some(&ThreadId(2)));
        assert!(!cg.select(2));
        assert_eq!(cg.cursor(), Some(1));
    }

    #[test]
    fn test_select_clears_committed_payload() {
        let mut cp = ChoicePoint {
            id: CgId {
                index: 0,
                generation: 1,
            },
            prev: None,
            site: Site {
                thread: ThreadId(0),
                method: MethodId(0),
                pc: 3,
            },
            reason: "branch",
            kind: CgKind::branch(2),
        };
        assert!(cp.select(0));
        if let CgKind::Branch { committed, .. } = &mut cp.kind {
            *committed = Some(PathCondition::new());
        }
        assert!(cp.path_condition().is_some());
        assert!(cp.select(1));
        assert!(cp.path_condition().is_none());
        assert_eq!(cp.to_string(), "branch branch [1/2] at T0 m0:3");
    }
}
