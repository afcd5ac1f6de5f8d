//! Heap objects and the heap itself.
//!
//! Objects are shared between snapshots through `Arc` and copied on first
//! write, so taking a snapshot of the heap costs one pointer per object.

use crate::error::{VmError, VmResult};
use crate::program::{ClassId, ClassInfo, TypeDesc};
use crate::value::{ObjRef, Slot, ThreadId};
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Object(ClassId),
    Array(TypeDesc),
    /// The static fields of a class.
    Statics(ClassId),
}

/// Monitor state of an object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Monitor {
    pub owner: Option<ThreadId>,
    pub count: u32,
}

/// A heap object, array or statics record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ElementInfo {
    pub kind: ElementKind,
    pub slots: Vec<Slot>,
    pub immutable: bool,
    pub monitor: Monitor,
    /// Detail message of exception objects.
    pub message: Option<Arc<str>>,
    /// Threads that committed an access, creator first.
    ref_tids: SmallVec<[ThreadId; 4]>,
    /// Reachable through a static field, so every thread can reach it.
    static_reachable: bool,
    /// Per-slot intersection of the locks held on every committed access.
    locksets: Vec<Option<SmallVec<[ObjRef; 2]>>>,
}

impl ElementInfo {
    fn new(kind: ElementKind, slots: Vec<Slot>, immutable: bool, creator: Option<ThreadId>) -> Self {
        let locksets = match kind {
            ElementKind::Array(_) => Vec::new(),
            _ => vec![None; slots.len()],
        };
        Self {
            kind,
            slots,
            immutable,
            monitor: Monitor::default(),
            message: None,
            ref_tids: creator.into_iter().collect(),
            static_reachable: false,
            locksets,
        }
    }

    /// Class of objects and statics records.
    pub fn class(&self) -> Option<ClassId> {
        match self.kind {
            ElementKind::Object(id) | ElementKind::Statics(id) => Some(id),
            ElementKind::Array(_) => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ElementKind::Array(_))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> VmResult<&Slot> {
        self.slots
            .get(index)
            .ok_or_else(|| VmError::Invariant(format!("slot {} out of range", index)))
    }

    pub fn set_slot(&mut self, index: usize, slot: Slot) -> VmResult<()> {
        let target = self
            .slots
            .get_mut(index)
            .ok_or_else(|| VmError::Invariant(format!("slot {} out of range", index)))?;
        *target = slot;
        Ok(())
    }

    pub fn can_lock(&self, tid: ThreadId) -> bool {
        self.monitor.owner.map_or(true, |owner| owner == tid)
    }

    pub fn referencing_threads(&self) -> &[ThreadId] {
        &self.ref_tids
    }

    /// Statics records and everything reachable from them.
    pub fn is_global(&self) -> bool {
        self.static_reachable || matches!(self.kind, ElementKind::Statics(_))
    }

    /// True if the object is global, or if `tid` together with the recorded
    /// accessors makes more than one thread satisfying `counts`.
    pub fn is_shared(&self, tid: ThreadId, counts: impl Fn(ThreadId) -> bool) -> bool {
        if self.is_global() {
            return true;
        }
        let mut seen: SmallVec<[ThreadId; 4]> = SmallVec::new();
        for t in self.ref_tids.iter().copied().chain(std::iter::once(tid)) {
            if counts(t) && !seen.contains(&t) {
                seen.push(t);
            }
        }
        seen.len() > 1
    }

    /// Count `tid` as a thread that can reach this object.
    pub(crate) fn add_referencing_thread(&mut self, tid: ThreadId) {
        if !self.ref_tids.contains(&tid) {
            self.ref_tids.push(tid);
        }
    }

    /// False if [`Self::inherit_reachability`] would leave the object
    /// unchanged.
    pub(crate) fn reachability_changes(&self, global: bool, threads: &[ThreadId]) -> bool {
        !self.static_reachable && (global || threads.iter().any(|t| !self.ref_tids.contains(t)))
    }

    /// Make this object reachable from a container that is `global` or
    /// reached by `threads`.
    pub(crate) fn inherit_reachability(&mut self, global: bool, threads: &[ThreadId]) {
        if global {
            self.static_reachable = true;
        } else {
            for &t in threads {
                self.add_referencing_thread(t);
            }
        }
    }

    /// False if recording this access would leave the object unchanged.
    pub(crate) fn access_changes(&self, tid: ThreadId, slot: Option<usize>, held: &[ObjRef]) -> bool {
        if !self.ref_tids.contains(&tid) {
            return true;
        }
        match slot.and_then(|i| self.locksets.get(i)) {
            None => false,
            Some(None) => true,
            Some(Some(prev)) => prev.iter().any(|l| !held.contains(l)),
        }
    }

    /// Record a committed access by `tid` holding `held`.
    pub(crate) fn record_access(&mut self, tid: ThreadId, slot: Option<usize>, held: &[ObjRef]) {
        self.add_referencing_thread(tid);
        let Some(lockset) = slot.and_then(|i| self.locksets.get_mut(i)) else {
            return;
        };
        *lockset = Some(match lockset.take() {
            None => held.iter().copied().collect(),
            Some(prev) => prev.into_iter().filter(|l| held.contains(l)).collect(),
        });
    }

    /// True if every committed access to `slot` held a lock that is in
    /// `held` now.
    pub fn is_lock_protected(&self, slot: usize, held: &[ObjRef]) -> bool {
        match self.locksets.get(slot) {
            Some(Some(lockset)) => lockset.iter().any(|l| held.contains(l)),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Heap {
    objects: Vec<Arc<ElementInfo>>,
    /// Leading entries holding class statics.
    statics: usize,
}

impl Heap {
    /// A heap holding one statics record per class, at `ObjRef(class id)`.
    pub fn new(classes: &[ClassInfo]) -> Self {
        let objects: Vec<_> = classes
            .iter()
            .map(|class| {
                let slots = class
                    .static_fields
                    .iter()
                    .map(|f| Slot::concrete(f.ty.default_value()))
                    .collect();
                Arc::new(ElementInfo::new(
                    ElementKind::Statics(class.id),
                    slots,
                    false,
                    None,
                ))
            })
            .collect();
        let statics = objects.len();
        Self { objects, statics }
    }

    pub fn statics(&self, class: ClassId) -> ObjRef {
        ObjRef(class.0)
    }

    /// Number of allocated objects and arrays, statics excluded.
    pub fn allocated(&self) -> usize {
        self.objects.len() - self.statics
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// True if `limit` objects are already allocated (0 = unlimited).
    pub fn is_out_of_memory(&self, limit: usize) -> bool {
        limit != 0 && self.allocated() >= limit
    }

    pub fn get(&self, r: ObjRef) -> VmResult<&ElementInfo> {
        self.objects
            .get(r.index())
            .map(|e| e.as_ref())
            .ok_or_else(|| VmError::Invariant(format!("dangling reference {}", r)))
    }

    pub fn get_mut(&mut self, r: ObjRef) -> VmResult<&mut ElementInfo> {
        self.objects
            .get_mut(r.index())
            .map(Arc::make_mut)
            .ok_or_else(|| VmError::Invariant(format!("dangling reference {}", r)))
    }

    pub fn allocate_object(&mut self, class: &ClassInfo, creator: ThreadId) -> ObjRef {
        let slots = class
            .fields
            .iter()
            .map(|f| Slot::concrete(f.ty.default_value()))
            .collect();
        self.push(ElementInfo::new(
            ElementKind::Object(class.id),
            slots,
            class.is_immutable,
            Some(creator),
        ))
    }

    /// `None` if the host cannot reserve `len` slots.
    pub fn allocate_array(&mut self, elem: TypeDesc, len: usize, creator: ThreadId) -> Option<ObjRef> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(len).ok()?;
        slots.resize(len, Slot::concrete(elem.default_value()));
        Some(self.push(ElementInfo::new(
            ElementKind::Array(elem),
            slots,
            false,
            Some(creator),
        )))
    }

    fn push(&mut self, element: ElementInfo) -> ObjRef {
        let r = ObjRef(self.objects.len() as u32);
        self.objects.push(Arc::new(element));
        r
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &ElementInfo)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, e)| (ObjRef(i as u32), e.as_ref()))
    }
}
