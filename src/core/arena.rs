//! Generational, double-buffered cell storage with directed adjacency.
//!
//! Each slot keeps two copies of its cell: `former` (the settled state every
//! update reads) and `current` (the state being written this tick). Edges are
//! stored on the receiving cell as a list of incoming slots; outgoing slots
//! are mirrored so disconnection checks do not scan the whole arena.

use core::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::automaton::ExecutionTier;
use crate::error::{Error, Result};

/// Stable handle to a cell.
///
/// The generation is bumped every time a slot is freed, so a handle kept
/// across `remove_node` never resolves to the cell that later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellIndex {
    slot: u32,
    generation: u32,
}

impl CellIndex {
    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.slot, self.generation)
    }
}

/// Borrowed view of one cell's double buffer.
#[derive(Debug, Clone, Copy)]
pub struct CellView<'a, C> {
    pub former: &'a C,
    pub current: &'a C,
}

/// Mutable view of one cell's double buffer, for forcing values between ticks.
#[derive(Debug)]
pub struct CellViewMut<'a, C> {
    pub former: &'a mut C,
    pub current: &'a mut C,
}

/// Owned copy of one cell's double buffer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellBuffers<C> {
    pub former: C,
    pub current: C,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) live: bool,
    pub(crate) inputs: Vec<u32>,
    pub(crate) outputs: Vec<u32>,
}

impl Slot {
    /// Incident edge count; a self-edge sits in both lists but counts once.
    fn degree(&self, me: u32) -> usize {
        let self_edge = self.inputs.contains(&me) as usize;
        self.inputs.len() + self.outputs.len() - self_edge
    }
}

/// Read-only half of the arena handed to the parallel phase of a tick.
pub(crate) struct TickView<'a, C> {
    pub(crate) former: &'a [C],
    pub(crate) slots: &'a [Slot],
}

/// Live cells compacted into dense `0..n` order, as written to a network image.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphImage<C> {
    pub cells: Vec<C>,
    /// Incoming neighbors of each cell, as dense indices into `cells`.
    pub inputs: Vec<Vec<u32>>,
}

#[derive(Debug, Clone)]
pub struct CellArena<C> {
    slots: Vec<Slot>,
    former: Vec<C>,
    current: Vec<C>,
    free: Vec<u32>,
    live: usize,
}

impl<C> Default for CellArena<C> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            former: Vec::new(),
            current: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<C: Clone> CellArena<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots, live or tombstoned.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.live)
            .map(|s| s.inputs.len())
            .sum()
    }

    /// Store a new cell, reusing a freed slot when one is available.
    pub fn insert(&mut self, value: C) -> CellIndex {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            let i = slot as usize;
            self.former[i] = value.clone();
            self.current[i] = value;
            let s = &mut self.slots[i];
            s.live = true;
            return CellIndex::new(slot, s.generation);
        }

        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            live: true,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        self.former.push(value.clone());
        self.current.push(value);
        CellIndex::new(slot, 0)
    }

    /// Tombstone a cell and return its former value.
    ///
    /// Fails with [`Error::StillConnected`] while any edge references it.
    pub fn remove(&mut self, index: CellIndex) -> Result<C> {
        let i = self.resolve(index)?;
        let edges = self.slots[i].degree(index.slot);
        if edges > 0 {
            return Err(Error::StillConnected { index, edges });
        }

        let s = &mut self.slots[i];
        s.live = false;
        s.generation = s.generation.wrapping_add(1);
        self.free.push(index.slot);
        self.live -= 1;
        Ok(self.former[i].clone())
    }

    /// Remove every edge into or out of `index`. Returns how many were removed.
    pub fn detach(&mut self, index: CellIndex) -> Result<usize> {
        let i = self.resolve(index)?;
        let me = i as u32;
        let removed = self.slots[i].degree(me);
        let inputs = std::mem::take(&mut self.slots[i].inputs);
        let outputs = std::mem::take(&mut self.slots[i].outputs);

        for &from in &inputs {
            if from != me {
                self.slots[from as usize].outputs.retain(|&o| o != me);
            }
        }
        for &to in &outputs {
            if to != me {
                self.slots[to as usize].inputs.retain(|&n| n != me);
            }
        }
        Ok(removed)
    }

    /// Record `from` as an incoming neighbor of `to`.
    ///
    /// Returns `false` when the edge already existed.
    pub fn add_edge(&mut self, to: CellIndex, from: CellIndex) -> Result<bool> {
        let t = self.resolve(to)?;
        let f = self.resolve(from)?;
        if self.slots[t].inputs.contains(&(f as u32)) {
            return Ok(false);
        }
        self.slots[t].inputs.push(f as u32);
        self.slots[f].outputs.push(t as u32);
        Ok(true)
    }

    /// Returns `false` when there was no such edge.
    pub fn remove_edge(&mut self, to: CellIndex, from: CellIndex) -> Result<bool> {
        let t = self.resolve(to)?;
        let f = self.resolve(from)?;
        let inputs = &mut self.slots[t].inputs;
        let Some(pos) = inputs.iter().position(|&n| n == f as u32) else {
            return Ok(false);
        };
        inputs.remove(pos);
        self.slots[f].outputs.retain(|&o| o != t as u32);
        Ok(true)
    }

    pub fn contains_edge(&self, to: CellIndex, from: CellIndex) -> Result<bool> {
        let t = self.resolve(to)?;
        let f = self.resolve(from)?;
        Ok(self.slots[t].inputs.contains(&(f as u32)))
    }

    pub fn get(&self, index: CellIndex) -> Result<CellView<'_, C>> {
        let i = self.resolve(index)?;
        Ok(CellView {
            former: &self.former[i],
            current: &self.current[i],
        })
    }

    pub fn get_mut(&mut self, index: CellIndex) -> Result<CellViewMut<'_, C>> {
        let i = self.resolve(index)?;
        Ok(CellViewMut {
            former: &mut self.former[i],
            current: &mut self.current[i],
        })
    }

    /// Incoming neighbors of `index`, in insertion order.
    pub fn inputs(&self, index: CellIndex) -> Result<Vec<CellIndex>> {
        let i = self.resolve(index)?;
        Ok(self.slots[i]
            .inputs
            .iter()
            .map(|&n| self.handle(n as usize))
            .collect())
    }

    /// Live handles in slot order.
    pub fn indices(&self) -> impl Iterator<Item = CellIndex> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.live)
            .map(|(i, s)| CellIndex::new(i as u32, s.generation))
    }

    /// Every edge as `(to, from)`.
    pub fn edges(&self) -> Vec<(CellIndex, CellIndex)> {
        let mut out = Vec::with_capacity(self.edge_count());
        for (t, s) in self.slots.iter().enumerate().filter(|(_, s)| s.live) {
            for &f in &s.inputs {
                out.push((self.handle(t), self.handle(f as usize)));
            }
        }
        out
    }

    /// Check a handle and return its slot position.
    pub fn resolve(&self, index: CellIndex) -> Result<usize> {
        let i = index.slot as usize;
        let Some(slot) = self.slots.get(i) else {
            return Err(Error::IndexOutOfRange(index));
        };
        if !slot.live || slot.generation != index.generation {
            return Err(Error::DeadIndex(index));
        }
        Ok(i)
    }

    pub(crate) fn handle(&self, slot: usize) -> CellIndex {
        CellIndex::new(slot as u32, self.slots[slot].generation)
    }

    /// Split the arena into the shared read-only former side and the
    /// per-slot writable current side.
    pub(crate) fn split_for_tick(&mut self) -> (TickView<'_, C>, &mut [C]) {
        (
            TickView {
                former: &self.former,
                slots: &self.slots,
            },
            &mut self.current,
        )
    }

    pub(crate) fn current_mut(&mut self, slot: usize) -> &mut C {
        &mut self.current[slot]
    }

    /// Copy every current value into its former slot.
    pub(crate) fn promote(&mut self, tier: ExecutionTier)
    where
        C: Send + Sync,
    {
        match tier {
            #[cfg(feature = "parallel")]
            ExecutionTier::Parallel => {
                self.former
                    .par_iter_mut()
                    .zip(self.current.par_iter())
                    .for_each(|(f, c)| f.clone_from(c));
            }
            _ => self.former.clone_from_slice(&self.current),
        }
    }

    /// Compact live cells (former buffer) and edges into dense order.
    pub fn to_image(&self) -> GraphImage<C> {
        let mut dense = vec![u32::MAX; self.slots.len()];
        let mut cells = Vec::with_capacity(self.live);
        for (i, s) in self.slots.iter().enumerate() {
            if s.live {
                dense[i] = cells.len() as u32;
                cells.push(self.former[i].clone());
            }
        }

        let inputs = self
            .slots
            .iter()
            .filter(|s| s.live)
            .map(|s| s.inputs.iter().map(|&n| dense[n as usize]).collect())
            .collect();

        GraphImage { cells, inputs }
    }

    /// Rebuild an arena from a dense image. Handles are `0..n`, generation 0.
    pub fn from_image(image: GraphImage<C>) -> Result<Self> {
        let GraphImage { cells, inputs } = image;
        let n = cells.len();
        if inputs.len() != n {
            return Err(Error::format(format!(
                "adjacency table has {} entries for {} cells",
                inputs.len(),
                n
            )));
        }

        let mut slots: Vec<Slot> = (0..n)
            .map(|_| Slot {
                generation: 0,
                live: true,
                inputs: Vec::new(),
                outputs: Vec::new(),
            })
            .collect();

        for (to, list) in inputs.into_iter().enumerate() {
            for from in list {
                if from as usize >= n {
                    return Err(Error::format(format!(
                        "cell {to} lists neighbor {from} but only {n} cells exist"
                    )));
                }
                if slots[to].inputs.contains(&from) {
                    return Err(Error::format(format!(
                        "cell {to} lists neighbor {from} twice"
                    )));
                }
                slots[to].inputs.push(from);
                slots[from as usize].outputs.push(to as u32);
            }
        }

        Ok(Self {
            slots,
            former: cells.clone(),
            current: cells,
            free: Vec::new(),
            live: n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_edge() {
        let mut arena = CellArena::new();
        let a = arena.insert(1.0_f64);
        let b = arena.insert(2.0_f64);

        assert!(arena.add_edge(b, a).unwrap());
        assert!(arena.contains_edge(b, a).unwrap());
        assert!(!arena.contains_edge(a, b).unwrap());

        assert!(arena.remove_edge(b, a).unwrap());
        assert!(!arena.contains_edge(b, a).unwrap());
        // Removing again is a no-op.
        assert!(!arena.remove_edge(b, a).unwrap());
    }

    #[test]
    fn duplicate_edge_is_idempotent() {
        let mut arena = CellArena::new();
        let a = arena.insert(0.0_f64);
        let b = arena.insert(0.0_f64);
        assert!(arena.add_edge(b, a).unwrap());
        assert!(!arena.add_edge(b, a).unwrap());
        assert_eq!(arena.edge_count(), 1);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut arena = CellArena::new();
        let a = arena.insert(0.0_f64);
        let bogus = CellIndex::new(7, 0);
        let err = arena.add_edge(a, bogus).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange(i) if i == bogus));
    }

    #[test]
    fn stale_handle_does_not_alias_recycled_slot() {
        let mut arena = CellArena::new();
        let old = arena.insert(1.0_f64);
        arena.remove(old).unwrap();

        let new = arena.insert(2.0_f64);
        assert_eq!(new.slot(), old.slot());
        assert_ne!(new.generation(), old.generation());

        assert!(matches!(arena.get(old), Err(Error::DeadIndex(_))));
        assert_eq!(*arena.get(new).unwrap().former, 2.0);
    }

    #[test]
    fn remove_requires_disconnection() {
        let mut arena = CellArena::new();
        let a = arena.insert(0.0_f64);
        let b = arena.insert(0.0_f64);
        arena.add_edge(b, a).unwrap();
        arena.add_edge(a, a).unwrap();

        let err = arena.remove(a).unwrap_err();
        assert!(matches!(err, Error::StillConnected { edges: 2, .. }));

        assert_eq!(arena.detach(a).unwrap(), 2);
        assert_eq!(arena.edge_count(), 0);
        arena.remove(a).unwrap();
        assert_eq!(arena.len(), 1);
        assert!(arena.inputs(b).unwrap().is_empty());
    }

    #[test]
    fn image_compacts_around_tombstones() {
        let mut arena = CellArena::new();
        let a = arena.insert(1.0_f64);
        let gone = arena.insert(9.0_f64);
        let c = arena.insert(3.0_f64);
        arena.add_edge(c, a).unwrap();
        arena.remove(gone).unwrap();

        let image = arena.to_image();
        assert_eq!(image.cells, vec![1.0, 3.0]);
        assert_eq!(image.inputs, vec![vec![], vec![0]]);

        let rebuilt = CellArena::from_image(image).unwrap();
        assert_eq!(rebuilt.len(), 2);
        let handles: Vec<_> = rebuilt.indices().collect();
        assert!(rebuilt.contains_edge(handles[1], handles[0]).unwrap());
    }

    #[test]
    fn image_with_dangling_neighbor_is_rejected() {
        let image = GraphImage {
            cells: vec![0.0_f64],
            inputs: vec![vec![4]],
        };
        assert!(matches!(
            CellArena::from_image(image),
            Err(Error::Format(_))
        ));
    }
}
