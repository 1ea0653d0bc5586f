//! Generic tick engine.
//!
//! An [`Automaton`] owns a [`CellArena`] and the global parameters behind a
//! shared handle. A tick runs in four phases:
//!
//! 1. every live cell computes its next state from an owned snapshot of its
//!    neighbors' former values (in parallel when the tier allows it),
//! 2. the parallel iterator joins,
//! 3. deferred mutations queued during phase 1 are applied in source order,
//! 4. current values are promoted to former.
//!
//! Phase 1 writes only the cell's own current slot and reads only former
//! slots, so sibling updates never observe each other. Structural edits are
//! rejected with [`Error::TickInFlight`] for as long as a tick is running.

use std::fmt;
use std::future::Future;
use std::io::{Read, Write};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::arena::{CellArena, CellBuffers, CellIndex, CellView, CellViewMut, GraphImage, TickView};
use crate::deferred::{DeferredMutation, DeferredQueue};
use crate::error::{Error, Result};
use crate::storage::{self, CellCodec, ParamsCodec};

/// Execution tier for the compute and promotion phases of a tick.
///
/// - `Scalar`: single-threaded, works everywhere
/// - `Parallel`: multi-threaded via rayon (requires the `parallel` feature)
///
/// Both tiers produce identical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecutionTier {
    Scalar,
    Parallel,
}

impl Default for ExecutionTier {
    fn default() -> Self {
        if cfg!(feature = "parallel") {
            ExecutionTier::Parallel
        } else {
            ExecutionTier::Scalar
        }
    }
}

impl ExecutionTier {
    /// The tier that will actually run, honoring compile-time feature gates.
    pub fn effective(self) -> ExecutionTier {
        match self {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Parallel => {
                if cfg!(feature = "parallel") {
                    ExecutionTier::Parallel
                } else {
                    ExecutionTier::Scalar
                }
            }
        }
    }
}

/// The contract a cell type fulfills to be driven by an [`Automaton`].
pub trait AutomatonCell: Clone + Send + Sync + 'static {
    /// Global tunables read by every update.
    type Params: Clone + Send + Sync + 'static;

    /// Compute this tick's state into `current` from `former` and the
    /// neighbors' former values.
    ///
    /// Must not block; it may queue writes to other cells through
    /// [`TickContext::enqueue_deferred`].
    fn update(
        former: &Self,
        current: &mut Self,
        neighbors: &[Neighbor<Self>],
        ctx: &TickContext<'_, Self::Params>,
    );

    /// Apply a deferred write queued by another cell's update.
    fn apply_deferred(&mut self, value: f64);
}

/// Snapshot of one incoming neighbor, copied out of the former buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<C> {
    pub index: CellIndex,
    pub value: C,
}

/// Per-update view of the running tick.
///
/// Only the engine constructs one, so deferred writes can only be queued from
/// inside an update call.
pub struct TickContext<'a, P> {
    params: &'a P,
    cell: CellIndex,
    queue: &'a DeferredQueue,
}

impl<'a, P> TickContext<'a, P> {
    pub(crate) fn new(params: &'a P, cell: CellIndex, queue: &'a DeferredQueue) -> Self {
        Self {
            params,
            cell,
            queue,
        }
    }

    pub fn params(&self) -> &P {
        self.params
    }

    /// Handle of the cell being updated.
    pub fn cell(&self) -> CellIndex {
        self.cell
    }

    /// Queue a write to `target`, applied after every update of this tick.
    pub fn enqueue_deferred(&self, target: CellIndex, value: f64) {
        self.queue.push(DeferredMutation {
            source: self.cell,
            target,
            value,
        });
    }
}

/// Outcome of one completed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickReport {
    /// Ticks completed so far, this one included.
    pub tick: u64,
    pub updated: usize,
    pub deferred_applied: usize,
    pub tier: ExecutionTier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    pub cell_count: usize,
    pub slot_count: usize,
    pub edge_count: usize,
    pub ticks: u64,
    pub execution_tier: ExecutionTier,
}

struct State<C: AutomatonCell> {
    arena: CellArena<C>,
    params: C::Params,
    ticks: u64,
    tier: ExecutionTier,
}

struct Shared<C: AutomatonCell> {
    state: RwLock<State<C>>,
    in_flight: AtomicBool,
}

impl<C: AutomatonCell> Shared<C> {
    // A panicking update leaves the former buffer untouched, so the state is
    // still consistent and the lock can be recovered.
    fn read(&self) -> RwLockReadGuard<'_, State<C>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State<C>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a tick as in flight; clears the mark when dropped, even on panic.
struct TickGuard<C: AutomatonCell> {
    shared: Arc<Shared<C>>,
}

impl<C: AutomatonCell> TickGuard<C> {
    fn acquire(shared: &Arc<Shared<C>>) -> Result<Self> {
        shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::TickInFlight)?;
        Ok(Self {
            shared: Arc::clone(shared),
        })
    }

    fn run(&self) -> Result<TickReport> {
        let mut state = self.shared.write();
        run_tick(&mut state)
    }
}

impl<C: AutomatonCell> Drop for TickGuard<C> {
    fn drop(&mut self) {
        self.shared.in_flight.store(false, Ordering::Release);
    }
}

/// Completion signal for a tick started with [`Automaton::step_async`].
///
/// Await it from async code, poll it with [`TickHandle::try_result`] from an
/// event loop, or block on it with [`TickHandle::wait`]. Dropping the handle
/// does not cancel the tick.
#[derive(Debug)]
pub struct TickHandle {
    rx: oneshot::Receiver<Result<TickReport>>,
}

impl TickHandle {
    /// Block the calling thread until the tick completes.
    ///
    /// Must not be called from inside an async runtime; `.await` the handle
    /// there instead.
    pub fn wait(self) -> Result<TickReport> {
        self.rx.blocking_recv().unwrap_or(Err(Error::TickAborted))
    }

    /// Non-blocking check; `None` while the tick is still running.
    pub fn try_result(&mut self) -> Option<Result<TickReport>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::TickAborted)),
        }
    }
}

impl Future for TickHandle {
    type Output = Result<TickReport>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(Error::TickAborted)))
    }
}

/// Shared handle to a cell graph and its tick engine.
///
/// Cloning the handle is cheap; every clone drives the same graph.
pub struct Automaton<C: AutomatonCell> {
    shared: Arc<Shared<C>>,
}

impl<C: AutomatonCell> Clone for Automaton<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: AutomatonCell> fmt::Debug for Automaton<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.read();
        f.debug_struct("Automaton")
            .field("cells", &state.arena.len())
            .field("edges", &state.arena.edge_count())
            .field("ticks", &state.ticks)
            .field("tier", &state.tier)
            .finish()
    }
}

impl<C: AutomatonCell> Default for Automaton<C>
where
    C::Params: Default,
{
    fn default() -> Self {
        Self::new(C::Params::default())
    }
}

impl<C: AutomatonCell> Automaton<C> {
    pub fn new(params: C::Params) -> Self {
        Self::from_arena(CellArena::new(), params)
    }

    pub fn from_arena(arena: CellArena<C>, params: C::Params) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State {
                    arena,
                    params,
                    ticks: 0,
                    tier: ExecutionTier::default(),
                }),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Write access for structural edits; refused while a tick is running.
    fn edit(&self, op: &'static str) -> Result<RwLockWriteGuard<'_, State<C>>> {
        if self.shared.in_flight.load(Ordering::Acquire) {
            warn!(op, "structural edit rejected: tick in flight");
            return Err(Error::TickInFlight);
        }
        Ok(self.shared.write())
    }

    pub fn add_node(&self, value: C) -> Result<CellIndex> {
        Ok(self.edit("add_node")?.arena.insert(value))
    }

    /// Remove a cell. Every edge touching it must be removed first (see
    /// [`Automaton::detach_node`]); otherwise this fails with
    /// [`Error::StillConnected`].
    pub fn remove_node(&self, index: CellIndex) -> Result<C> {
        self.edit("remove_node")?.arena.remove(index)
    }

    /// Remove every edge into or out of a cell, returning how many there were.
    pub fn detach_node(&self, index: CellIndex) -> Result<usize> {
        self.edit("detach_node")?.arena.detach(index)
    }

    /// Make `to` read `from`'s former value. Returns `false` if already present.
    pub fn add_edge(&self, to: CellIndex, from: CellIndex) -> Result<bool> {
        self.edit("add_edge")?.arena.add_edge(to, from)
    }

    /// Returns `false` if there was no such edge.
    pub fn remove_edge(&self, to: CellIndex, from: CellIndex) -> Result<bool> {
        self.edit("remove_edge")?.arena.remove_edge(to, from)
    }

    pub fn contains_edge(&self, to: CellIndex, from: CellIndex) -> Result<bool> {
        self.shared.read().arena.contains_edge(to, from)
    }

    /// Copy of a cell's former and current values.
    pub fn get(&self, index: CellIndex) -> Result<CellBuffers<C>> {
        let state = self.shared.read();
        let view = state.arena.get(index)?;
        Ok(CellBuffers {
            former: view.former.clone(),
            current: view.current.clone(),
        })
    }

    /// Run `f` on a copy of a cell's buffers.
    ///
    /// The lock is released before `f` runs, so `f` may call back into this
    /// automaton (including `step`).
    pub fn with_cell<R>(&self, index: CellIndex, f: impl FnOnce(CellView<'_, C>) -> R) -> Result<R> {
        let buffers = self.get(index)?;
        Ok(f(CellView {
            former: &buffers.former,
            current: &buffers.current,
        }))
    }

    /// Scoped mutable access to a cell's buffers. Waits for an in-flight tick.
    ///
    /// The write lock is held while `f` runs: `f` must not call any other
    /// method on this automaton or its clones, or it deadlocks.
    pub fn with_cell_mut<R>(
        &self,
        index: CellIndex,
        f: impl FnOnce(CellViewMut<'_, C>) -> R,
    ) -> Result<R> {
        let mut state = self.shared.write();
        Ok(f(state.arena.get_mut(index)?))
    }

    /// Force a cell to `value` in both buffers.
    pub fn set_cell(&self, index: CellIndex, value: C) -> Result<()> {
        self.with_cell_mut(index, |view| {
            *view.former = value.clone();
            *view.current = value;
        })
    }

    pub fn inputs(&self, index: CellIndex) -> Result<Vec<CellIndex>> {
        self.shared.read().arena.inputs(index)
    }

    /// Every live cell with its former value, in slot order.
    pub fn cells(&self) -> Vec<(CellIndex, C)> {
        let state = self.shared.read();
        state
            .arena
            .indices()
            .filter_map(|i| state.arena.get(i).ok().map(|v| (i, v.former.clone())))
            .collect()
    }

    /// Every edge as `(to, from)`.
    pub fn edges(&self) -> Vec<(CellIndex, CellIndex)> {
        self.shared.read().arena.edges()
    }

    pub fn len(&self) -> usize {
        self.shared.read().arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tick_count(&self) -> u64 {
        self.shared.read().ticks
    }

    /// True while a tick started by `step` or `step_async` is running.
    pub fn is_ticking(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn params(&self) -> C::Params {
        self.shared.read().params.clone()
    }

    pub fn set_params(&self, params: C::Params) {
        self.shared.write().params = params;
    }

    /// Mutate the parameters in place. Waits for an in-flight tick.
    ///
    /// Holds the write lock while `f` runs, with the same restriction as
    /// [`Automaton::with_cell_mut`].
    pub fn update_params<R>(&self, f: impl FnOnce(&mut C::Params) -> R) -> R {
        f(&mut self.shared.write().params)
    }

    pub fn set_execution_tier(&self, tier: ExecutionTier) {
        self.shared.write().tier = tier;
    }

    pub fn execution_tier(&self) -> ExecutionTier {
        self.shared.read().tier
    }

    pub fn effective_execution_tier(&self) -> ExecutionTier {
        self.execution_tier().effective()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let state = self.shared.read();
        Diagnostics {
            cell_count: state.arena.len(),
            slot_count: state.arena.capacity(),
            edge_count: state.arena.edge_count(),
            ticks: state.ticks,
            execution_tier: state.tier.effective(),
        }
    }

    /// Dense copy of the graph (former buffer) for persistence.
    pub fn to_image(&self) -> GraphImage<C> {
        self.shared.read().arena.to_image()
    }

    /// Run one tick on the calling thread.
    pub fn step(&self) -> Result<TickReport> {
        let guard = TickGuard::acquire(&self.shared)?;
        guard.run()
    }

    /// Dispatch one tick onto the worker pool and return immediately.
    ///
    /// Fails with [`Error::TickInFlight`] if the previous tick has not
    /// completed yet.
    pub fn step_async(&self) -> Result<TickHandle> {
        let guard = TickGuard::acquire(&self.shared)?;
        let (tx, rx) = oneshot::channel();
        spawn_tick(move || {
            let result = guard.run();
            // Clear the in-flight mark before waking the caller so an
            // immediate follow-up edit is accepted.
            drop(guard);
            let _ = tx.send(result);
        });
        Ok(TickHandle { rx })
    }
}

impl<C> Automaton<C>
where
    C: AutomatonCell + CellCodec,
    C::Params: ParamsCodec,
{
    /// Serialize parameters, cells and adjacency (former buffer only).
    pub fn write_binary<W: Write>(&self, w: &mut W) -> Result<()> {
        let (image, params) = {
            let state = self.shared.read();
            (state.arena.to_image(), state.params.clone())
        };

        w.write_all(storage::MAGIC)?;
        storage::write_u32_le(w, storage::VERSION_CURRENT)?;
        params.write_params(w)?;

        storage::write_len(w, image.cells.len())?;
        for cell in &image.cells {
            cell.write_cell(w)?;
        }
        for inputs in &image.inputs {
            storage::write_len(w, inputs.len())?;
            for &n in inputs {
                storage::write_u32_le(w, n)?;
            }
        }

        info!(cells = image.cells.len(), "network image written");
        Ok(())
    }

    /// Build a new automaton from an image written by [`Automaton::write_binary`].
    ///
    /// Nothing is constructed unless the whole image is valid.
    pub fn read_binary<R: Read>(r: &mut R) -> Result<Self> {
        let magic = storage::read_exact::<8, _>(r).map_err(Error::from_read)?;
        if &magic != storage::MAGIC {
            return Err(Error::format("bad network image marker"));
        }
        let version = storage::read_u32_le(r).map_err(Error::from_read)?;
        if !(storage::VERSION_V1..=storage::VERSION_CURRENT).contains(&version) {
            return Err(Error::format(format!(
                "unsupported network image version {version}"
            )));
        }

        let params = C::Params::read_params(r)?;

        let count = storage::read_u32_le(r).map_err(Error::from_read)? as usize;
        // Cap the preallocation; a corrupt count fails on the first short read.
        let mut cells = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            cells.push(C::read_cell(r, version)?);
        }

        let mut inputs = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let n = storage::read_u32_le(r).map_err(Error::from_read)? as usize;
            let mut list = Vec::with_capacity(n.min(1 << 16));
            for _ in 0..n {
                list.push(storage::read_u32_le(r).map_err(Error::from_read)?);
            }
            inputs.push(list);
        }

        let arena = CellArena::from_image(GraphImage { cells, inputs })?;
        info!(cells = arena.len(), "network image loaded");
        Ok(Self::from_arena(arena, params))
    }

    /// Exact serialized size in bytes of the current image.
    pub fn image_size_bytes(&self) -> Result<usize> {
        let mut cw = storage::CountingWriter::new();
        self.write_binary(&mut cw)?;
        Ok(cw.written())
    }
}

#[cfg(feature = "parallel")]
fn spawn_tick(job: impl FnOnce() + Send + 'static) {
    rayon::spawn(job);
}

#[cfg(not(feature = "parallel"))]
fn spawn_tick(job: impl FnOnce() + Send + 'static) {
    // On spawn failure the job (and its sender) is dropped, which resolves
    // the handle with `TickAborted` and releases the in-flight mark.
    if let Err(e) = std::thread::Builder::new()
        .name("cellnet-tick".to_string())
        .spawn(job)
    {
        warn!("failed to spawn tick worker: {}", e);
    }
}

fn update_slot<C: AutomatonCell>(
    i: usize,
    current: &mut C,
    view: &TickView<'_, C>,
    params: &C::Params,
    queue: &DeferredQueue,
) -> bool {
    let slot = &view.slots[i];
    if !slot.live {
        return false;
    }

    let neighbors: Vec<Neighbor<C>> = slot
        .inputs
        .iter()
        .map(|&n| {
            let n = n as usize;
            Neighbor {
                index: CellIndex::new(n as u32, view.slots[n].generation),
                value: view.former[n].clone(),
            }
        })
        .collect();

    let ctx = TickContext::new(params, CellIndex::new(i as u32, slot.generation), queue);
    C::update(&view.former[i], current, &neighbors, &ctx);
    true
}

fn run_tick<C: AutomatonCell>(state: &mut State<C>) -> Result<TickReport> {
    let tier = state.tier.effective();
    let queue = DeferredQueue::new();

    let params = &state.params;
    let (view, current) = state.arena.split_for_tick();
    let updated: usize = match tier {
        #[cfg(feature = "parallel")]
        ExecutionTier::Parallel => current
            .par_iter_mut()
            .enumerate()
            .map(|(i, c)| update_slot(i, c, &view, params, &queue) as usize)
            .sum(),
        _ => current
            .iter_mut()
            .enumerate()
            .map(|(i, c)| update_slot(i, c, &view, params, &queue) as usize)
            .sum(),
    };

    // Barrier passed: every update has finished.
    let mutations = queue.into_sorted();
    let targets = mutations
        .iter()
        .map(|m| state.arena.resolve(m.target))
        .collect::<Result<Vec<usize>>>()?;
    for (m, slot) in mutations.iter().zip(targets) {
        state.arena.current_mut(slot).apply_deferred(m.value);
    }

    state.arena.promote(tier);
    state.ticks += 1;

    debug!(
        tick = state.ticks,
        updated,
        deferred = mutations.len(),
        "tick complete"
    );

    Ok(TickReport {
        tick: state.ticks,
        updated,
        deferred_applied: mutations.len(),
        tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test cell: value becomes the sum of neighbor values plus a global bias,
    /// and each update asks its neighbors to remember the updater's old value.
    #[derive(Debug, Clone, PartialEq)]
    struct Summer {
        value: f64,
        memo: f64,
    }

    fn summer(value: f64) -> Summer {
        Summer { value, memo: 0.0 }
    }

    impl AutomatonCell for Summer {
        type Params = f64;

        fn update(
            former: &Self,
            current: &mut Self,
            neighbors: &[Neighbor<Self>],
            ctx: &TickContext<'_, f64>,
        ) {
            *current = former.clone();
            current.value = neighbors.iter().map(|n| n.value.value).sum::<f64>() + ctx.params();
            for n in neighbors {
                ctx.enqueue_deferred(n.index, former.value);
            }
        }

        fn apply_deferred(&mut self, value: f64) {
            self.memo = value;
        }
    }

    #[test]
    fn updates_read_only_the_former_snapshot() {
        let a = Automaton::new(0.0);
        let x = a.add_node(summer(1.0)).unwrap();
        let y = a.add_node(summer(0.0)).unwrap();
        let z = a.add_node(summer(0.0)).unwrap();
        a.add_edge(y, x).unwrap();
        a.add_edge(z, y).unwrap();

        a.step().unwrap();
        // y saw x's former value; z saw y's *former* value, not y's new one.
        assert_eq!(a.get(y).unwrap().former.value, 1.0);
        assert_eq!(a.get(z).unwrap().former.value, 0.0);

        a.step().unwrap();
        assert_eq!(a.get(z).unwrap().former.value, 1.0);
    }

    #[test]
    fn deferred_writes_land_before_promotion() {
        let a = Automaton::new(0.0);
        let x = a.add_node(summer(0.0)).unwrap();
        let y = a.add_node(summer(7.0)).unwrap();
        a.add_edge(y, x).unwrap();

        let report = a.step().unwrap();
        assert_eq!(report.deferred_applied, 1);
        assert_eq!(report.updated, 2);
        let buffers = a.get(x).unwrap();
        assert_eq!(buffers.former.memo, 7.0);
        assert_eq!(buffers.former, buffers.current);
    }

    #[test]
    fn scalar_and_parallel_tiers_agree() {
        let build = |tier| {
            let a = Automaton::new(0.5);
            a.set_execution_tier(tier);
            let ids: Vec<_> = (0..64)
                .map(|i| a.add_node(summer(f64::from(i) * 0.01)).unwrap())
                .collect();
            for (k, &to) in ids.iter().enumerate() {
                a.add_edge(to, ids[(k * 7 + 3) % ids.len()]).unwrap();
                a.add_edge(to, ids[(k * 13 + 1) % ids.len()]).unwrap();
            }
            for _ in 0..5 {
                a.step().unwrap();
            }
            a.cells()
        };
        assert_eq!(
            build(ExecutionTier::Scalar),
            build(ExecutionTier::Parallel)
        );
    }

    #[test]
    fn structural_edits_are_rejected_while_ticking() {
        let a = Automaton::new(0.0);
        let x = a.add_node(summer(1.0)).unwrap();

        // Holding the write lock keeps the dispatched tick parked.
        let handle = a
            .with_cell_mut(x, |_| {
                let handle = a.step_async().unwrap();
                assert!(a.is_ticking());
                assert!(matches!(a.add_node(summer(0.0)), Err(Error::TickInFlight)));
                assert!(matches!(a.add_edge(x, x), Err(Error::TickInFlight)));
                assert!(matches!(a.step_async(), Err(Error::TickInFlight)));
                assert!(matches!(a.step(), Err(Error::TickInFlight)));
                handle
            })
            .unwrap();

        let report = handle.wait().unwrap();
        assert_eq!(report.tick, 1);
        assert!(!a.is_ticking());
        a.add_node(summer(0.0)).unwrap();
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn with_cell_closure_may_step_the_same_automaton() {
        let a = Automaton::new(1.0);
        let x = a.add_node(summer(0.0)).unwrap();

        let report = a
            .with_cell(x, |view| {
                assert_eq!(view.former.value, 0.0);
                a.set_cell(x, summer(5.0)).unwrap();
                a.step().unwrap()
            })
            .unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(a.get(x).unwrap().former.value, 1.0);
    }

    #[test]
    fn edits_with_dead_handles_fail_loudly() {
        let a = Automaton::new(0.0);
        let x = a.add_node(summer(0.0)).unwrap();
        let y = a.add_node(summer(0.0)).unwrap();
        a.remove_node(y).unwrap();

        let err = a.add_edge(x, y).unwrap_err();
        assert!(err.is_index_error());
        assert!(a.contains_edge(y, x).unwrap_err().is_index_error());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn step_async_can_be_awaited() {
        let a = Automaton::new(1.0);
        let x = a.add_node(summer(0.0)).unwrap();

        for expected in 1..=3u64 {
            let report = a.step_async().unwrap().await.unwrap();
            assert_eq!(report.tick, expected);
        }
        assert_eq!(a.get(x).unwrap().former.value, 1.0);
        assert_eq!(a.tick_count(), 3);
    }
}
