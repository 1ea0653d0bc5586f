//! Cell values and their per-kind update rule.
//!
//! A cell is a node, a directed link, or a free-running oscillator. The kind
//! is fixed at construction; what evolves tick to tick is the output, the
//! running average, a node's threshold, a link's learned weight and an
//! oscillator's step counter.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::automaton::{AutomatonCell, Neighbor, TickContext};
use crate::params::SimulationParameters;

/// Upper bound for excitatory link output and learned weight.
pub const MAX_EXCITATORY_WEIGHT: f64 = 1.1;

/// Hebbian updates smaller than this are not queued.
pub const LEARN_EPSILON: f64 = 1e-6;

/// Slope width of the threshold-inhibitory gate.
const GATE_RUN_WIDTH: f64 = 0.1;

/// Logistic activation that reaches 0.99 at `x = threshold` and 0.01 at
/// `x = threshold - run_width`.
///
/// A non-positive `run_width` degenerates to a hard step at `threshold`.
pub fn sigmoid(threshold: f64, run_width: f64, x: f64) -> f64 {
    if run_width <= 0.0 {
        return if x >= threshold { 1.0 } else { 0.0 };
    }
    // 1 / (1 + e^-k(run/2)) = 0.99  =>  k = 2 ln(99) / run
    let k = 2.0 * 99.0_f64.ln() / run_width;
    1.0 / (1.0 + (-k * (x - threshold + 0.5 * run_width)).exp())
}

/// Wire tag for each cell kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum CellTag {
    Node = 0,
    ExcitatoryLink = 1,
    InhibitoryLink = 2,
    ThresholdInhibitoryLink = 3,
    Oscillator = 4,
}

impl CellTag {
    pub const ALL: [CellTag; 5] = [
        CellTag::Node,
        CellTag::ExcitatoryLink,
        CellTag::InhibitoryLink,
        CellTag::ThresholdInhibitoryLink,
        CellTag::Oscillator,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            CellTag::Node => "node",
            CellTag::ExcitatoryLink => "excitatory-link",
            CellTag::InhibitoryLink => "inhibitory-link",
            CellTag::ThresholdInhibitoryLink => "threshold-inhibitory-link",
            CellTag::Oscillator => "oscillator",
        }
    }
}

/// Free-running square wave: `peak` ticks high out of every `gap + peak`,
/// starting once `step` reaches `phase`.
///
/// `step` counts the warm-up and stops at `phase`; from then on `position`
/// walks `0..gap + peak` and wraps, so neither counter can overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Oscillator {
    pub gap: u16,
    pub peak: u16,
    pub phase: u16,
    pub step: u16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub position: u32,
}

impl Oscillator {
    pub fn new(gap: u16, peak: u16, phase: u16) -> Self {
        Self {
            gap,
            peak,
            phase,
            step: 0,
            position: 0,
        }
    }

    /// Rebuild from a flat step counter that runs past `phase`.
    pub fn from_flat_step(gap: u16, peak: u16, phase: u16, step: u16) -> Self {
        let mut osc = Self::new(gap, peak, phase);
        if step < phase {
            osc.step = step;
        } else {
            osc.step = phase;
            let cycle = osc.cycle();
            if cycle > 0 {
                osc.position = u32::from(step - phase) % cycle;
            }
        }
        osc
    }

    pub fn cycle(&self) -> u32 {
        u32::from(self.gap) + u32::from(self.peak)
    }

    /// True once the warm-up is over.
    pub fn is_running(&self) -> bool {
        self.step >= self.phase
    }

    /// Counters within range: `step <= phase`, `position < cycle` (or 0
    /// for an empty cycle), and no position before the warm-up ends.
    pub fn is_consistent(&self) -> bool {
        let cycle = self.cycle();
        let position_ok = if cycle == 0 {
            self.position == 0
        } else {
            self.position < cycle
        };
        self.step <= self.phase && position_ok && (self.is_running() || self.position == 0)
    }

    /// Output level for the current step, before inhibition.
    pub fn level(&self) -> f64 {
        let cycle = self.cycle();
        if cycle == 0 || !self.is_running() {
            return 0.0;
        }
        if self.position % cycle < u32::from(self.peak) {
            1.0
        } else {
            0.0
        }
    }

    fn advance(&mut self) {
        if !self.is_running() {
            self.step += 1;
            return;
        }
        let cycle = self.cycle();
        if cycle > 0 {
            self.position = (self.position + 1) % cycle;
        }
    }

    fn tick(&mut self) -> f64 {
        let level = self.level();
        self.advance();
        level
    }
}

/// Kind-specific state. Payloads are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CellKind {
    Node { threshold: f64, run_width: f64 },
    ExcitatoryLink { weight: f64, run_width: f64 },
    InhibitoryLink { weight: f64, run_width: f64 },
    /// `run_width` doubles as the gate threshold.
    ThresholdInhibitoryLink { weight: f64, run_width: f64 },
    Oscillator(Oscillator),
}

impl CellKind {
    pub fn tag(&self) -> CellTag {
        match self {
            CellKind::Node { .. } => CellTag::Node,
            CellKind::ExcitatoryLink { .. } => CellTag::ExcitatoryLink,
            CellKind::InhibitoryLink { .. } => CellTag::InhibitoryLink,
            CellKind::ThresholdInhibitoryLink { .. } => CellTag::ThresholdInhibitoryLink,
            CellKind::Oscillator(_) => CellTag::Oscillator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cell {
    /// Frozen cells keep their state unchanged every tick.
    pub frozen: bool,
    pub output: f64,
    pub running_average: f64,
    pub kind: CellKind,
}

impl Default for Cell {
    fn default() -> Self {
        Self::node(Self::DEFAULT_THRESHOLD, Self::DEFAULT_RUN_WIDTH)
    }
}

impl Cell {
    pub const DEFAULT_THRESHOLD: f64 = 0.5;
    pub const DEFAULT_RUN_WIDTH: f64 = 0.5;
    pub const DEFAULT_EXCITATORY_WEIGHT: f64 = 0.5;
    pub const DEFAULT_INHIBITORY_WEIGHT: f64 = -0.5;

    pub fn new(kind: CellKind) -> Self {
        Self {
            frozen: false,
            output: 0.0,
            running_average: 0.0,
            kind,
        }
    }

    pub fn node(threshold: f64, run_width: f64) -> Self {
        Self::new(CellKind::Node {
            threshold,
            run_width,
        })
    }

    pub fn excitatory_link(weight: f64) -> Self {
        Self::new(CellKind::ExcitatoryLink {
            weight,
            run_width: 1.0,
        })
    }

    pub fn inhibitory_link(weight: f64) -> Self {
        Self::new(CellKind::InhibitoryLink {
            weight,
            run_width: 1.0,
        })
    }

    /// Inhibitory link gated by a steep sigmoid around `gate_threshold`.
    pub fn threshold_inhibitory_link(weight: f64, gate_threshold: f64) -> Self {
        Self::new(CellKind::ThresholdInhibitoryLink {
            weight,
            run_width: gate_threshold,
        })
    }

    pub fn oscillator(gap: u16, peak: u16, phase: u16) -> Self {
        Self::new(CellKind::Oscillator(Oscillator::new(gap, peak, phase)))
    }

    pub fn with_frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn with_output(mut self, output: f64) -> Self {
        self.output = output;
        self
    }

    pub fn tag(&self) -> CellTag {
        self.kind.tag()
    }

    /// Link weight; `None` for nodes and oscillators.
    pub fn weight(&self) -> Option<f64> {
        match self.kind {
            CellKind::ExcitatoryLink { weight, .. }
            | CellKind::InhibitoryLink { weight, .. }
            | CellKind::ThresholdInhibitoryLink { weight, .. } => Some(weight),
            _ => None,
        }
    }

    pub fn threshold(&self) -> Option<f64> {
        match self.kind {
            CellKind::Node { threshold, .. } => Some(threshold),
            _ => None,
        }
    }

    pub fn run_width(&self) -> Option<f64> {
        match self.kind {
            CellKind::Node { run_width, .. }
            | CellKind::ExcitatoryLink { run_width, .. }
            | CellKind::InhibitoryLink { run_width, .. }
            | CellKind::ThresholdInhibitoryLink { run_width, .. } => Some(run_width),
            CellKind::Oscillator(_) => None,
        }
    }

    /// Next state of this cell given its neighbors' former values.
    pub fn next_state(
        &self,
        neighbors: &[Neighbor<Cell>],
        ctx: &TickContext<'_, SimulationParameters>,
    ) -> Cell {
        if self.frozen {
            return *self;
        }

        let p = ctx.params();
        let (input_sum, inhibit) = gather(neighbors);

        let mut next = *self;
        let output = match &mut next.kind {
            CellKind::Node {
                threshold,
                run_width,
            } => {
                let out = sigmoid(*threshold, *run_width, input_sum)
                    .max(self.output * (1.0 - p.decay))
                    * inhibit;
                self.learn_incoming_links(out, neighbors, ctx);

                // Homeostasis: thresholds climb while the node runs hot and
                // sink slowly otherwise. Left unbounded.
                let diff = (out - self.running_average).clamp(0.0, 1.0);
                *threshold += p.node_learn_rate * (diff.powi(3) - p.node_forget_rate);
                out
            }
            CellKind::ExcitatoryLink { weight, .. } => {
                (input_sum * *weight).clamp(0.0, MAX_EXCITATORY_WEIGHT) * inhibit
            }
            CellKind::InhibitoryLink { weight, .. } => input_sum.clamp(0.0, 1.0) * inhibit * *weight,
            CellKind::ThresholdInhibitoryLink { weight, run_width } => {
                sigmoid(*run_width, GATE_RUN_WIDTH, input_sum).clamp(0.0, 1.0) * inhibit * *weight
            }
            CellKind::Oscillator(osc) => osc.tick() * inhibit,
        };

        let lt = p.effective_learn_time();
        next.output = output;
        next.running_average = (output + (lt - 1.0) * self.running_average) / lt;
        next
    }

    /// Hebbian step for every excitatory link feeding this node.
    fn learn_incoming_links(
        &self,
        next_output: f64,
        neighbors: &[Neighbor<Cell>],
        ctx: &TickContext<'_, SimulationParameters>,
    ) {
        let rate = ctx.params().link_learn_rate;
        let post = next_output - self.running_average;
        for n in neighbors {
            let CellKind::ExcitatoryLink { weight, .. } = n.value.kind else {
                continue;
            };
            let pre = n.value.output - n.value.running_average;
            let delta = rate * pre * post;
            if delta.abs() > LEARN_EPSILON {
                ctx.enqueue_deferred(n.index, (weight + delta).clamp(0.0, MAX_EXCITATORY_WEIGHT));
            }
        }
    }
}

/// Split neighbor outputs into the excitatory sum and the inhibit factor.
fn gather(neighbors: &[Neighbor<Cell>]) -> (f64, f64) {
    let mut input_sum = 0.0;
    let mut inhibit_sum = 0.0;
    for n in neighbors {
        let v = n.value.output;
        if v >= 0.0 {
            input_sum += v;
        } else {
            inhibit_sum -= v;
        }
    }
    (input_sum, 1.0 - inhibit_sum.clamp(0.0, 1.0))
}

impl AutomatonCell for Cell {
    type Params = SimulationParameters;

    fn update(
        former: &Self,
        current: &mut Self,
        neighbors: &[Neighbor<Self>],
        ctx: &TickContext<'_, SimulationParameters>,
    ) {
        *current = former.next_state(neighbors, ctx);
    }

    fn apply_deferred(&mut self, value: f64) {
        match &mut self.kind {
            CellKind::Node { threshold, .. } => *threshold = value,
            CellKind::ExcitatoryLink { weight, .. }
            | CellKind::InhibitoryLink { weight, .. }
            | CellKind::ThresholdInhibitoryLink { weight, .. } => *weight = value,
            CellKind::Oscillator(_) => {}
        }
    }
}
