//! The automaton specialized to [`Cell`], plus its on-disk image format.
//!
//! Image layout (little-endian):
//!
//! - `b"CELLNET1"` marker, `u32` version
//! - parameters: five `f64` (decay, link learn rate, node learn rate, node
//!   forget rate, learn time)
//! - `u32` cell count, then per cell: `u8` kind tag, `u8` frozen flag, the
//!   kind payload (two `f32` for nodes and links; for oscillators four `u16`
//!   gap, peak, phase, step, then a `u32` cycle position from version 2 on),
//!   `f32` output, `f32` running average
//! - per cell, in the same order: `u32` incoming count and that many `u32`
//!   dense indices

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Deref;
use std::path::Path;

use tracing::info;

use crate::automaton::{Automaton, TickHandle};
use crate::cell::{Cell, CellKind, CellTag, Oscillator};
use crate::error::{Error, Result};
use crate::params::SimulationParameters;
use crate::storage::{self, CellCodec, ParamsCodec};

impl ParamsCodec for SimulationParameters {
    fn write_params<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        storage::write_f64_le(w, self.decay)?;
        storage::write_f64_le(w, self.link_learn_rate)?;
        storage::write_f64_le(w, self.node_learn_rate)?;
        storage::write_f64_le(w, self.node_forget_rate)?;
        storage::write_f64_le(w, self.learn_time)
    }

    fn read_params<R: Read>(r: &mut R) -> Result<Self> {
        let mut next = || storage::read_f64_le(r).map_err(Error::from_read);
        Ok(SimulationParameters {
            decay: next()?,
            link_learn_rate: next()?,
            node_learn_rate: next()?,
            node_forget_rate: next()?,
            learn_time: next()?,
        })
    }
}

impl CellCodec for Cell {
    fn write_cell<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        storage::write_u8(w, self.tag() as u8)?;
        storage::write_u8(w, u8::from(self.frozen))?;
        match self.kind {
            CellKind::Node {
                threshold: a,
                run_width: b,
            }
            | CellKind::ExcitatoryLink {
                weight: a,
                run_width: b,
            }
            | CellKind::InhibitoryLink {
                weight: a,
                run_width: b,
            }
            | CellKind::ThresholdInhibitoryLink {
                weight: a,
                run_width: b,
            } => {
                storage::write_f32_le(w, a as f32)?;
                storage::write_f32_le(w, b as f32)?;
            }
            CellKind::Oscillator(osc) => {
                storage::write_u16_le(w, osc.gap)?;
                storage::write_u16_le(w, osc.peak)?;
                storage::write_u16_le(w, osc.phase)?;
                storage::write_u16_le(w, osc.step)?;
                storage::write_u32_le(w, osc.position)?;
            }
        }
        storage::write_f32_le(w, self.output as f32)?;
        storage::write_f32_le(w, self.running_average as f32)
    }

    fn read_cell<R: Read>(r: &mut R, version: u32) -> Result<Self> {
        let tag_byte = storage::read_u8(r).map_err(Error::from_read)?;
        let tag = CellTag::from_u8(tag_byte)
            .ok_or_else(|| Error::format(format!("unknown cell kind tag {tag_byte}")))?;
        let frozen = match storage::read_u8(r).map_err(Error::from_read)? {
            0 => false,
            1 => true,
            other => return Err(Error::format(format!("bad frozen flag {other}"))),
        };

        let kind = match tag {
            CellTag::Node => {
                let (threshold, run_width) = read_pair(r)?;
                CellKind::Node {
                    threshold,
                    run_width,
                }
            }
            CellTag::ExcitatoryLink => {
                let (weight, run_width) = read_pair(r)?;
                CellKind::ExcitatoryLink { weight, run_width }
            }
            CellTag::InhibitoryLink => {
                let (weight, run_width) = read_pair(r)?;
                CellKind::InhibitoryLink { weight, run_width }
            }
            CellTag::ThresholdInhibitoryLink => {
                let (weight, run_width) = read_pair(r)?;
                CellKind::ThresholdInhibitoryLink { weight, run_width }
            }
            CellTag::Oscillator => CellKind::Oscillator(read_oscillator(r, version)?),
        };

        let (output, running_average) = read_pair(r)?;
        Ok(Cell {
            frozen,
            output,
            running_average,
            kind,
        })
    }
}

fn read_oscillator<R: Read>(r: &mut R, version: u32) -> Result<Oscillator> {
    let mut next = || storage::read_u16_le(r).map_err(Error::from_read);
    let (gap, peak, phase, step) = (next()?, next()?, next()?, next()?);

    if version == storage::VERSION_V1 {
        // Flat counter; may already be past `phase`.
        return Ok(Oscillator::from_flat_step(gap, peak, phase, step));
    }

    let osc = Oscillator {
        gap,
        peak,
        phase,
        step,
        position: storage::read_u32_le(r).map_err(Error::from_read)?,
    };
    if !osc.is_consistent() {
        return Err(Error::format(format!(
            "oscillator counters out of range (step {}, position {})",
            osc.step, osc.position
        )));
    }
    Ok(osc)
}

/// Two consecutive `f32` fields, widened.
fn read_pair<R: Read>(r: &mut R) -> Result<(f64, f64)> {
    let a = storage::read_f32_le(r).map_err(Error::from_read)?;
    let b = storage::read_f32_le(r).map_err(Error::from_read)?;
    Ok((f64::from(a), f64::from(b)))
}

/// Number of live cells of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KindCounts {
    pub nodes: usize,
    pub excitatory_links: usize,
    pub inhibitory_links: usize,
    pub threshold_inhibitory_links: usize,
    pub oscillators: usize,
}

/// A cell network driven by the shared tick engine.
///
/// Dereferences to [`Automaton<Cell>`] for graph edits, inspection and
/// stepping; adds typed accessors for each simulation parameter and file I/O.
#[derive(Debug, Clone, Default)]
pub struct SimulationNetwork {
    automaton: Automaton<Cell>,
}

impl Deref for SimulationNetwork {
    type Target = Automaton<Cell>;

    fn deref(&self) -> &Automaton<Cell> {
        &self.automaton
    }
}

impl From<Automaton<Cell>> for SimulationNetwork {
    fn from(automaton: Automaton<Cell>) -> Self {
        Self { automaton }
    }
}

impl SimulationNetwork {
    /// Create an empty network. Fails if `params` does not validate.
    pub fn new(params: SimulationParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            automaton: Automaton::new(params),
        })
    }

    pub fn automaton(&self) -> &Automaton<Cell> {
        &self.automaton
    }

    /// Dispatch one tick without blocking; see [`Automaton::step_async`].
    pub fn step_async(&self) -> Result<TickHandle> {
        self.automaton.step_async()
    }

    pub fn decay(&self) -> f64 {
        self.params().decay
    }

    pub fn set_decay(&self, decay: f64) -> Result<()> {
        self.set_checked(|p| p.decay = decay)
    }

    pub fn link_learn_rate(&self) -> f64 {
        self.params().link_learn_rate
    }

    pub fn set_link_learn_rate(&self, rate: f64) -> Result<()> {
        self.set_checked(|p| p.link_learn_rate = rate)
    }

    pub fn node_learn_rate(&self) -> f64 {
        self.params().node_learn_rate
    }

    pub fn set_node_learn_rate(&self, rate: f64) -> Result<()> {
        self.set_checked(|p| p.node_learn_rate = rate)
    }

    pub fn node_forget_rate(&self) -> f64 {
        self.params().node_forget_rate
    }

    pub fn set_node_forget_rate(&self, rate: f64) -> Result<()> {
        self.set_checked(|p| p.node_forget_rate = rate)
    }

    pub fn learn_time(&self) -> f64 {
        self.params().learn_time
    }

    pub fn set_learn_time(&self, ticks: f64) -> Result<()> {
        self.set_checked(|p| p.learn_time = ticks)
    }

    /// Replace all parameters at once after validating them.
    pub fn set_parameters(&self, params: SimulationParameters) -> Result<()> {
        params.validate()?;
        self.set_params(params);
        Ok(())
    }

    fn set_checked(&self, f: impl FnOnce(&mut SimulationParameters)) -> Result<()> {
        self.update_params(|p| {
            let mut candidate = *p;
            f(&mut candidate);
            candidate.validate()?;
            *p = candidate;
            Ok(())
        })
    }

    pub fn kind_counts(&self) -> KindCounts {
        let mut counts = KindCounts::default();
        for (_, cell) in self.cells() {
            match cell.tag() {
                CellTag::Node => counts.nodes += 1,
                CellTag::ExcitatoryLink => counts.excitatory_links += 1,
                CellTag::InhibitoryLink => counts.inhibitory_links += 1,
                CellTag::ThresholdInhibitoryLink => counts.threshold_inhibitory_links += 1,
                CellTag::Oscillator => counts.oscillators += 1,
            }
        }
        counts
    }

    pub fn read_binary<R: Read>(r: &mut R) -> Result<Self> {
        let automaton = Automaton::<Cell>::read_binary(r)?;
        automaton.params().validate().map_err(|e| match e {
            Error::InvalidParameter(msg) => Error::format(format!("stored parameters: {msg}")),
            other => other,
        })?;
        Ok(Self { automaton })
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut w = BufWriter::new(File::create(path)?);
        self.write_binary(&mut w)?;
        w.flush()?;
        info!(path = %path.display(), "network saved");
        Ok(())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut r = BufReader::new(File::open(path)?);
        let network = Self::read_binary(&mut r)?;
        info!(path = %path.display(), cells = network.len(), "network loaded");
        Ok(network)
    }
}
