use crate::arena::CellIndex;
use crate::automaton::Diagnostics;
use crate::cell::CellTag;
use crate::network::{KindCounts, SimulationNetwork};
use crate::params::SimulationParameters;

#[cfg(feature = "serde")]
use serde::Serialize;

/// A read-only snapshot of a network for display.
///
/// Design intent:
/// - Observers cannot mutate or step the network.
/// - Snapshotting is on-demand and allocates; ticking is unaffected.
/// - Values come from the former buffer, i.e. the last completed tick.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct NetworkSnapshot {
    pub ticks: u64,
    pub params: SimulationParameters,
    pub diagnostics: Diagnostics,
    pub kinds: KindCounts,
    pub cells: Vec<CellReadout>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CellReadout {
    pub index: CellIndex,
    pub tag: CellTag,
    pub output: f64,
    pub running_average: f64,
    pub frozen: bool,
}

impl NetworkSnapshot {
    /// Cells whose output is at least `level`, strongest first.
    pub fn active(&self, level: f64) -> Vec<&CellReadout> {
        let mut hot: Vec<_> = self.cells.iter().filter(|c| c.output >= level).collect();
        hot.sort_by(|a, b| b.output.total_cmp(&a.output));
        hot
    }

    pub fn mean_output(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        self.cells.iter().map(|c| c.output).sum::<f64>() / self.cells.len() as f64
    }
}

pub struct NetworkAdapter<'a> {
    network: &'a SimulationNetwork,
}

impl<'a> NetworkAdapter<'a> {
    pub fn new(network: &'a SimulationNetwork) -> Self {
        Self { network }
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        let cells = self
            .network
            .cells()
            .into_iter()
            .map(|(index, cell)| CellReadout {
                index,
                tag: cell.tag(),
                output: cell.output,
                running_average: cell.running_average,
                frozen: cell.frozen,
            })
            .collect();

        NetworkSnapshot {
            ticks: self.network.tick_count(),
            params: self.network.params(),
            diagnostics: self.network.diagnostics(),
            kinds: self.network.kind_counts(),
            cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    #[test]
    fn snapshot_reflects_last_completed_tick() {
        let net = SimulationNetwork::default();
        let osc = net.add_node(Cell::oscillator(1, 1, 0)).unwrap();
        let node = net.add_node(Cell::node(0.5, 0.5)).unwrap();
        net.add_edge(node, osc).unwrap();
        net.step().unwrap();

        let snap = NetworkAdapter::new(&net).snapshot();
        assert_eq!(snap.ticks, 1);
        assert_eq!(snap.cells.len(), 2);
        assert_eq!(snap.diagnostics.edge_count, 1);
        assert_eq!(snap.kinds.oscillators, 1);
        assert_eq!(snap.cells[0].tag, CellTag::Oscillator);
        assert_eq!(snap.cells[0].output, 1.0);

        let hot = snap.active(0.5);
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].index, osc);
        assert!((snap.mean_output() - 0.5 * (1.0 + snap.cells[1].output)).abs() < 1e-12);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_serializes_to_json() {
        let net = SimulationNetwork::default();
        net.add_node(Cell::oscillator(0, 1, 0)).unwrap();
        net.step().unwrap();

        let snap = NetworkAdapter::new(&net).snapshot();
        let json: serde_json::Value = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["ticks"], 1);
        assert_eq!(json["kinds"]["oscillators"], 1);
        assert_eq!(json["cells"][0]["tag"], "Oscillator");
        assert_eq!(json["cells"][0]["output"], 1.0);
    }
}
