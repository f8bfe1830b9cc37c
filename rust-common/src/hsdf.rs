use std::collections::HashSet;

use petgraph::Graph;
use sylva_core::{AnalysisError, DataflowGraph, RepetitionVector};

use crate::schedule::period_firings;

/// A precedence between two firings.
///
/// `delay` counts the periods separating the producing firing from the
/// consuming one: zero when both happen in the same period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HsdfArc {
    pub src: usize,
    pub dst: usize,
    pub delay: u64,
    /// The dataflow edge the tokens travel on.
    pub edge: usize,
}

/// Homogeneous expansion of a dataflow graph: one node per firing of a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hsdf {
    /// `(actor index, firing)` of every node.
    pub nodes: Vec<(usize, u64)>,
    offsets: Vec<usize>,
    pub arcs: Vec<HsdfArc>,
}

fn floor_div(a: i128, b: i128) -> i128 {
    let d = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        d - 1
    } else {
        d
    }
}

impl Hsdf {
    /// Expands `graph` under the repetition vector `q`.
    ///
    /// Token `t` read by the consumer on an edge with production `p`, consumption
    /// `c` and `d` initial tokens was written by the `(t - d) / p`-th production
    /// counted from the start of the current period; negative counts reach back
    /// into earlier periods. Parallel arcs between the same pair of firings with
    /// the same delay are merged.
    pub fn expand(graph: &DataflowGraph, q: &RepetitionVector) -> Result<Hsdf, AnalysisError> {
        let total = period_firings(graph, q)?;
        let reps: Vec<u64> = graph
            .actors()
            .iter()
            .map(|a| q.get(&a.id).copied().unwrap_or(0))
            .collect();
        let mut offsets = Vec::with_capacity(reps.len());
        let mut nodes = Vec::with_capacity(total as usize);
        for (a, r) in reps.iter().enumerate() {
            offsets.push(nodes.len());
            nodes.extend((0..*r).map(|k| (a, k)));
        }
        let mut seen = HashSet::new();
        let mut arcs = Vec::new();
        for (e, edge) in graph.edges().iter().enumerate() {
            let (src, dst) = graph.endpoints(e);
            let p = graph.production(e) as i128;
            let c = graph.consumption(e) as i128;
            let d = edge.initial_tokens as i128;
            let q_src = reps[src] as i128;
            if q_src == 0 {
                continue;
            }
            for j in 0..reps[dst] as i128 {
                for t in j * c..(j + 1) * c {
                    let producing = floor_div(t - d, p);
                    let shift = floor_div(producing, q_src);
                    let firing = producing - shift * q_src;
                    let arc = HsdfArc {
                        src: offsets[src] + firing as usize,
                        dst: offsets[dst] + j as usize,
                        delay: (-shift) as u64,
                        edge: e,
                    };
                    if seen.insert((arc.src, arc.dst, arc.delay)) {
                        arcs.push(arc);
                    }
                }
            }
        }
        Ok(Hsdf {
            nodes,
            offsets,
            arcs,
        })
    }

    /// Node of the `firing`-th firing of actor `actor` in a period.
    pub fn node(&self, actor: usize, firing: u64) -> usize {
        self.offsets[actor] + firing as usize
    }

    /// Firings of `actor` in a period.
    pub fn firings(&self, actor: usize) -> u64 {
        let end = self
            .offsets
            .get(actor + 1)
            .copied()
            .unwrap_or(self.nodes.len());
        (end - self.offsets[actor]) as u64
    }

    /// The expansion as a petgraph graph with `(actor, firing)` node weights
    /// and inter-period delays as edge weights.
    pub fn as_graph(&self) -> Graph<(usize, u64), u64> {
        let mut g = Graph::with_capacity(self.nodes.len(), self.arcs.len());
        let idx: Vec<_> = self.nodes.iter().map(|n| g.add_node(*n)).collect();
        for arc in &self.arcs {
            g.add_edge(idx[arc.src], idx[arc.dst], arc.delay);
        }
        g
    }
}
