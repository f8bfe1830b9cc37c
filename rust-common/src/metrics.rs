use petgraph::{algo::bellman_ford, Graph};
use sylva_core::{ActorBinding, CostedImplementation, FabricResourceModel, SystemMetrics};

use crate::AnalysedDataflowGraph;

/// A firing level precedence used for timing: `dst` may start `weight` cycles
/// after `src` started, `delay` periods later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimedArc {
    src: usize,
    dst: usize,
    weight: u64,
    delay: u64,
}

/// Cycles between the start of a producer firing and the earliest start of the
/// consumer firing reading its tokens.
///
/// The consumer may start once the producer's output phase has begun and the
/// tokens crossed the interconnect, provided its own input phase does not end
/// before the producer finishes writing.
fn precedence_delay<I: CostedImplementation>(src: &I, dst: &I, communication: u64) -> u64 {
    let first_output = src.latency() - src.output_phase() + 1;
    let last_read = src.latency().saturating_sub(dst.input_phase());
    communication + first_output.max(last_read)
}

fn timed_arcs(
    analysed: &AnalysedDataflowGraph,
    bindings: &[ActorBinding],
    fabric: &FabricResourceModel,
) -> Vec<TimedArc> {
    let hsdf = &analysed.hsdf;
    let mut arcs: Vec<TimedArc> = hsdf
        .arcs
        .iter()
        .map(|a| {
            let (src_actor, src_firing) = hsdf.nodes[a.src];
            let (dst_actor, dst_firing) = hsdf.nodes[a.dst];
            let src = bindings[src_actor].instance_of(src_firing);
            let dst = bindings[dst_actor].instance_of(dst_firing);
            let communication =
                fabric.communication_delay(src.unit.as_deref(), dst.unit.as_deref());
            TimedArc {
                src: a.src,
                dst: a.dst,
                weight: precedence_delay(&src.implementation, &dst.implementation, communication),
                delay: a.delay,
            }
        })
        .collect();
    // firings dealt to the same instance run one after the other
    for (actor, binding) in bindings.iter().enumerate() {
        let n = hsdf.firings(actor);
        let count = binding.instances.len() as u64;
        for (i, instance) in binding.instances.iter().enumerate() {
            let firings: Vec<u64> = (i as u64..n).step_by(count as usize).collect();
            let latency = instance.implementation.latency();
            for (j, k) in firings.iter().enumerate() {
                let wraps = j + 1 == firings.len();
                let next = if wraps { firings[0] } else { firings[j + 1] };
                arcs.push(TimedArc {
                    src: hsdf.node(actor, *k),
                    dst: hsdf.node(actor, next),
                    weight: latency,
                    delay: if wraps { 1 } else { 0 },
                });
            }
        }
    }
    arcs
}

/// Firings of one period executed by the `instance`-th of `count` instances.
fn dealt(firings: u64, count: usize, instance: usize) -> u64 {
    let (count, instance) = (count as u64, instance as u64);
    if instance >= firings {
        0
    } else {
        (firings - instance + count - 1) / count
    }
}

/// As soon as possible completion time of one period, starting from idle.
fn makespan(analysed: &AnalysedDataflowGraph, bindings: &[ActorBinding], arcs: &[TimedArc]) -> u64 {
    let hsdf = &analysed.hsdf;
    let mut incoming: Vec<Vec<(usize, u64)>> = vec![Vec::new(); hsdf.nodes.len()];
    for a in arcs.iter().filter(|a| a.delay == 0) {
        incoming[a.dst].push((a.src, a.weight));
    }
    let mut start = vec![0u64; hsdf.nodes.len()];
    let mut fired = vec![0u64; bindings.len()];
    let mut end = 0;
    // the static schedule is a topological order of the zero delay arcs
    for actor_id in &analysed.schedule.firings {
        let Some(actor) = analysed.graph.actor_index(actor_id) else {
            continue;
        };
        let k = fired[actor];
        let v = hsdf.node(actor, k);
        fired[actor] += 1;
        start[v] = incoming[v]
            .iter()
            .map(|(u, w)| start[*u] + w)
            .max()
            .unwrap_or(0);
        end = end.max(start[v] + bindings[actor].instance_of(k).implementation.latency());
    }
    end
}

/// True when some cycle has a ratio of weight to delay above `num / den`.
fn ratio_exceeded(nodes: usize, arcs: &[TimedArc], num: f64, den: f64) -> bool {
    let mut g: Graph<(), f64> = Graph::with_capacity(nodes + 1, arcs.len() + nodes);
    let idx: Vec<_> = (0..=nodes).map(|_| g.add_node(())).collect();
    for a in arcs {
        g.add_edge(
            idx[a.src],
            idx[a.dst],
            num * a.delay as f64 - den * a.weight as f64,
        );
    }
    for v in 0..nodes {
        g.add_edge(idx[nodes], idx[v], 0.0);
    }
    bellman_ford(&g, idx[nodes]).is_err()
}

/// Maximum cycle ratio of the timing graph, i.e. the steady state sample
/// interval of the periodic execution.
fn sample_interval(analysed: &AnalysedDataflowGraph, bindings: &[ActorBinding], arcs: &[TimedArc]) -> f64 {
    let nodes = analysed.hsdf.nodes.len();
    // each instance cycle alone is a lower bound
    let lower = bindings
        .iter()
        .enumerate()
        .flat_map(|(a, b)| {
            let n = analysed.hsdf.firings(a);
            let count = b.instances.len();
            b.instances
                .iter()
                .enumerate()
                .map(move |(i, inst)| dealt(n, count, i) * inst.implementation.latency())
        })
        .max()
        .unwrap_or(0) as f64;
    if !ratio_exceeded(nodes, arcs, lower, 1.0) {
        return lower;
    }
    let mut lo = lower;
    let mut hi = arcs.iter().map(|a| a.weight as f64).sum::<f64>();
    for _ in 0..64 {
        let mid = (lo + hi) / 2.0;
        if ratio_exceeded(nodes, arcs, mid, 1.0) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let total_delay = arcs.iter().map(|a| a.delay).sum::<u64>().clamp(1, 256);
    let tolerance = 1e-6 * hi.max(1.0);
    for den in 1..=total_delay {
        let num = (hi * den as f64).round();
        let candidate = num / den as f64;
        if (candidate - hi).abs() <= tolerance
            && candidate > lo - tolerance
            && !ratio_exceeded(nodes, arcs, num, den as f64)
        {
            return candidate;
        }
    }
    hi
}

/// Static metrics of a candidate: costs summed over every bound instance and
/// timing derived from the homogeneous expansion.
pub fn derive_metrics(
    analysed: &AnalysedDataflowGraph,
    bindings: &[ActorBinding],
    fabric: &FabricResourceModel,
) -> SystemMetrics {
    let arcs = timed_arcs(analysed, bindings, fabric);
    let interval = sample_interval(analysed, bindings, &arcs);
    let instances = || bindings.iter().flat_map(|b| b.instances.iter());
    SystemMetrics {
        area: instances().map(|i| i.implementation.area()).sum(),
        power: instances().map(|i| i.implementation.power()).sum(),
        energy: bindings
            .iter()
            .flat_map(|b| {
                let n = analysed.repetition_vector.get(&b.actor).copied().unwrap_or(0);
                let count = b.instances.len();
                b.instances.iter().enumerate().map(move |(i, inst)| {
                    dealt(n, count, i) as f64 * inst.implementation.energy_per_firing()
                })
            })
            .sum(),
        latency: makespan(analysed, bindings, &arcs),
        sample_interval: interval,
        throughput: if interval > 0.0 { 1.0 / interval } else { 0.0 },
        buffer_tokens: analysed.schedule.buffer_bounds.iter().sum(),
    }
}
