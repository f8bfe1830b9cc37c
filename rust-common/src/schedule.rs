use log::debug;
use sylva_core::{AnalysisError, DataflowGraph, RepetitionVector, Schedule};
use thiserror::Error;

/// Why a firing sequence is not a valid periodic schedule of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("firing {position} names unknown actor '{actor}'")]
    UnknownActor { position: usize, actor: String },
    #[error("firing {position} of '{actor}' reads edge {edge} without enough tokens")]
    Starved {
        position: usize,
        actor: String,
        edge: String,
    },
    #[error("actor '{actor}' fires {fired} times, expected {expected}")]
    CountMismatch {
        actor: String,
        expected: u64,
        fired: u64,
    },
}

/// Upper bound on the firings of one period that are scheduled and expanded.
pub const MAX_PERIOD_FIRINGS: u64 = 1 << 20;

/// Total firings of one period under `q`, refused above [`MAX_PERIOD_FIRINGS`].
pub fn period_firings(graph: &DataflowGraph, q: &RepetitionVector) -> Result<u64, AnalysisError> {
    let firings = graph
        .actors()
        .iter()
        .map(|a| q.get(&a.id).copied().unwrap_or(0))
        .try_fold(0u64, |acc, r| acc.checked_add(r))
        .ok_or(AnalysisError::RepetitionOverflow)?;
    if firings > MAX_PERIOD_FIRINGS {
        return Err(AnalysisError::PeriodTooLarge {
            firings,
            limit: MAX_PERIOD_FIRINGS,
        });
    }
    Ok(firings)
}

fn ready(graph: &DataflowGraph, tokens: &[u64], a: usize) -> bool {
    graph.incoming(a).all(|e| tokens[e] >= graph.consumption(e))
        && graph.outgoing(a).all(|e| match graph.edges()[e].capacity {
            Some(cap) => tokens[e] + graph.production(e) <= cap as u64,
            None => true,
        })
}

fn fire(graph: &DataflowGraph, tokens: &mut [u64], bounds: &mut [u64], a: usize) {
    for e in graph.incoming(a) {
        tokens[e] -= graph.consumption(e);
    }
    for e in graph.outgoing(a) {
        tokens[e] += graph.production(e);
        bounds[e] = bounds[e].max(tokens[e]);
    }
}

/// Builds one period of a static schedule by simulating the graph.
///
/// At every step the ready actor with the smallest id that still has firings
/// left in the period fires. An actor is ready when each input edge holds enough
/// tokens and no bounded output edge would overflow its capacity. When no actor
/// is ready before the period completes, the graph deadlocks. The per edge
/// buffer bound is the largest occupancy observed, initial tokens included.
/// Periods longer than [`MAX_PERIOD_FIRINGS`] are refused before any firing.
pub fn schedule(graph: &DataflowGraph, q: &RepetitionVector) -> Result<Schedule, AnalysisError> {
    let n = graph.actors().len();
    let mut remaining: Vec<u64> = graph
        .actors()
        .iter()
        .map(|a| q.get(&a.id).copied().unwrap_or(0))
        .collect();
    let total = period_firings(graph, q)?;
    let mut tokens: Vec<u64> = graph.edges().iter().map(|e| e.initial_tokens as u64).collect();
    let mut bounds = tokens.clone();
    let mut firings = Vec::with_capacity(total as usize);
    while (firings.len() as u64) < total {
        match (0..n).find(|a| remaining[*a] > 0 && ready(graph, &tokens, *a)) {
            Some(a) => {
                fire(graph, &mut tokens, &mut bounds, a);
                remaining[a] -= 1;
                firings.push(graph.actors()[a].id.to_owned());
            }
            None => {
                let blocked: Vec<String> = (0..n)
                    .filter(|a| remaining[*a] > 0)
                    .map(|a| graph.actors()[a].id.to_owned())
                    .collect();
                debug!(
                    "Deadlock after {} firings, blocked: {}",
                    firings.len(),
                    blocked.join(", ")
                );
                return Err(AnalysisError::DeadlockDetected { blocked });
            }
        }
    }
    Ok(Schedule {
        firings,
        buffer_bounds: bounds,
    })
}

/// Replays `firings` with token accounting and returns the largest occupancy
/// reached on every edge.
///
/// Fails as soon as a firing would read from an edge with too few tokens, or
/// when the firing counts differ from `q`.
pub fn replay(
    graph: &DataflowGraph,
    q: &RepetitionVector,
    firings: &[String],
) -> Result<Vec<u64>, ReplayError> {
    let mut tokens: Vec<u64> = graph.edges().iter().map(|e| e.initial_tokens as u64).collect();
    let mut bounds = tokens.clone();
    let mut fired = vec![0u64; graph.actors().len()];
    for (position, actor) in firings.iter().enumerate() {
        let a = graph
            .actor_index(actor)
            .ok_or_else(|| ReplayError::UnknownActor {
                position,
                actor: actor.to_owned(),
            })?;
        if let Some(e) = graph
            .incoming(a)
            .find(|e| tokens[*e] < graph.consumption(*e))
        {
            return Err(ReplayError::Starved {
                position,
                actor: actor.to_owned(),
                edge: graph.edges()[e].name(),
            });
        }
        fire(graph, &mut tokens, &mut bounds, a);
        fired[a] += 1;
    }
    for (a, actor) in graph.actors().iter().enumerate() {
        let expected = q.get(&actor.id).copied().unwrap_or(0);
        if fired[a] != expected {
            return Err(ReplayError::CountMismatch {
                actor: actor.id.to_owned(),
                expected,
                fired: fired[a],
            });
        }
    }
    Ok(bounds)
}
