pub mod balance;
pub mod hsdf;
pub mod metrics;
pub mod parallelism;
pub mod schedule;

use std::sync::Arc;

use log::debug;
use sylva_core::{AnalysisError, DataflowGraph, RepetitionVector, Schedule};

use crate::hsdf::Hsdf;

pub use balance::repetition_vector;
pub use metrics::derive_metrics;
pub use parallelism::{load_balanced_profiles, within_effort};
pub use schedule::{period_firings, replay, schedule, ReplayError, MAX_PERIOD_FIRINGS};

/// A dataflow graph together with everything that follows from its topology
/// alone.
///
/// Aside from the graph itself, it includes liveness information: the
/// repetition vector, a periodic admissible static schedule with its buffer
/// bounds and the homogeneous expansion used for timing. None of it depends on
/// implementation choices, so one analysis serves every candidate mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysedDataflowGraph {
    pub graph: Arc<DataflowGraph>,
    pub repetition_vector: RepetitionVector,
    pub schedule: Schedule,
    pub hsdf: Hsdf,
}

/// Balances, schedules and expands `graph`.
pub fn analyse(graph: Arc<DataflowGraph>) -> Result<AnalysedDataflowGraph, AnalysisError> {
    let repetition_vector = balance::repetition_vector(&graph)?;
    let schedule = schedule::schedule(&graph, &repetition_vector)?;
    let hsdf = Hsdf::expand(&graph, &repetition_vector)?;
    debug!(
        "Analysed graph with {} actors: {} firings per period, {} precedences",
        graph.actors().len(),
        schedule.firings.len(),
        hsdf.arcs.len()
    );
    Ok(AnalysedDataflowGraph {
        graph,
        repetition_vector,
        schedule,
        hsdf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylva_core::{Actor, Edge};

    #[test]
    fn analysis_reports_the_first_failure() {
        let inconsistent = DataflowGraph::new(
            vec![
                Actor::new("A").with_input("in", 1).with_output("out", 2),
                Actor::new("B").with_input("in", 1).with_output("out", 1),
            ],
            vec![
                Edge::new(("A", "out"), ("B", "in")),
                Edge::new(("B", "out"), ("A", "in")),
            ],
        )
        .expect("valid graph");
        assert!(matches!(
            analyse(Arc::new(inconsistent)),
            Err(AnalysisError::InconsistentRates { .. })
        ));
        let live = DataflowGraph::new(
            vec![
                Actor::new("A").with_input("in", 1).with_output("out", 1),
                Actor::new("B").with_input("in", 1).with_output("out", 1),
            ],
            vec![
                Edge::new(("A", "out"), ("B", "in")),
                Edge::new(("B", "out"), ("A", "in")).with_initial_tokens(1),
            ],
        )
        .expect("valid graph");
        let analysed = analyse(Arc::new(live)).expect("schedulable");
        assert_eq!(analysed.schedule.firings, vec!["A", "B"]);
        assert_eq!(analysed.hsdf.nodes.len(), 2);
        assert_eq!(
            replay(&analysed.graph, &analysed.repetition_vector, &analysed.schedule.firings),
            Ok(analysed.schedule.buffer_bounds.clone())
        );
    }
}
