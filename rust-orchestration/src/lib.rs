pub mod engine;
pub mod evaluation;
pub mod exploration;
pub mod strategies;

pub use engine::{resolve_strategy, DseEngine};
pub use evaluation::{EvaluatedCandidate, Evaluator, FeasibleDesign, Outcome, SearchSpace};
pub use exploration::{ExplorationReport, ParetoFront, Rank, SearchState, Termination};
pub use strategies::{make_strategy, Exhaustive, Greedy, RandomRestart, SearchStrategy};

use sylva_blueprints::ExplorationInput;
use sylva_core::ConfigurationError;

/// Initialises an engine from a loaded input bundle.
pub fn engine_for(input: ExplorationInput) -> Result<DseEngine, ConfigurationError> {
    DseEngine::init(
        input.graph,
        input.catalog,
        input.fabric,
        input.specification,
        input.options,
    )
}
