pub mod dataflow;
pub mod error;
pub mod fabric;
pub mod fimp;
pub mod specification;
pub mod system;

use derive_builder::Builder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use dataflow::{Actor, DataTokenType, DataflowGraph, Edge, Port, PortDirection, PortRef};
pub use error::{
    AnalysisError, ConfigurationError, Infeasibility, InfeasibilityKind, MappingError,
    StructuralError,
};
pub use fabric::{FabricResourceModel, ResourceUnit};
pub use fimp::{Implementation, ImplementationCatalog};
pub use specification::{
    DesignSpecification, Direction, Evaluation, Metric, SystemConstraint, SystemMetrics,
    SystemOptimizationObjective,
};
pub use system::{ActorBinding, Candidate, MappingOption, RepetitionVector, Schedule, SystemModel};

/// The capability of anything that realizes an actor on the fabric at a known cost.
///
/// Analyses that only need costs are written against this trait so they do not
/// depend on where the numbers come from. All costs are per firing except area
/// and power, which are paid once for the resident implementation.
pub trait CostedImplementation {
    fn area(&self) -> f64;
    fn power(&self) -> f64;
    fn energy_per_firing(&self) -> f64;
    /// Cycles from the first input read to the last output written.
    fn latency(&self) -> u64;
    fn input_phase(&self) -> u64 {
        1
    }
    fn output_phase(&self) -> u64 {
        1
    }
    fn unit_type(&self) -> &str;
    fn units(&self) -> u32;
}

/// An optional collaborator that refines the static metrics of a system model,
/// typically a floorplanner returning placed area and critical path estimates.
///
/// Refiners are consulted during candidate evaluation from any number of
/// threads and must behave as pure functions of their arguments.
pub trait MetricRefiner: Send + Sync {
    fn unique_identifier(&self) -> String;
    fn refine(&self, model: &SystemModel, metrics: SystemMetrics) -> SystemMetrics;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategyKind {
    /// Exhaustive when the space is small enough, random restart otherwise.
    #[default]
    Auto,
    Exhaustive,
    Greedy,
    RandomRestart,
}

impl std::fmt::Display for SearchStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SearchStrategyKind::Auto => "auto",
            SearchStrategyKind::Exhaustive => "exhaustive",
            SearchStrategyKind::Greedy => "greedy",
            SearchStrategyKind::RandomRestart => "random_restart",
        };
        write!(f, "{}", s)
    }
}

/// How candidates with equal rank are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The lexicographically smallest choice vector wins.
    #[default]
    LowestChoice,
    HighestChoice,
}

/// The search configuration handed to the engine at start.
///
/// Zero budgets mean unbounded. Nothing here is global: two engines with
/// different options can run side by side.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize, JsonSchema)]
#[builder(default)]
#[serde(default, deny_unknown_fields)]
pub struct SolverOptions {
    pub strategy: SearchStrategyKind,
    /// Upper bound on evaluated candidates.
    pub max_iterations: u64,
    pub time_limit_ms: u64,
    /// Consecutive evaluations without improvement of the Pareto set before
    /// stopping.
    pub stall_limit: u64,
    /// Largest space the auto strategy still enumerates exhaustively.
    pub exhaustive_limit: u64,
    pub tie_break: TieBreak,
    /// Threads evaluating candidates. One runs the plain sequential loop.
    pub workers: usize,
    /// Candidates proposed per generation.
    pub batch_size: usize,
    /// Random starting points of the random restart strategy.
    pub restarts: u64,
    pub seed: u64,
    /// Percentage of the load balanced parallelism profiles searched, from the
    /// sequential one onwards. At least one profile is always searched.
    pub effort: u8,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            strategy: SearchStrategyKind::Auto,
            max_iterations: 0,
            time_limit_ms: 0,
            stall_limit: 0,
            exhaustive_limit: 4096,
            tie_break: TieBreak::LowestChoice,
            workers: 1,
            batch_size: 32,
            restarts: 8,
            seed: 0,
            effort: 10,
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.workers == 0 {
            return Err(ConfigurationError::InvalidOptions(
                "at least one worker is required".to_owned(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigurationError::InvalidOptions(
                "the batch size must be positive".to_owned(),
            ));
        }
        if self.effort == 0 || self.effort > 100 {
            return Err(ConfigurationError::InvalidOptions(format!(
                "the effort is a percentage in 1..=100, got {}",
                self.effort
            )));
        }
        if self.restarts == 0
            && matches!(
                self.strategy,
                SearchStrategyKind::RandomRestart | SearchStrategyKind::Auto
            )
        {
            return Err(ConfigurationError::InvalidOptions(
                "random restart needs at least one restart".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_and_reject_unknown_keys() {
        let opts: SolverOptions = serde_json::from_str(r#"{"strategy": "greedy", "workers": 4}"#)
            .expect("valid options");
        assert_eq!(opts.strategy, SearchStrategyKind::Greedy);
        assert_eq!(opts.workers, 4);
        assert_eq!(opts.exhaustive_limit, 4096);
        assert!(serde_json::from_str::<SolverOptions>(r#"{"strategyy": "greedy"}"#).is_err());
        assert!(serde_json::from_str::<SolverOptions>(r#"{"strategy": "annealing"}"#).is_err());
    }

    #[test]
    fn builder_starts_from_defaults() {
        let opts = SolverOptionsBuilder::default()
            .strategy(SearchStrategyKind::Exhaustive)
            .max_iterations(10)
            .build()
            .expect("all fields have defaults");
        assert_eq!(opts.batch_size, SolverOptions::default().batch_size);
        assert_eq!(opts.max_iterations, 10);
        assert!(opts.validate().is_ok());
        let bad = SolverOptionsBuilder::default()
            .workers(0)
            .build()
            .expect("all fields have defaults");
        assert!(matches!(
            bad.validate(),
            Err(ConfigurationError::InvalidOptions(_))
        ));
        for effort in [0, 101] {
            let opts = SolverOptionsBuilder::default()
                .effort(effort)
                .build()
                .expect("all fields have defaults");
            assert!(opts.validate().is_err());
        }
        let all: SolverOptions =
            serde_json::from_str(r#"{"effort": 100}"#).expect("valid options");
        assert_eq!(all.effort, 100);
        assert!(all.validate().is_ok());
    }
}
