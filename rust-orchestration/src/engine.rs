use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use log::{debug, info};
use rayon::prelude::*;
use sylva_common::{analyse, load_balanced_profiles, within_effort, AnalysedDataflowGraph};
use sylva_core::{
    AnalysisError, Candidate, ConfigurationError, DataflowGraph, DesignSpecification,
    FabricResourceModel, ImplementationCatalog, MetricRefiner, SearchStrategyKind, SolverOptions,
};

use crate::{
    evaluation::{EvaluatedCandidate, Evaluator, SearchSpace},
    exploration::{ExplorationReport, ParetoFront, SearchState, Termination},
    strategies::make_strategy,
};

/// Picks the concrete strategy for `auto`.
pub fn resolve_strategy(options: &SolverOptions, space: &SearchSpace) -> SearchStrategyKind {
    match options.strategy {
        SearchStrategyKind::Auto => match space.size() {
            Some(n) if n <= options.exhaustive_limit => SearchStrategyKind::Exhaustive,
            _ => SearchStrategyKind::RandomRestart,
        },
        other => other,
    }
}

/// Parallelism profiles worth searching: load balanced, small enough for the
/// fabric to host every instance, and within the effort.
fn parallelism_profiles(
    analysed: &AnalysedDataflowGraph,
    fabric: &FabricResourceModel,
    effort: u8,
) -> Vec<Vec<u64>> {
    let reps: Vec<u64> = analysed
        .graph
        .actors()
        .iter()
        .map(|a| analysed.repetition_vector.get(&a.id).copied().unwrap_or(0))
        .collect();
    let capacity = fabric.total_capacity();
    let hosted: Vec<Vec<u64>> = load_balanced_profiles(&reps)
        .into_iter()
        .filter(|p| p.iter().sum::<u64>() <= capacity)
        .collect();
    within_effort(hosted, effort)
}

/// Design space exploration over implementation selection, parallel instances
/// and fabric mapping.
///
/// Everything the search depends on is handed over at `init` and never
/// mutated afterwards, so independent engines can run side by side. The graph
/// is analysed once; a failed analysis is reported on every candidate instead
/// of aborting the run. Profiles are searched one after the other, sharing
/// budgets, tallies and the Pareto front.
pub struct DseEngine {
    options: SolverOptions,
    strategy: SearchStrategyKind,
    space: Arc<SearchSpace>,
    fabric: Arc<FabricResourceModel>,
    specification: Arc<DesignSpecification>,
    analysis: Result<Arc<AnalysedDataflowGraph>, AnalysisError>,
    refiner: Option<Arc<dyn MetricRefiner>>,
    pool: Option<rayon::ThreadPool>,
    front: Arc<Mutex<ParetoFront>>,
}

impl DseEngine {
    pub fn init(
        graph: DataflowGraph,
        catalog: ImplementationCatalog,
        fabric: FabricResourceModel,
        specification: DesignSpecification,
        options: SolverOptions,
    ) -> Result<DseEngine, ConfigurationError> {
        options.validate()?;
        catalog.validate_for(&graph)?;
        let space = SearchSpace::build(&graph, &catalog, &fabric)?;
        let analysis = analyse(Arc::new(graph)).map(Arc::new);
        let space = match &analysis {
            Ok(a) => {
                debug!("Repetition vector: {:?}", a.repetition_vector);
                space.with_profiles(parallelism_profiles(a, &fabric, options.effort))
            }
            Err(e) => {
                info!("Graph analysis failed, every candidate is infeasible: {}", e);
                space
            }
        };
        for (i, p) in space.profiles().iter().enumerate() {
            debug!("Parallelism profile {}: {:?}", i, p);
        }
        let strategy = resolve_strategy(&options, &space);
        let pool = if options.workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(options.workers)
                    .build()
                    .map_err(|e| ConfigurationError::InvalidOptions(e.to_string()))?,
            )
        } else {
            None
        };
        info!(
            "Initialised exploration of {} candidates in {} parallelism profile(s) with strategy {} and {} worker(s)",
            space
                .size()
                .map(|n| n.to_string())
                .unwrap_or("more than 2^64".to_owned()),
            space.profiles().len(),
            strategy,
            options.workers
        );
        let specification = Arc::new(specification);
        let front = Arc::new(Mutex::new(ParetoFront::new(
            specification.clone(),
            options.tie_break,
        )));
        Ok(DseEngine {
            options,
            strategy,
            space: Arc::new(space),
            fabric: Arc::new(fabric),
            specification,
            analysis,
            refiner: None,
            pool,
            front,
        })
    }

    pub fn with_refiner(mut self, refiner: Arc<dyn MetricRefiner>) -> DseEngine {
        debug!("Metrics refined by {}", refiner.unique_identifier());
        self.refiner = Some(refiner);
        self
    }

    /// The strategy the engine runs, with `auto` already resolved.
    pub fn strategy(&self) -> SearchStrategyKind {
        self.strategy
    }

    pub fn search_space(&self) -> &SearchSpace {
        &self.space
    }

    /// Shared handle to the running Pareto front. Readers lock it to observe a
    /// consistent snapshot while a search is in progress.
    pub fn front(&self) -> Arc<Mutex<ParetoFront>> {
        self.front.clone()
    }

    fn evaluator(&self) -> Evaluator {
        Evaluator::new(
            self.analysis.clone(),
            self.space.clone(),
            self.fabric.clone(),
            self.specification.clone(),
            self.refiner.clone(),
        )
    }

    /// Evaluates one candidate outside of a search.
    pub fn evaluate(&self, candidate: &Candidate) -> Result<EvaluatedCandidate, ConfigurationError> {
        if !self.space.contains(candidate) {
            return Err(ConfigurationError::InvalidOptions(format!(
                "candidate {:?} of profile {} is outside of the search space {:?}",
                candidate.choices,
                candidate.profile,
                self.space.dimensions(candidate.profile)
            )));
        }
        Ok(self.evaluator().evaluate(candidate))
    }

    fn evaluate_batch(&self, evaluator: &Evaluator, batch: &[Candidate]) -> Vec<EvaluatedCandidate> {
        match &self.pool {
            Some(pool) => pool.install(|| batch.par_iter().map(|c| evaluator.evaluate(c)).collect()),
            None => batch.iter().map(|c| evaluator.evaluate(c)).collect(),
        }
    }

    /// Runs the search to termination.
    ///
    /// Candidates are proposed in generations of at most `batch_size`,
    /// evaluated sequentially or on the worker pool, and recorded in proposal
    /// order. Budgets and the stall limit are checked between generations, so
    /// in flight evaluations always complete and are always recorded. A
    /// profile whose strategy runs out of proposals hands over to the next.
    pub fn run(&self) -> ExplorationReport {
        let started = Instant::now();
        let time_limit = Duration::from_millis(self.options.time_limit_ms);
        if let Ok(mut f) = self.front.lock() {
            *f = ParetoFront::new(self.specification.clone(), self.options.tie_break);
        }
        let evaluator = self.evaluator();
        let mut state = SearchState::new(
            self.space.dimensions(0),
            self.options.tie_break,
            self.front.clone(),
        );
        let mut termination = Termination::Exhausted;
        'profiles: for profile in 0..self.space.profiles().len() {
            let dimensions = self.space.dimensions(profile);
            debug!("Searching parallelism profile {} over {} slot(s)", profile, dimensions.len());
            let mut strategy = make_strategy(self.strategy, &self.options, profile, &dimensions);
            state.enter_profile(profile, dimensions);
            loop {
                let max_iterations = self.options.max_iterations;
                if max_iterations > 0 && state.explored >= max_iterations {
                    termination = Termination::IterationBudget;
                    break 'profiles;
                }
                if self.options.time_limit_ms > 0 && started.elapsed() >= time_limit {
                    termination = Termination::TimeBudget;
                    break 'profiles;
                }
                let mut room = self.options.batch_size as u64;
                if max_iterations > 0 {
                    room = room.min(max_iterations - state.explored);
                }
                let mut batch = Vec::new();
                while (batch.len() as u64) < room {
                    match strategy.propose(&state) {
                        Some(c) => {
                            if state.claim(c.to_owned()) {
                                batch.push(c);
                            }
                        }
                        None => break,
                    }
                }
                if batch.is_empty() {
                    termination = strategy.termination();
                    break;
                }
                for e in &self.evaluate_batch(&evaluator, &batch) {
                    state.record(e);
                    strategy.accept(&mut state, e);
                }
                let stall_limit = self.options.stall_limit;
                if stall_limit > 0 && state.since_improvement >= stall_limit {
                    termination = Termination::Stalled;
                    break 'profiles;
                }
            }
        }
        let pareto_front = self.front.lock().map(|f| f.ranked()).unwrap_or_default();
        info!(
            "Exploration finished ({}) after {} candidates in {} ms: {} feasible, {} non dominated",
            termination,
            state.explored,
            started.elapsed().as_millis(),
            state.feasible,
            pareto_front.len()
        );
        ExplorationReport {
            strategy: self.strategy,
            termination,
            explored: state.explored,
            feasible: state.feasible,
            infeasible: state.infeasible,
            pareto_front,
        }
    }
}
