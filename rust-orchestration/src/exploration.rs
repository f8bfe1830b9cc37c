use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex},
};

use log::debug;
use serde::{Deserialize, Serialize};
use sylva_blueprints::{ExplorationReportMessage, SystemModelMessage};
use sylva_core::{Candidate, DesignSpecification, InfeasibilityKind, SearchStrategyKind, TieBreak};

use crate::evaluation::{EvaluatedCandidate, FeasibleDesign, Outcome};

/// Orders two candidates that are otherwise equal.
pub fn choice_order(tie_break: TieBreak, lhs: &Candidate, rhs: &Candidate) -> Ordering {
    match tie_break {
        TieBreak::LowestChoice => lhs.cmp(rhs),
        TieBreak::HighestChoice => rhs.cmp(lhs),
    }
}

/// The running set of non dominated feasible designs.
///
/// Designs with identical objective vectors are represented once, by the one
/// preferred by the tie break, which makes the set independent of the order
/// designs are offered in.
#[derive(Debug, Clone)]
pub struct ParetoFront {
    specification: Arc<DesignSpecification>,
    tie_break: TieBreak,
    designs: Vec<FeasibleDesign>,
}

impl ParetoFront {
    pub fn new(specification: Arc<DesignSpecification>, tie_break: TieBreak) -> ParetoFront {
        ParetoFront {
            specification,
            tie_break,
            designs: Vec::new(),
        }
    }

    /// Inserts `design` unless it is dominated. Returns whether the front changed.
    pub fn offer(&mut self, design: &FeasibleDesign) -> bool {
        let mut equal_at = None;
        for (i, other) in self.designs.iter().enumerate() {
            match self
                .specification
                .dominance_cmp(&design.objective_vector, &other.objective_vector)
            {
                Some(Ordering::Greater) => return false,
                Some(Ordering::Equal) => {
                    equal_at = Some(i);
                    break;
                }
                _ => {}
            }
        }
        if let Some(i) = equal_at {
            let preferred = choice_order(
                self.tie_break,
                &design.model.candidate,
                &self.designs[i].model.candidate,
            ) == Ordering::Less;
            if preferred {
                self.designs[i] = design.to_owned();
            }
            return preferred;
        }
        let spec = &self.specification;
        self.designs.retain(|other| {
            spec.dominance_cmp(&design.objective_vector, &other.objective_vector)
                != Some(Ordering::Less)
        });
        debug!(
            "Found a new solution with objectives: {}.",
            spec.objectives()
                .iter()
                .zip(design.objective_vector.iter())
                .map(|(o, v)| format!("{}: {}", o.id, v))
                .reduce(|s1, s2| format!("{}, {}", s1, s2))
                .unwrap_or("None".to_owned())
        );
        self.designs.push(design.to_owned());
        true
    }

    pub fn len(&self) -> usize {
        self.designs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.designs.is_empty()
    }

    /// The designs ranked by weighted score, ties broken on the choice vector.
    pub fn ranked(&self) -> Vec<FeasibleDesign> {
        let mut designs = self.designs.to_owned();
        designs.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| choice_order(self.tie_break, &a.model.candidate, &b.model.candidate))
        });
        designs
    }
}

/// How a candidate compares during local search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rank {
    Feasible(f64),
    Infeasible,
}

/// What the strategies and the engine know about the search so far.
///
/// The engine owns the bookkeeping: candidates are claimed when proposed and
/// recorded once evaluated, in proposal order. Tallies span every profile;
/// `dimensions` are those of the profile being searched.
#[derive(Debug)]
pub struct SearchState {
    profile: usize,
    dimensions: Vec<usize>,
    tie_break: TieBreak,
    claimed: HashSet<Candidate>,
    ranks: HashMap<Candidate, Rank>,
    pub explored: u64,
    pub feasible: u64,
    pub infeasible: BTreeMap<InfeasibilityKind, u64>,
    /// Recorded evaluations since the Pareto front last changed.
    pub since_improvement: u64,
    front: Arc<Mutex<ParetoFront>>,
}

impl SearchState {
    pub fn new(dimensions: Vec<usize>, tie_break: TieBreak, front: Arc<Mutex<ParetoFront>>) -> SearchState {
        SearchState {
            profile: 0,
            dimensions,
            tie_break,
            claimed: HashSet::new(),
            ranks: HashMap::new(),
            explored: 0,
            feasible: 0,
            infeasible: BTreeMap::new(),
            since_improvement: 0,
            front,
        }
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn profile(&self) -> usize {
        self.profile
    }

    /// Moves the search on to another profile, keeping what was recorded.
    pub fn enter_profile(&mut self, profile: usize, dimensions: Vec<usize>) {
        self.profile = profile;
        self.dimensions = dimensions;
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn is_claimed(&self, candidate: &Candidate) -> bool {
        self.claimed.contains(candidate)
    }

    /// Marks a candidate as proposed. False when it already was.
    pub fn claim(&mut self, candidate: Candidate) -> bool {
        self.claimed.insert(candidate)
    }

    pub fn rank(&self, candidate: &Candidate) -> Option<Rank> {
        self.ranks.get(candidate).copied()
    }

    /// Whether `lhs` is strictly preferable to `rhs`; unevaluated candidates are
    /// never preferable.
    pub fn better(&self, lhs: &Candidate, rhs: &Candidate) -> bool {
        match (self.rank(lhs), self.rank(rhs)) {
            (Some(Rank::Feasible(a)), Some(Rank::Feasible(b))) => {
                match a.partial_cmp(&b).unwrap_or(Ordering::Equal) {
                    Ordering::Less => true,
                    Ordering::Greater => false,
                    Ordering::Equal => choice_order(self.tie_break, lhs, rhs) == Ordering::Less,
                }
            }
            (Some(Rank::Feasible(_)), Some(Rank::Infeasible) | None) => true,
            _ => false,
        }
    }

    /// Accounts one evaluated candidate and folds it into the Pareto front.
    pub fn record(&mut self, evaluated: &EvaluatedCandidate) {
        self.explored += 1;
        let improved = match &evaluated.outcome {
            Outcome::Feasible(design) => {
                self.feasible += 1;
                self.ranks
                    .insert(evaluated.candidate.to_owned(), Rank::Feasible(design.score));
                self.front
                    .lock()
                    .map(|mut f| f.offer(design))
                    .unwrap_or(false)
            }
            Outcome::Infeasible(reason) => {
                *self.infeasible.entry(reason.kind()).or_insert(0) += 1;
                self.ranks
                    .insert(evaluated.candidate.to_owned(), Rank::Infeasible);
                false
            }
        };
        if improved {
            self.since_improvement = 0;
        } else {
            self.since_improvement += 1;
        }
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every candidate of the space was evaluated.
    Exhausted,
    /// A local search found no improving move and has no restart left.
    Converged,
    IterationBudget,
    TimeBudget,
    Stalled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::Exhausted => "exhausted",
            Termination::Converged => "converged",
            Termination::IterationBudget => "iteration_budget",
            Termination::TimeBudget => "time_budget",
            Termination::Stalled => "stalled",
        };
        write!(f, "{}", s)
    }
}

/// Terminal output of a search.
///
/// Counts are always present, also when no feasible design was found, so an
/// over constrained specification can be diagnosed from the tally.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorationReport {
    pub strategy: SearchStrategyKind,
    pub termination: Termination,
    pub explored: u64,
    pub feasible: u64,
    pub infeasible: BTreeMap<InfeasibilityKind, u64>,
    /// Non dominated designs, best ranked first.
    pub pareto_front: Vec<FeasibleDesign>,
}

impl ExplorationReport {
    pub fn best(&self) -> Option<&FeasibleDesign> {
        self.pareto_front.first()
    }

    pub fn infeasible_total(&self) -> u64 {
        self.infeasible.values().sum()
    }

    pub fn to_message(&self) -> ExplorationReportMessage {
        ExplorationReportMessage {
            strategy: self.strategy.to_string(),
            termination: self.termination.to_string(),
            explored: self.explored,
            feasible: self.feasible,
            infeasible: self.infeasible.to_owned(),
            pareto_front: self
                .pareto_front
                .iter()
                .map(|d| SystemModelMessage::from_model(&d.model, &d.metrics, &d.objective_vector))
                .collect(),
        }
    }
}

impl fmt::Display for ExplorationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "explored {} candidates ({}): {} feasible, {} infeasible",
            self.explored,
            self.termination,
            self.feasible,
            self.infeasible_total()
        )?;
        for (kind, n) in &self.infeasible {
            writeln!(f, "  {}: {}", kind, n)?;
        }
        for (i, d) in self.pareto_front.iter().enumerate() {
            let bindings = d
                .model
                .bindings
                .iter()
                .map(|b| {
                    let instances = b
                        .instances
                        .iter()
                        .map(|i| {
                            format!(
                                "{}@{}",
                                i.implementation.name,
                                i.unit.as_deref().unwrap_or("-")
                            )
                        })
                        .collect::<Vec<_>>()
                        .join(",");
                    format!("{}={}", b.actor, instances)
                })
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "  #{} score {}: {}", i, d.score, bindings)?;
        }
        Ok(())
    }
}
