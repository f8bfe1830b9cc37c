use std::collections::VecDeque;

use rand::{rngs::StdRng, Rng, SeedableRng};
use sylva_core::{Candidate, SearchStrategyKind, SolverOptions};

use crate::{
    evaluation::EvaluatedCandidate,
    exploration::{SearchState, Termination},
};

/// A pluggable way of walking the search space.
///
/// `propose` hands out the next unclaimed candidate or `None` when the strategy
/// has nothing to propose until the candidates it already proposed are
/// accepted. A `None` with nothing outstanding ends the search. The engine
/// accepts evaluations in proposal order, after recording them in the state, so
/// a strategy sees the same sequence of evaluations however they were computed.
pub trait SearchStrategy: Send {
    fn kind(&self) -> SearchStrategyKind;
    fn propose(&mut self, state: &SearchState) -> Option<Candidate>;
    fn accept(&mut self, state: &mut SearchState, evaluated: &EvaluatedCandidate);
    /// How the search ends when the strategy runs out of proposals.
    fn termination(&self) -> Termination;
}

/// Enumerates the mixed radix space of one profile in lexicographic order.
pub struct Exhaustive {
    profile: usize,
    dimensions: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl Exhaustive {
    pub fn new(profile: usize, dimensions: Vec<usize>) -> Exhaustive {
        let next = if dimensions.iter().all(|d| *d > 0) {
            Some(vec![0; dimensions.len()])
        } else {
            None
        };
        Exhaustive {
            profile,
            dimensions,
            next,
        }
    }

    fn successor(&self, mut digits: Vec<usize>) -> Option<Vec<usize>> {
        for i in (0..digits.len()).rev() {
            digits[i] += 1;
            if digits[i] < self.dimensions[i] {
                return Some(digits);
            }
            digits[i] = 0;
        }
        None
    }
}

impl SearchStrategy for Exhaustive {
    fn kind(&self) -> SearchStrategyKind {
        SearchStrategyKind::Exhaustive
    }

    fn propose(&mut self, state: &SearchState) -> Option<Candidate> {
        loop {
            let digits = self.next.take()?;
            self.next = self.successor(digits.to_owned());
            let c = Candidate::in_profile(self.profile, digits);
            if !state.is_claimed(&c) {
                return Some(c);
            }
        }
    }

    fn accept(&mut self, _state: &mut SearchState, _evaluated: &EvaluatedCandidate) {}

    fn termination(&self) -> Termination {
        Termination::Exhausted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Expand,
    Decide,
    Converged,
}

/// Steepest descent over single choice moves.
///
/// The whole neighbourhood of the current candidate is evaluated before
/// moving to its best member, and only when that member is strictly better.
/// Candidates evaluated earlier are compared from the state, not re-proposed.
pub struct Greedy {
    current: Candidate,
    phase: Phase,
    neighbourhood: Vec<Candidate>,
    queue: VecDeque<Candidate>,
    pending: usize,
}

impl Greedy {
    pub fn new(start: Candidate) -> Greedy {
        Greedy {
            current: start,
            phase: Phase::Start,
            neighbourhood: Vec::new(),
            queue: VecDeque::new(),
            pending: 0,
        }
    }

    pub fn restart(&mut self, start: Candidate) {
        self.current = start;
        self.phase = Phase::Start;
        self.neighbourhood.clear();
        self.queue.clear();
    }

    pub fn converged(&self) -> bool {
        self.phase == Phase::Converged && self.pending == 0
    }

    fn neighbours(&self, dimensions: &[usize]) -> Vec<Candidate> {
        let mut out = Vec::new();
        for (i, d) in dimensions.iter().enumerate() {
            for j in 0..*d {
                if j != self.current.choices[i] {
                    let mut choices = self.current.choices.to_owned();
                    choices[i] = j;
                    out.push(Candidate::in_profile(self.current.profile, choices));
                }
            }
        }
        out
    }
}

impl SearchStrategy for Greedy {
    fn kind(&self) -> SearchStrategyKind {
        SearchStrategyKind::Greedy
    }

    fn propose(&mut self, state: &SearchState) -> Option<Candidate> {
        loop {
            if let Some(c) = self.queue.pop_front() {
                if state.is_claimed(&c) {
                    continue;
                }
                self.pending += 1;
                return Some(c);
            }
            if self.pending > 0 {
                return None;
            }
            match self.phase {
                Phase::Start => {
                    self.phase = Phase::Expand;
                    if !state.is_claimed(&self.current) {
                        self.pending += 1;
                        return Some(self.current.to_owned());
                    }
                }
                Phase::Expand => {
                    self.neighbourhood = self.neighbours(state.dimensions());
                    self.queue = self.neighbourhood.iter().cloned().collect();
                    self.phase = Phase::Decide;
                }
                Phase::Decide => {
                    let mut best = &self.current;
                    for n in &self.neighbourhood {
                        if state.better(n, best) {
                            best = n;
                        }
                    }
                    if best != &self.current {
                        self.current = best.to_owned();
                        self.phase = Phase::Expand;
                    } else {
                        self.phase = Phase::Converged;
                    }
                }
                Phase::Converged => return None,
            }
        }
    }

    fn accept(&mut self, _state: &mut SearchState, _evaluated: &EvaluatedCandidate) {
        self.pending = self.pending.saturating_sub(1);
    }

    fn termination(&self) -> Termination {
        Termination::Converged
    }
}

/// Steepest descent restarted from seeded random starting points.
pub struct RandomRestart {
    profile: usize,
    greedy: Greedy,
    rng: StdRng,
    restarts_left: u64,
}

impl RandomRestart {
    pub fn new(profile: usize, dimensions: &[usize], restarts: u64, seed: u64) -> RandomRestart {
        let mut rng = StdRng::seed_from_u64(seed);
        let start = Self::sample(&mut rng, profile, dimensions);
        RandomRestart {
            profile,
            greedy: Greedy::new(start),
            rng,
            restarts_left: restarts.saturating_sub(1),
        }
    }

    fn sample(rng: &mut StdRng, profile: usize, dimensions: &[usize]) -> Candidate {
        Candidate::in_profile(
            profile,
            dimensions
                .iter()
                .map(|d| if *d > 1 { rng.gen_range(0..*d) } else { 0 })
                .collect(),
        )
    }

    fn fresh_start(&mut self, state: &SearchState) -> Candidate {
        let mut start = Self::sample(&mut self.rng, self.profile, state.dimensions());
        for _ in 0..64 {
            if !state.is_claimed(&start) {
                break;
            }
            start = Self::sample(&mut self.rng, self.profile, state.dimensions());
        }
        start
    }
}

impl SearchStrategy for RandomRestart {
    fn kind(&self) -> SearchStrategyKind {
        SearchStrategyKind::RandomRestart
    }

    fn propose(&mut self, state: &SearchState) -> Option<Candidate> {
        loop {
            if let Some(c) = self.greedy.propose(state) {
                return Some(c);
            }
            if !self.greedy.converged() || self.restarts_left == 0 {
                return None;
            }
            self.restarts_left -= 1;
            let start = self.fresh_start(state);
            self.greedy.restart(start);
        }
    }

    fn accept(&mut self, state: &mut SearchState, evaluated: &EvaluatedCandidate) {
        self.greedy.accept(state, evaluated);
    }

    fn termination(&self) -> Termination {
        Termination::Converged
    }
}

/// Builds the strategy searching one profile for an already resolved kind.
/// `Auto` falls back to random restart.
pub fn make_strategy(
    kind: SearchStrategyKind,
    options: &SolverOptions,
    profile: usize,
    dimensions: &[usize],
) -> Box<dyn SearchStrategy> {
    match kind {
        SearchStrategyKind::Exhaustive => Box::new(Exhaustive::new(profile, dimensions.to_vec())),
        SearchStrategyKind::Greedy => Box::new(Greedy::new(Candidate::in_profile(
            profile,
            vec![0; dimensions.len()],
        ))),
        SearchStrategyKind::RandomRestart | SearchStrategyKind::Auto => Box::new(
            RandomRestart::new(profile, dimensions, options.restarts, options.seed),
        ),
    }
}
