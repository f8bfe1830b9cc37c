use std::sync::Arc;

use sylva_common::{derive_metrics, AnalysedDataflowGraph};
use sylva_core::{
    ActorBinding, AnalysisError, Candidate, ConfigurationError, DataflowGraph,
    DesignSpecification, FabricResourceModel, ImplementationCatalog, Infeasibility,
    MappingOption, MetricRefiner, SystemMetrics, SystemModel,
};

/// The degrees of freedom of every actor, in actor order.
///
/// An actor option is one implementation placed on one unit of its type.
/// Implementations whose unit type the fabric lacks still contribute a single
/// unplaced option so that their rejection is reported.
///
/// A profile fixes how many parallel instances each actor runs; every
/// instance then picks one of its actor's options on its own. The sequential
/// profile, one instance per actor, always comes first.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    options: Vec<Vec<MappingOption>>,
    profiles: Vec<Vec<u64>>,
}

impl SearchSpace {
    pub fn build(
        graph: &DataflowGraph,
        catalog: &ImplementationCatalog,
        fabric: &FabricResourceModel,
    ) -> Result<SearchSpace, ConfigurationError> {
        if fabric.units().is_empty() {
            return Err(ConfigurationError::EmptySearchSpace(
                "the fabric has no resource units".to_owned(),
            ));
        }
        let mut options = Vec::with_capacity(graph.actors().len());
        for actor in graph.actors() {
            let mut actor_options = Vec::new();
            for implementation in catalog.lookup(graph, &actor.id) {
                let units: Vec<_> = fabric.units_of_type(&implementation.unit_type).collect();
                if units.is_empty() {
                    actor_options.push(MappingOption {
                        implementation: implementation.to_owned(),
                        unit: None,
                    });
                }
                for u in units {
                    actor_options.push(MappingOption {
                        implementation: implementation.to_owned(),
                        unit: Some(u.id.to_owned()),
                    });
                }
            }
            if actor_options.is_empty() {
                return Err(ConfigurationError::NoImplementations(actor.id.to_owned()));
            }
            if actor_options.iter().all(|o| o.unit.is_none()) {
                return Err(ConfigurationError::EmptySearchSpace(format!(
                    "no implementation of actor '{}' can be placed on the fabric",
                    actor.id
                )));
            }
            options.push(actor_options);
        }
        let profiles = vec![vec![1; options.len()]];
        Ok(SearchSpace { options, profiles })
    }

    /// Searches the given parallelism profiles after the sequential one.
    ///
    /// Profiles of the wrong length, with a zero count or repeating an
    /// earlier one are skipped.
    pub fn with_profiles(mut self, profiles: Vec<Vec<u64>>) -> SearchSpace {
        for p in profiles {
            if p.len() == self.options.len()
                && p.iter().all(|c| *c > 0)
                && !self.profiles.contains(&p)
            {
                self.profiles.push(p);
            }
        }
        self
    }

    /// Instance counts per actor, one entry per profile.
    pub fn profiles(&self) -> &[Vec<u64>] {
        &self.profiles
    }

    pub fn options(&self, actor: usize) -> &[MappingOption] {
        &self.options[actor]
    }

    /// Number of options per instance slot of `profile`, actor after actor.
    /// Empty for an unknown profile.
    pub fn dimensions(&self, profile: usize) -> Vec<usize> {
        let Some(counts) = self.profiles.get(profile) else {
            return Vec::new();
        };
        self.options
            .iter()
            .zip(counts.iter())
            .flat_map(|(o, c)| std::iter::repeat(o.len()).take(*c as usize))
            .collect()
    }

    /// Number of candidates of one profile, `None` past 64 bits.
    pub fn profile_size(&self, profile: usize) -> Option<u64> {
        self.dimensions(profile)
            .iter()
            .try_fold(1u64, |acc, d| acc.checked_mul(*d as u64))
    }

    /// Number of candidates over all profiles, or `None` when it does not fit
    /// in 64 bits.
    pub fn size(&self) -> Option<u64> {
        (0..self.profiles.len()).try_fold(0u64, |acc, p| acc.checked_add(self.profile_size(p)?))
    }

    pub fn contains(&self, candidate: &Candidate) -> bool {
        let dimensions = self.dimensions(candidate.profile);
        candidate.profile < self.profiles.len()
            && candidate.choices.len() == dimensions.len()
            && candidate
                .choices
                .iter()
                .zip(dimensions.iter())
                .all(|(c, d)| c < d)
    }

    /// The bindings a candidate of this space stands for.
    pub fn resolve(&self, graph: &DataflowGraph, candidate: &Candidate) -> Vec<ActorBinding> {
        let counts = &self.profiles[candidate.profile];
        let mut choices = candidate.choices.iter();
        graph
            .actors()
            .iter()
            .zip(self.options.iter())
            .zip(counts.iter())
            .map(|((a, o), count)| ActorBinding {
                actor: a.id.to_owned(),
                instances: choices
                    .by_ref()
                    .take(*count as usize)
                    .map(|c| o[*c].to_owned())
                    .collect(),
            })
            .collect()
    }
}

/// A candidate that satisfies every constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibleDesign {
    pub model: SystemModel,
    pub metrics: SystemMetrics,
    pub objective_vector: Vec<f64>,
    /// Weighted score of the objectives, smaller is better.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Feasible(FeasibleDesign),
    Infeasible(Infeasibility),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedCandidate {
    pub candidate: Candidate,
    pub outcome: Outcome,
}

impl EvaluatedCandidate {
    pub fn design(&self) -> Option<&FeasibleDesign> {
        match &self.outcome {
            Outcome::Feasible(d) => Some(d),
            Outcome::Infeasible(_) => None,
        }
    }

    pub fn infeasibility(&self) -> Option<&Infeasibility> {
        match &self.outcome {
            Outcome::Feasible(_) => None,
            Outcome::Infeasible(i) => Some(i),
        }
    }
}

/// Evaluates candidates as a pure function of the loaded inputs.
///
/// Holds no mutable state, so it is shared by reference between any number of
/// workers.
pub struct Evaluator {
    analysis: Result<Arc<AnalysedDataflowGraph>, AnalysisError>,
    space: Arc<SearchSpace>,
    fabric: Arc<FabricResourceModel>,
    specification: Arc<DesignSpecification>,
    refiner: Option<Arc<dyn MetricRefiner>>,
}

impl Evaluator {
    pub fn new(
        analysis: Result<Arc<AnalysedDataflowGraph>, AnalysisError>,
        space: Arc<SearchSpace>,
        fabric: Arc<FabricResourceModel>,
        specification: Arc<DesignSpecification>,
        refiner: Option<Arc<dyn MetricRefiner>>,
    ) -> Evaluator {
        Evaluator {
            analysis,
            space,
            fabric,
            specification,
            refiner,
        }
    }

    pub fn evaluate(&self, candidate: &Candidate) -> EvaluatedCandidate {
        EvaluatedCandidate {
            candidate: candidate.to_owned(),
            outcome: self.outcome(candidate),
        }
    }

    fn outcome(&self, candidate: &Candidate) -> Outcome {
        let analysed = match &self.analysis {
            Ok(a) => a,
            Err(e) => return Outcome::Infeasible(e.to_owned().into()),
        };
        let bindings = self.space.resolve(&analysed.graph, candidate);
        if let Err(e) = self.fabric.fits(&analysed.graph, &bindings) {
            return Outcome::Infeasible(e.into());
        }
        let model = SystemModel {
            graph: analysed.graph.clone(),
            candidate: candidate.to_owned(),
            bindings,
            repetition_vector: analysed.repetition_vector.to_owned(),
            schedule: analysed.schedule.to_owned(),
        };
        let mut metrics = derive_metrics(analysed, &model.bindings, &self.fabric);
        if let Some(refiner) = &self.refiner {
            metrics = refiner.refine(&model, metrics);
        }
        let evaluation = self.specification.evaluate(&metrics);
        if !evaluation.feasible {
            return Outcome::Infeasible(Infeasibility::Constraints(evaluation.violated));
        }
        Outcome::Feasible(FeasibleDesign {
            score: self.specification.score(&evaluation.objective_vector),
            objective_vector: evaluation.objective_vector,
            metrics,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylva_common::analyse;
    use sylva_core::{
        Actor, FabricResourceModel, Implementation, InfeasibilityKind, Metric, ResourceUnit,
        SystemConstraint, SystemOptimizationObjective,
    };
    use sylva_core::fabric::FabricResourceModelBody;

    fn fabric(units: Vec<ResourceUnit>) -> FabricResourceModel {
        FabricResourceModel::new(FabricResourceModelBody {
            units,
            links: vec![],
            max_hops: 1,
            intra_unit_delay: 1,
            inter_unit_delay: 1,
        })
        .expect("valid fabric")
    }

    fn single() -> (DataflowGraph, ImplementationCatalog) {
        let graph = DataflowGraph::new(vec![Actor::new("F")], vec![]).expect("valid graph");
        let catalog = ImplementationCatalog::new(vec![
            Implementation::new("F_a", "F", "unitA").with_costs(10.0, 1.0, 1),
            Implementation::new("F_b", "F", "unitB").with_costs(5.0, 1.0, 2),
        ])
        .expect("valid catalog");
        (graph, catalog)
    }

    #[test]
    fn missing_unit_types_become_unplaced_options() {
        let (graph, catalog) = single();
        let f = fabric(vec![ResourceUnit::new("b0", "unitB", 1), ResourceUnit::new("b1", "unitB", 1)]);
        let space = SearchSpace::build(&graph, &catalog, &f).expect("searchable");
        assert_eq!(space.dimensions(0), vec![3]);
        assert_eq!(space.size(), Some(3));
        assert_eq!(space.options(0)[0].unit, None);
        assert_eq!(space.options(0)[2].unit.as_deref(), Some("b1"));
        assert!(space.contains(&Candidate::new(vec![2])));
        assert!(!space.contains(&Candidate::new(vec![3])));
        assert!(!space.contains(&Candidate::new(vec![0, 0])));
    }

    #[test]
    fn unsearchable_inputs_are_rejected() {
        let (graph, catalog) = single();
        assert!(matches!(
            SearchSpace::build(&graph, &catalog, &fabric(vec![])),
            Err(ConfigurationError::EmptySearchSpace(_))
        ));
        assert!(matches!(
            SearchSpace::build(&graph, &catalog, &fabric(vec![ResourceUnit::new("c", "unitC", 1)])),
            Err(ConfigurationError::EmptySearchSpace(_))
        ));
    }

    #[test]
    fn evaluation_is_idempotent_and_ordered() {
        let (graph, catalog) = single();
        let f = fabric(vec![ResourceUnit::new("b0", "unitB", 1)]);
        let space = Arc::new(SearchSpace::build(&graph, &catalog, &f).expect("searchable"));
        let spec = DesignSpecification::new(
            vec![SystemConstraint::at_most("tiny", Metric::Area, 1.0)],
            vec![SystemOptimizationObjective::minimize("area", Metric::Area)],
        )
        .expect("valid specification");
        let evaluator = Evaluator::new(
            analyse(Arc::new(graph)).map(Arc::new),
            space,
            Arc::new(f),
            Arc::new(spec),
            None,
        );
        let unplaced = evaluator.evaluate(&Candidate::new(vec![0]));
        assert_eq!(
            unplaced.infeasibility().map(|i| i.kind()),
            Some(InfeasibilityKind::CapacityExceeded)
        );
        let placed = evaluator.evaluate(&Candidate::new(vec![1]));
        assert_eq!(
            placed.infeasibility(),
            Some(&Infeasibility::Constraints(vec!["tiny".to_string()]))
        );
        assert_eq!(placed, evaluator.evaluate(&Candidate::new(vec![1])));
    }

    #[test]
    fn analysis_failures_mark_every_candidate() {
        let (graph, catalog) = single();
        let f = fabric(vec![ResourceUnit::new("b0", "unitB", 1)]);
        let space = Arc::new(SearchSpace::build(&graph, &catalog, &f).expect("searchable"));
        let spec = DesignSpecification::new(
            vec![],
            vec![SystemOptimizationObjective::minimize("area", Metric::Area)],
        )
        .expect("valid specification");
        let evaluator = Evaluator::new(
            Err(AnalysisError::DeadlockDetected {
                blocked: vec!["F".to_string()],
            }),
            space,
            Arc::new(f),
            Arc::new(spec),
            None,
        );
        for c in [0, 1] {
            assert_eq!(
                evaluator
                    .evaluate(&Candidate::new(vec![c]))
                    .infeasibility()
                    .map(|i| i.kind()),
                Some(InfeasibilityKind::DeadlockDetected)
            );
        }
    }

    #[test]
    fn profiles_add_one_slot_per_instance() {
        let graph = DataflowGraph::new(
            vec![
                Actor::new("A").with_output("o", 2),
                Actor::new("B").with_input("i", 1),
            ],
            vec![sylva_core::Edge::new(("A", "o"), ("B", "i"))],
        )
        .expect("valid graph");
        let catalog = ImplementationCatalog::new(vec![
            Implementation::new("A_impl", "A", "alu"),
            Implementation::new("B_impl", "B", "alu"),
        ])
        .expect("valid catalog");
        let f = fabric(vec![
            ResourceUnit::new("u0", "alu", 1),
            ResourceUnit::new("u1", "alu", 1),
            ResourceUnit::new("u2", "alu", 1),
        ]);
        let space = SearchSpace::build(&graph, &catalog, &f)
            .expect("searchable")
            .with_profiles(vec![vec![1, 1], vec![1, 2], vec![1], vec![0, 2]]);
        assert_eq!(space.profiles(), &[vec![1, 1], vec![1, 2]]);
        assert_eq!(space.dimensions(1), vec![3, 3, 3]);
        assert_eq!(space.size(), Some(9 + 27));
        assert!(space.contains(&Candidate::in_profile(1, vec![0, 1, 2])));
        assert!(!space.contains(&Candidate::in_profile(1, vec![0, 1])));
        assert!(!space.contains(&Candidate::in_profile(2, vec![0, 1])));
        let bindings = space.resolve(&graph, &Candidate::in_profile(1, vec![0, 1, 2]));
        assert_eq!(bindings[0].instances.len(), 1);
        let units: Vec<_> = bindings[1].units().collect();
        assert_eq!(units, vec![Some("u1"), Some("u2")]);
        assert_eq!(bindings[1].instance_of(3).unit.as_deref(), Some("u2"));
    }
}
