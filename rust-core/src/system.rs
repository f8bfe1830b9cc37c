use std::{collections::BTreeMap, sync::Arc};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{dataflow::DataflowGraph, fimp::Implementation};

/// Firing counts per actor id for one schedule period.
pub type RepetitionVector = BTreeMap<String, u64>;

/// A periodic admissible static schedule.
///
/// `firings` lists actor ids in firing order and covers the repetition vector
/// exactly once. `buffer_bounds` holds the largest occupancy reached on every
/// edge, aligned with the edges of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Schedule {
    pub firings: Vec<String>,
    pub buffer_bounds: Vec<u64>,
}

/// One point of the search space.
///
/// `profile` selects how many parallel instances every actor gets. `choices`
/// then holds, actor after actor and instance after instance, the index of the
/// chosen entry among that actor's mapping options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct Candidate {
    #[serde(default)]
    pub profile: usize,
    pub choices: Vec<usize>,
}

impl Candidate {
    /// A candidate of the sequential profile, one instance per actor.
    pub fn new(choices: Vec<usize>) -> Candidate {
        Candidate { profile: 0, choices }
    }

    pub fn in_profile(profile: usize, choices: Vec<usize>) -> Candidate {
        Candidate { profile, choices }
    }
}

/// One degree of freedom of an actor: an implementation placed on a unit.
///
/// `unit` is `None` when the fabric has no unit of the implementation's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MappingOption {
    pub implementation: Implementation,
    pub unit: Option<String>,
}

/// The implementation instances chosen for one actor.
///
/// Each instance is an implementation placed on its own unit. The firings of
/// a period are dealt round robin: firing `k` runs on instance
/// `k % instances.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActorBinding {
    pub actor: String,
    pub instances: Vec<MappingOption>,
}

impl ActorBinding {
    /// A binding with a single instance.
    pub fn single(actor: &str, implementation: Implementation, unit: Option<&str>) -> ActorBinding {
        ActorBinding {
            actor: actor.to_owned(),
            instances: vec![MappingOption {
                implementation,
                unit: unit.map(|u| u.to_owned()),
            }],
        }
    }

    /// The instance executing the `firing`-th firing of a period.
    pub fn instance_of(&self, firing: u64) -> &MappingOption {
        &self.instances[(firing % self.instances.len() as u64) as usize]
    }

    pub fn units(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.instances.iter().map(|i| i.unit.as_deref())
    }
}

/// A fully resolved candidate design.
///
/// Built once per evaluated candidate and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemModel {
    pub graph: Arc<DataflowGraph>,
    pub candidate: Candidate,
    /// One binding per actor, in actor order.
    pub bindings: Vec<ActorBinding>,
    pub repetition_vector: RepetitionVector,
    pub schedule: Schedule,
}

impl SystemModel {
    pub fn binding(&self, actor: &str) -> Option<&ActorBinding> {
        self.graph
            .actor_index(actor)
            .and_then(|i| self.bindings.get(i))
    }

    pub fn repetitions(&self, actor: &str) -> u64 {
        self.repetition_vector.get(actor).copied().unwrap_or(0)
    }
}
