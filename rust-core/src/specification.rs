use std::{cmp::Ordering, collections::HashSet, fmt};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// The derived metrics of a system model that constraints and objectives can
/// refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Throughput,
    Latency,
    SampleInterval,
    Area,
    Power,
    Energy,
    BufferTokens,
}

impl Metric {
    pub fn all() -> [Metric; 7] {
        [
            Metric::Throughput,
            Metric::Latency,
            Metric::SampleInterval,
            Metric::Area,
            Metric::Power,
            Metric::Energy,
            Metric::BufferTokens,
        ]
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Throughput => "throughput",
            Metric::Latency => "latency",
            Metric::SampleInterval => "sample_interval",
            Metric::Area => "area",
            Metric::Power => "power",
            Metric::Energy => "energy",
            Metric::BufferTokens => "buffer_tokens",
        };
        write!(f, "{}", name)
    }
}

/// Metrics of one resolved system model.
///
/// `latency` is the makespan of one period in cycles and `sample_interval` the
/// steady state cycles between period starts; `throughput` is its reciprocal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SystemMetrics {
    pub area: f64,
    pub power: f64,
    pub energy: f64,
    pub latency: u64,
    pub sample_interval: f64,
    pub throughput: f64,
    pub buffer_tokens: u64,
}

impl SystemMetrics {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Throughput => self.throughput,
            Metric::Latency => self.latency as f64,
            Metric::SampleInterval => self.sample_interval,
            Metric::Area => self.area,
            Metric::Power => self.power,
            Metric::Energy => self.energy,
            Metric::BufferTokens => self.buffer_tokens as f64,
        }
    }
}

/// A named hard bound on one metric. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SystemConstraint {
    pub id: String,
    pub metric: Metric,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl SystemConstraint {
    pub fn at_most(id: &str, metric: Metric, max: f64) -> SystemConstraint {
        SystemConstraint {
            id: id.to_owned(),
            metric,
            min: None,
            max: Some(max),
        }
    }

    pub fn at_least(id: &str, metric: Metric, min: f64) -> SystemConstraint {
        SystemConstraint {
            id: id.to_owned(),
            metric,
            min: Some(min),
            max: None,
        }
    }

    pub fn is_satisfied(&self, metrics: &SystemMetrics) -> bool {
        let v = metrics.get(self.metric);
        self.min.map_or(true, |m| v >= m) && self.max.map_or(true, |m| v <= m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Minimize,
    Maximize,
}

fn unit_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SystemOptimizationObjective {
    pub id: String,
    pub metric: Metric,
    pub direction: Direction,
    #[serde(default = "unit_weight")]
    pub weight: f64,
}

impl SystemOptimizationObjective {
    pub fn minimize(id: &str, metric: Metric) -> SystemOptimizationObjective {
        SystemOptimizationObjective {
            id: id.to_owned(),
            metric,
            direction: Direction::Minimize,
            weight: 1.0,
        }
    }

    pub fn maximize(id: &str, metric: Metric) -> SystemOptimizationObjective {
        SystemOptimizationObjective {
            id: id.to_owned(),
            metric,
            direction: Direction::Maximize,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> SystemOptimizationObjective {
        self.weight = weight;
        self
    }

    /// The value turned into a quantity to minimize.
    pub fn orient(&self, value: f64) -> f64 {
        match self.direction {
            Direction::Minimize => value,
            Direction::Maximize => -value,
        }
    }
}

/// Outcome of checking one set of metrics against a [DesignSpecification].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    pub feasible: bool,
    pub violated: Vec<String>,
    /// One value per objective, in declaration order, in the metric's own unit.
    pub objective_vector: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DesignSpecificationBody {
    #[serde(default)]
    pub constraints: Vec<SystemConstraint>,
    pub objectives: Vec<SystemOptimizationObjective>,
}

/// What makes a design good: hard constraints and ranked objectives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DesignSpecificationBody", into = "DesignSpecificationBody")]
pub struct DesignSpecification {
    constraints: Vec<SystemConstraint>,
    objectives: Vec<SystemOptimizationObjective>,
}

impl DesignSpecification {
    pub fn new(
        constraints: Vec<SystemConstraint>,
        objectives: Vec<SystemOptimizationObjective>,
    ) -> Result<DesignSpecification, ConfigurationError> {
        if objectives.is_empty() {
            return Err(ConfigurationError::EmptyObjectives);
        }
        let mut ids = HashSet::new();
        for c in &constraints {
            if !ids.insert(c.id.as_str()) {
                return Err(ConfigurationError::DuplicateIdentifier(c.id.to_owned()));
            }
            if c.min.is_none() && c.max.is_none() {
                return Err(ConfigurationError::UnboundedConstraint(c.id.to_owned()));
            }
        }
        for o in &objectives {
            if !ids.insert(o.id.as_str()) {
                return Err(ConfigurationError::DuplicateIdentifier(o.id.to_owned()));
            }
            if !o.weight.is_finite() || o.weight < 0.0 {
                return Err(ConfigurationError::InvalidWeight(o.id.to_owned()));
            }
        }
        Ok(DesignSpecification {
            constraints,
            objectives,
        })
    }

    pub fn constraints(&self) -> &[SystemConstraint] {
        &self.constraints
    }

    pub fn objectives(&self) -> &[SystemOptimizationObjective] {
        &self.objectives
    }

    pub fn evaluate(&self, metrics: &SystemMetrics) -> Evaluation {
        let violated: Vec<String> = self
            .constraints
            .iter()
            .filter(|c| !c.is_satisfied(metrics))
            .map(|c| c.id.to_owned())
            .collect();
        Evaluation {
            feasible: violated.is_empty(),
            violated,
            objective_vector: self
                .objectives
                .iter()
                .map(|o| metrics.get(o.metric))
                .collect(),
        }
    }

    /// Objective values oriented so that smaller is better on every position.
    pub fn oriented(&self, objective_vector: &[f64]) -> Vec<f64> {
        self.objectives
            .iter()
            .zip(objective_vector)
            .map(|(o, v)| o.orient(*v))
            .collect()
    }

    /// Weighted sum of the oriented objective values. Smaller is better.
    pub fn score(&self, objective_vector: &[f64]) -> f64 {
        self.objectives
            .iter()
            .zip(objective_vector)
            .map(|(o, v)| o.weight * o.orient(*v))
            .sum()
    }

    /// Pareto comparison of two objective vectors.
    ///
    /// `Less` when `lhs` dominates `rhs`, `Greater` when it is dominated, `Equal`
    /// when both are identical and `None` when they are incomparable.
    pub fn dominance_cmp(&self, lhs: &[f64], rhs: &[f64]) -> Option<Ordering> {
        let l = self.oriented(lhs);
        let r = self.oriented(rhs);
        if l.len() != r.len() {
            return None;
        }
        let mut better = false;
        let mut worse = false;
        for (a, b) in l.iter().zip(r.iter()) {
            match a.partial_cmp(b)? {
                Ordering::Less => better = true,
                Ordering::Greater => worse = true,
                Ordering::Equal => {}
            }
        }
        match (better, worse) {
            (false, false) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (true, true) => None,
        }
    }
}

impl TryFrom<DesignSpecificationBody> for DesignSpecification {
    type Error = ConfigurationError;

    fn try_from(body: DesignSpecificationBody) -> Result<Self, Self::Error> {
        DesignSpecification::new(body.constraints, body.objectives)
    }
}

impl From<DesignSpecification> for DesignSpecificationBody {
    fn from(s: DesignSpecification) -> Self {
        DesignSpecificationBody {
            constraints: s.constraints,
            objectives: s.objectives,
        }
    }
}

impl JsonSchema for DesignSpecification {
    fn schema_name() -> String {
        "DesignSpecification".to_owned()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        DesignSpecificationBody::json_schema(gen)
    }
}
