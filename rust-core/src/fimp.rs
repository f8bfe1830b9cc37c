use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{dataflow::DataflowGraph, error::ConfigurationError, CostedImplementation};

fn one() -> u64 {
    1
}

fn one_unit() -> u32 {
    1
}

/// A functional implementation (fimp) of an actor function.
///
/// Costs are facts supplied by the implementation database and are only read
/// here. `latency` is the length of the computation phase in cycles. The input
/// phase covers the first `input_phase` cycles of a firing and the output phase
/// the last `output_phase` cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Implementation {
    pub name: String,
    pub function: String,
    pub unit_type: String,
    #[serde(default = "one_unit")]
    pub units: u32,
    pub area: f64,
    #[serde(default)]
    pub power: f64,
    #[serde(default)]
    pub energy: f64,
    #[serde(default = "one")]
    pub latency: u64,
    #[serde(default = "one")]
    pub input_phase: u64,
    #[serde(default = "one")]
    pub output_phase: u64,
}

impl Implementation {
    pub fn new(name: &str, function: &str, unit_type: &str) -> Implementation {
        Implementation {
            name: name.to_owned(),
            function: function.to_owned(),
            unit_type: unit_type.to_owned(),
            units: 1,
            area: 0.0,
            power: 0.0,
            energy: 0.0,
            latency: 1,
            input_phase: 1,
            output_phase: 1,
        }
    }

    pub fn with_costs(mut self, area: f64, power: f64, latency: u64) -> Implementation {
        self.area = area;
        self.power = power;
        self.latency = latency;
        self
    }

    pub fn with_energy(mut self, energy: f64) -> Implementation {
        self.energy = energy;
        self
    }

    pub fn with_phases(mut self, input_phase: u64, output_phase: u64) -> Implementation {
        self.input_phase = input_phase;
        self.output_phase = output_phase;
        self
    }

    pub fn with_units(mut self, units: u32) -> Implementation {
        self.units = units;
        self
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidImplementation {
            name: self.name.to_owned(),
            reason: reason.to_owned(),
        };
        if self.units == 0 {
            return Err(invalid("it must consume at least one unit"));
        }
        if self.latency == 0 {
            return Err(invalid("latency must be at least one cycle"));
        }
        if self.input_phase == 0 || self.input_phase > self.latency {
            return Err(invalid("input phase must lie within the latency"));
        }
        if self.output_phase == 0 || self.output_phase > self.latency {
            return Err(invalid("output phase must lie within the latency"));
        }
        for (cost, v) in [("area", self.area), ("power", self.power), ("energy", self.energy)] {
            if !v.is_finite() || v < 0.0 {
                return Err(invalid(&format!("{} must be finite and non negative", cost)));
            }
        }
        Ok(())
    }
}

impl CostedImplementation for Implementation {
    fn area(&self) -> f64 {
        self.area
    }

    fn power(&self) -> f64 {
        self.power
    }

    fn energy_per_firing(&self) -> f64 {
        self.energy
    }

    fn latency(&self) -> u64 {
        self.latency
    }

    fn input_phase(&self) -> u64 {
        self.input_phase
    }

    fn output_phase(&self) -> u64 {
        self.output_phase
    }

    fn unit_type(&self) -> &str {
        &self.unit_type
    }

    fn units(&self) -> u32 {
        self.units
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ImplementationCatalogBody {
    pub implementations: Vec<Implementation>,
}

/// Every implementation known to the tool chain, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ImplementationCatalogBody", into = "ImplementationCatalogBody")]
pub struct ImplementationCatalog {
    implementations: Vec<Implementation>,
}

impl ImplementationCatalog {
    pub fn new(implementations: Vec<Implementation>) -> Result<ImplementationCatalog, ConfigurationError> {
        let mut names = HashSet::new();
        for i in &implementations {
            if !names.insert(i.name.as_str()) {
                return Err(ConfigurationError::DuplicateIdentifier(i.name.to_owned()));
            }
            i.check()?;
        }
        Ok(ImplementationCatalog { implementations })
    }

    pub fn implementations(&self) -> &[Implementation] {
        &self.implementations
    }

    pub fn get(&self, name: &str) -> Option<&Implementation> {
        self.implementations.iter().find(|i| i.name == name)
    }

    /// The candidate implementations of `actor` in catalog order.
    ///
    /// These are the implementations of the actor function, restricted to the
    /// actor's admissible list when it declares one.
    pub fn lookup(&self, graph: &DataflowGraph, actor: &str) -> Vec<&Implementation> {
        match graph.actor(actor) {
            Some(a) => self
                .implementations
                .iter()
                .filter(|i| i.function == a.function())
                .filter(|i| a.admissible.is_empty() || a.admissible.contains(&i.name))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Checks that every actor of the graph has at least one candidate.
    pub fn validate_for(&self, graph: &DataflowGraph) -> Result<(), ConfigurationError> {
        for a in graph.actors() {
            for admissible in &a.admissible {
                if self.get(admissible).is_none() {
                    return Err(ConfigurationError::InvalidImplementation {
                        name: admissible.to_owned(),
                        reason: format!("admitted by actor '{}' but not in the catalog", a.id),
                    });
                }
            }
            if self.lookup(graph, &a.id).is_empty() {
                return Err(ConfigurationError::NoImplementations(a.id.to_owned()));
            }
        }
        Ok(())
    }
}

impl TryFrom<ImplementationCatalogBody> for ImplementationCatalog {
    type Error = ConfigurationError;

    fn try_from(body: ImplementationCatalogBody) -> Result<Self, Self::Error> {
        ImplementationCatalog::new(body.implementations)
    }
}

impl From<ImplementationCatalog> for ImplementationCatalogBody {
    fn from(c: ImplementationCatalog) -> Self {
        ImplementationCatalogBody {
            implementations: c.implementations,
        }
    }
}

impl JsonSchema for ImplementationCatalog {
    fn schema_name() -> String {
        "ImplementationCatalog".to_owned()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        ImplementationCatalogBody::json_schema(gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::{Actor, Edge};

    fn graph() -> DataflowGraph {
        DataflowGraph::new(
            vec![
                Actor::new("src").with_function("fir").with_output("o", 1),
                Actor::new("dst")
                    .with_function("fir")
                    .with_input("i", 1)
                    .with_admissible(&["fir_small"]),
            ],
            vec![Edge::new(("src", "o"), ("dst", "i"))],
        )
        .expect("valid graph")
    }

    #[test]
    fn lookup_follows_function_and_admissible_list() {
        let catalog = ImplementationCatalog::new(vec![
            Implementation::new("fir_fast", "fir", "dsp").with_costs(10.0, 2.0, 1),
            Implementation::new("fir_small", "fir", "alu").with_costs(3.0, 1.0, 4),
            Implementation::new("fft", "fft", "dsp"),
        ])
        .expect("valid catalog");
        let g = graph();
        let src: Vec<&str> = catalog
            .lookup(&g, "src")
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(src, vec!["fir_fast", "fir_small"]);
        let dst: Vec<&str> = catalog
            .lookup(&g, "dst")
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(dst, vec!["fir_small"]);
        assert!(catalog.validate_for(&g).is_ok());
    }

    #[test]
    fn actors_without_implementations_are_configuration_errors() {
        let catalog =
            ImplementationCatalog::new(vec![Implementation::new("fft", "fft", "dsp")]).expect("valid");
        assert_eq!(
            catalog.validate_for(&graph()),
            Err(ConfigurationError::InvalidImplementation {
                name: "fir_small".to_string(),
                reason: "admitted by actor 'dst' but not in the catalog".to_string()
            })
        );
        let catalog = ImplementationCatalog::new(vec![Implementation::new(
            "fir_small",
            "fir",
            "alu",
        )])
        .expect("valid");
        assert!(catalog.validate_for(&graph()).is_ok());
        let empty = ImplementationCatalog::new(vec![]).expect("valid");
        assert!(matches!(
            empty.validate_for(&graph()),
            Err(ConfigurationError::InvalidImplementation { .. })
                | Err(ConfigurationError::NoImplementations(_))
        ));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert_eq!(
            ImplementationCatalog::new(vec![
                Implementation::new("a", "f", "alu"),
                Implementation::new("a", "g", "alu"),
            ]),
            Err(ConfigurationError::DuplicateIdentifier("a".to_string()))
        );
        assert!(ImplementationCatalog::new(vec![
            Implementation::new("a", "f", "alu").with_phases(2, 1)
        ])
        .is_err());
        assert!(ImplementationCatalog::new(vec![
            Implementation::new("a", "f", "alu").with_costs(-1.0, 0.0, 1)
        ])
        .is_err());
    }

    #[test]
    fn defaults_apply_when_deserializing() {
        let c: ImplementationCatalog = serde_json::from_str(
            r#"{"implementations": [{"name": "m", "function": "mul", "unit_type": "alu", "area": 2.5}]}"#,
        )
        .expect("valid catalog");
        let m = &c.implementations()[0];
        assert_eq!((m.units, m.latency, m.input_phase, m.output_phase), (1, 1, 1, 1));
        assert_eq!(m.energy, 0.0);
    }
}
