pub mod macros;

use std::{
    collections::BTreeMap,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, warn};
use schemars::{schema_for, JsonSchema};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sylva_common::ReplayError;
use sylva_core::{
    ActorBinding, DataflowGraph, DesignSpecification, FabricResourceModel, ImplementationCatalog,
    InfeasibilityKind, SolverOptions, SystemMetrics, SystemModel,
};
use thiserror::Error;

/// Body encodings of hand-off messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum Encoding {
    #[default]
    Json,
    #[value(name = "msgpack")]
    MsgPack,
    Cbor,
}

impl Encoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::MsgPack => "msgpack",
            Encoding::Cbor => "cbor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("JSON encoding failed: {0}")]
    Json(String),
    #[error("MessagePack encoding failed: {0}")]
    MsgPack(String),
    #[error("CBOR encoding failed: {0}")]
    Cbor(String),
}

/// Failures of loading an input document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The occupancy bound of one dataflow edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BufferSizeMessage {
    pub edge: String,
    pub tokens: u64,
}

/// A selected system model as handed to the code emitter.
///
/// It is lossless for the implementation instances chosen per actor, the unit
/// each instance is assigned to and the schedule with its buffer sizes.
/// Firing `k` of an actor runs on its instance `k` modulo the instance count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SystemModelMessage {
    pub profile: usize,
    pub choices: Vec<usize>,
    pub bindings: Vec<ActorBinding>,
    pub repetition_vector: BTreeMap<String, u64>,
    pub firing_order: Vec<String>,
    pub buffer_sizes: Vec<BufferSizeMessage>,
    pub metrics: SystemMetrics,
    pub objectives: Vec<f64>,
}

impl_message_encodings!(SystemModelMessage);

impl SystemModelMessage {
    pub fn from_model(model: &SystemModel, metrics: &SystemMetrics, objectives: &[f64]) -> Self {
        SystemModelMessage {
            profile: model.candidate.profile,
            choices: model.candidate.choices.to_owned(),
            bindings: model.bindings.to_owned(),
            repetition_vector: model.repetition_vector.to_owned(),
            firing_order: model.schedule.firings.to_owned(),
            buffer_sizes: model
                .graph
                .edges()
                .iter()
                .zip(model.schedule.buffer_bounds.iter())
                .map(|(e, b)| BufferSizeMessage {
                    edge: e.name(),
                    tokens: *b,
                })
                .collect(),
            metrics: *metrics,
            objectives: objectives.to_vec(),
        }
    }

    /// Replays the firing order of the message against `graph`, so that a
    /// consumer can trust a decoded schedule before emitting code for it.
    pub fn check_against(&self, graph: &DataflowGraph) -> Result<(), ReplayError> {
        sylva_common::replay(graph, &self.repetition_vector, &self.firing_order).map(|_| ())
    }
}

/// The terminal result of an exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExplorationReportMessage {
    pub strategy: String,
    pub termination: String,
    pub explored: u64,
    pub feasible: u64,
    pub infeasible: BTreeMap<InfeasibilityKind, u64>,
    pub pareto_front: Vec<SystemModelMessage>,
}

impl_message_encodings!(ExplorationReportMessage);

impl ExplorationReportMessage {
    /// Writes one row per Pareto front model.
    pub fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "index,area,power,energy,latency,sample_interval,throughput"
        )?;
        for (i, m) in self.pareto_front.iter().enumerate() {
            writeln!(
                out,
                "{},{},{},{},{},{},{}",
                i,
                m.metrics.area,
                m.metrics.power,
                m.metrics.energy,
                m.metrics.latency,
                m.metrics.sample_interval,
                m.metrics.throughput
            )?;
        }
        Ok(())
    }
}

/// Everything an exploration run consumes.
#[derive(Debug, Clone)]
pub struct ExplorationInput {
    pub graph: DataflowGraph,
    pub catalog: ImplementationCatalog,
    pub fabric: FabricResourceModel,
    pub specification: DesignSpecification,
    pub options: SolverOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorationInputPaths {
    pub graph: PathBuf,
    pub catalog: PathBuf,
    pub fabric: PathBuf,
    pub specification: PathBuf,
    pub options: Option<PathBuf>,
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Reads a file, retrying transient I/O failures up to `attempts` times.
pub fn read_with_retry(path: &Path, attempts: u32) -> Result<String, LoadError> {
    let mut attempt = 1;
    loop {
        match std::fs::read_to_string(path) {
            Ok(s) => return Ok(s),
            Err(e) if is_transient(&e) && attempt < attempts => {
                warn!(
                    "Reading {} failed ({}), attempt {} of {}",
                    path.display(),
                    e,
                    attempt,
                    attempts
                );
                std::thread::sleep(Duration::from_millis(50 * attempt as u64));
                attempt += 1;
            }
            Err(e) => {
                return Err(LoadError::Io {
                    path: path.to_owned(),
                    source: e,
                })
            }
        }
    }
}

pub fn load_json<T: DeserializeOwned>(path: &Path, attempts: u32) -> Result<T, LoadError> {
    let s = read_with_retry(path, attempts)?;
    let v = serde_json::from_str(&s).map_err(|e| LoadError::Decode {
        path: path.to_owned(),
        source: e,
    })?;
    debug!("Loaded {}", path.display());
    Ok(v)
}

impl ExplorationInput {
    pub fn load(paths: &ExplorationInputPaths, attempts: u32) -> Result<ExplorationInput, LoadError> {
        Ok(ExplorationInput {
            graph: load_json(&paths.graph, attempts)?,
            catalog: load_json(&paths.catalog, attempts)?,
            fabric: load_json(&paths.fabric, attempts)?,
            specification: load_json(&paths.specification, attempts)?,
            options: match &paths.options {
                Some(p) => load_json(p, attempts)?,
                None => SolverOptions::default(),
            },
        })
    }
}

/// JSON schemas of every input document, by document name.
pub fn input_schemas() -> Vec<(String, String)> {
    let schemas = [
        ("graph", schema_for!(DataflowGraph)),
        ("catalog", schema_for!(ImplementationCatalog)),
        ("fabric", schema_for!(FabricResourceModel)),
        ("specification", schema_for!(DesignSpecification)),
        ("options", schema_for!(SolverOptions)),
    ];
    schemas
        .into_iter()
        .map(|(name, schema)| {
            (
                name.to_owned(),
                serde_json::to_string_pretty(&schema).unwrap_or_default(),
            )
        })
        .collect()
}
