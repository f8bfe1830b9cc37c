use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A graph that is malformed. Fatal to the graph being built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("a dataflow graph needs at least one actor")]
    EmptyGraph,
    #[error("actor '{0}' is declared more than once")]
    DuplicateActor(String),
    #[error("port '{port}' is declared more than once on actor '{actor}'")]
    DuplicatePort { actor: String, port: String },
    #[error("port '{actor}.{port}' has a zero token rate")]
    ZeroRate { actor: String, port: String },
    #[error("edge refers to unknown actor '{0}'")]
    UnknownActor(String),
    #[error("edge refers to unknown port '{actor}.{port}'")]
    UnknownPort { actor: String, port: String },
    #[error("port '{actor}.{port}' is used against its direction")]
    DirectionMismatch { actor: String, port: String },
    #[error("port '{actor}.{port}' is the endpoint of more than one edge")]
    DuplicateEndpoint { actor: String, port: String },
    #[error("port '{actor}.{port}' is not connected to any edge")]
    DanglingPort { actor: String, port: String },
    #[error("token type '{src_type}' of '{src}' is incompatible with '{dst_type}' of '{dst}'")]
    TypeMismatch {
        src: String,
        src_type: String,
        dst: String,
        dst_type: String,
    },
}

/// Failures of the balance solver and of the static scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AnalysisError {
    #[error("token rates are inconsistent on edge {edge}")]
    InconsistentRates { edge: String },
    #[error("the graph has {components} weakly connected components, expected one")]
    Unconnected { components: usize },
    #[error("the repetition vector does not fit in 64 bits")]
    RepetitionOverflow,
    #[error("one period has {firings} firings, more than the {limit} that can be scheduled")]
    PeriodTooLarge { firings: u64, limit: u64 },
    #[error("no admissible firing order, blocked actors: {}", .blocked.join(", "))]
    DeadlockDetected { blocked: Vec<String> },
}

/// Reasons an assignment of implementations to fabric units is not realizable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MappingError {
    #[error("capacity of unit type '{unit_type}' exceeded{}", .unit.as_ref().map(|u| format!(" on unit '{}'", u)).unwrap_or_default())]
    CapacityExceeded {
        unit_type: String,
        unit: Option<String>,
    },
    #[error("actors '{src_actor}' and '{dst_actor}' communicate but are mapped too far apart")]
    AdjacencyViolated { src_actor: String, dst_actor: String },
}

/// Inputs the engine cannot search over. Reported before any search starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("the search space is empty: {0}")]
    EmptySearchSpace(String),
    #[error("actor '{0}' has no candidate implementation")]
    NoImplementations(String),
    #[error("the design specification declares no optimization objective")]
    EmptyObjectives,
    #[error("objective '{0}' has a negative or non finite weight")]
    InvalidWeight(String),
    #[error("constraint '{0}' declares neither a lower nor an upper bound")]
    UnboundedConstraint(String),
    #[error("identifier '{0}' is declared more than once")]
    DuplicateIdentifier(String),
    #[error("implementation '{name}' is invalid: {reason}")]
    InvalidImplementation { name: String, reason: String },
    #[error("fabric is invalid: {0}")]
    InvalidFabric(String),
    #[error("solver options are invalid: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// The category an infeasible candidate is tallied under in the terminal report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibilityKind {
    InconsistentRates,
    Unconnected,
    RepetitionOverflow,
    PeriodTooLarge,
    DeadlockDetected,
    CapacityExceeded,
    AdjacencyViolated,
    ConstraintViolated,
}

impl std::fmt::Display for InfeasibilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InfeasibilityKind::InconsistentRates => "inconsistent_rates",
            InfeasibilityKind::Unconnected => "unconnected",
            InfeasibilityKind::RepetitionOverflow => "repetition_overflow",
            InfeasibilityKind::PeriodTooLarge => "period_too_large",
            InfeasibilityKind::DeadlockDetected => "deadlock_detected",
            InfeasibilityKind::CapacityExceeded => "capacity_exceeded",
            InfeasibilityKind::AdjacencyViolated => "adjacency_violated",
            InfeasibilityKind::ConstraintViolated => "constraint_violated",
        };
        write!(f, "{}", s)
    }
}

/// Why a single candidate was rejected. A normal search outcome, not a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Infeasibility {
    Analysis(AnalysisError),
    Mapping(MappingError),
    Constraints(Vec<String>),
}

impl Infeasibility {
    pub fn kind(&self) -> InfeasibilityKind {
        match self {
            Infeasibility::Analysis(AnalysisError::InconsistentRates { .. }) => {
                InfeasibilityKind::InconsistentRates
            }
            Infeasibility::Analysis(AnalysisError::Unconnected { .. }) => {
                InfeasibilityKind::Unconnected
            }
            Infeasibility::Analysis(AnalysisError::RepetitionOverflow) => {
                InfeasibilityKind::RepetitionOverflow
            }
            Infeasibility::Analysis(AnalysisError::PeriodTooLarge { .. }) => {
                InfeasibilityKind::PeriodTooLarge
            }
            Infeasibility::Analysis(AnalysisError::DeadlockDetected { .. }) => {
                InfeasibilityKind::DeadlockDetected
            }
            Infeasibility::Mapping(MappingError::CapacityExceeded { .. }) => {
                InfeasibilityKind::CapacityExceeded
            }
            Infeasibility::Mapping(MappingError::AdjacencyViolated { .. }) => {
                InfeasibilityKind::AdjacencyViolated
            }
            Infeasibility::Constraints(_) => InfeasibilityKind::ConstraintViolated,
        }
    }
}

impl From<AnalysisError> for Infeasibility {
    fn from(e: AnalysisError) -> Self {
        Infeasibility::Analysis(e)
    }
}

impl From<MappingError> for Infeasibility {
    fn from(e: MappingError) -> Self {
        Infeasibility::Mapping(e)
    }
}
