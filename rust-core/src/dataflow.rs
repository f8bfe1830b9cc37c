use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use petgraph::Graph;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::StructuralError;

/// The type of the data tokens travelling through a port.
///
/// Two token types are compatible when both the name and the width agree, so that
/// an `int32` produced on one side is never read as a `fix16` on the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DataTokenType {
    pub name: String,
    pub size_in_bits: u32,
}

impl DataTokenType {
    pub fn new(name: &str, size_in_bits: u32) -> DataTokenType {
        DataTokenType {
            name: name.to_owned(),
            size_in_bits,
        }
    }

    pub fn is_compatible(&self, other: &DataTokenType) -> bool {
        self.name == other.name && self.size_in_bits == other.size_in_bits
    }
}

impl Default for DataTokenType {
    fn default() -> Self {
        DataTokenType::new("int32", 32)
    }
}

impl fmt::Display for DataTokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bits)", self.name, self.size_in_bits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A typed connection point of an actor.
///
/// The rate is the number of tokens produced (output) or consumed (input) by
/// every firing of the owning actor and never changes once the graph is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Port {
    pub name: String,
    pub direction: PortDirection,
    #[serde(default)]
    pub token_type: DataTokenType,
    pub rate: u32,
}

impl Port {
    pub fn input(name: &str, rate: u32) -> Port {
        Port {
            name: name.to_owned(),
            direction: PortDirection::Input,
            token_type: DataTokenType::default(),
            rate,
        }
    }

    pub fn output(name: &str, rate: u32) -> Port {
        Port {
            name: name.to_owned(),
            direction: PortDirection::Output,
            token_type: DataTokenType::default(),
            rate,
        }
    }

    pub fn with_token_type(mut self, token_type: DataTokenType) -> Port {
        self.token_type = token_type;
        self
    }
}

/// A computation node of the dataflow graph.
///
/// `function` names the entry of the implementation catalog this actor draws its
/// implementations from. It defaults to the actor id. A non empty `admissible`
/// list narrows the catalog entry down to the named implementations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub admissible: Vec<String>,
}

impl Actor {
    pub fn new(id: &str) -> Actor {
        Actor {
            id: id.to_owned(),
            function: None,
            ports: Vec::new(),
            admissible: Vec::new(),
        }
    }

    pub fn with_function(mut self, function: &str) -> Actor {
        self.function = Some(function.to_owned());
        self
    }

    pub fn with_input(mut self, name: &str, rate: u32) -> Actor {
        self.ports.push(Port::input(name, rate));
        self
    }

    pub fn with_output(mut self, name: &str, rate: u32) -> Actor {
        self.ports.push(Port::output(name, rate));
        self
    }

    pub fn with_port(mut self, port: Port) -> Actor {
        self.ports.push(port);
        self
    }

    pub fn with_admissible(mut self, implementations: &[&str]) -> Actor {
        self.admissible = implementations.iter().map(|x| x.to_string()).collect();
        self
    }

    pub fn function(&self) -> &str {
        self.function.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PortRef {
    pub actor: String,
    pub port: String,
}

impl PortRef {
    pub fn new(actor: &str, port: &str) -> PortRef {
        PortRef {
            actor: actor.to_owned(),
            port: port.to_owned(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.actor, self.port)
    }
}

/// A channel from one output port to one input port.
///
/// `initial_tokens` are the delay tokens present before the first period.
/// `capacity`, when present, bounds the number of tokens the channel may hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Edge {
    pub src: PortRef,
    pub dst: PortRef,
    #[serde(default)]
    pub initial_tokens: u32,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl Edge {
    pub fn new(src: (&str, &str), dst: (&str, &str)) -> Edge {
        Edge {
            src: PortRef::new(src.0, src.1),
            dst: PortRef::new(dst.0, dst.1),
            initial_tokens: 0,
            capacity: None,
        }
    }

    pub fn with_initial_tokens(mut self, tokens: u32) -> Edge {
        self.initial_tokens = tokens;
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Edge {
        self.capacity = Some(capacity);
        self
    }

    pub fn name(&self) -> String {
        format!("{}->{}", self.src, self.dst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedEdge {
    src: usize,
    dst: usize,
    production: u64,
    consumption: u64,
}

/// The serialized shape of a [DataflowGraph], before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DataflowGraphBody {
    pub actors: Vec<Actor>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A validated synchronous dataflow graph.
///
/// Actors are kept sorted by id, which is the order every analysis iterates
/// them in. Edges keep their declaration order and are addressed by position.
/// Cycles are allowed; whether they can execute is up to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DataflowGraphBody", into = "DataflowGraphBody")]
pub struct DataflowGraph {
    actors: Vec<Actor>,
    edges: Vec<Edge>,
    resolved: Vec<ResolvedEdge>,
    actor_idx: HashMap<String, usize>,
}

impl DataflowGraph {
    pub fn new(mut actors: Vec<Actor>, edges: Vec<Edge>) -> Result<DataflowGraph, StructuralError> {
        if actors.is_empty() {
            return Err(StructuralError::EmptyGraph);
        }
        actors.sort_by(|a, b| a.id.cmp(&b.id));
        let mut actor_idx = HashMap::new();
        for (i, a) in actors.iter().enumerate() {
            if actor_idx.insert(a.id.to_owned(), i).is_some() {
                return Err(StructuralError::DuplicateActor(a.id.to_owned()));
            }
            let mut names = HashSet::new();
            for p in &a.ports {
                if !names.insert(p.name.as_str()) {
                    return Err(StructuralError::DuplicatePort {
                        actor: a.id.to_owned(),
                        port: p.name.to_owned(),
                    });
                }
                if p.rate == 0 {
                    return Err(StructuralError::ZeroRate {
                        actor: a.id.to_owned(),
                        port: p.name.to_owned(),
                    });
                }
            }
        }
        let mut used: HashSet<(&str, &str)> = HashSet::new();
        let mut resolved = Vec::with_capacity(edges.len());
        for e in &edges {
            let (src, src_port) =
                Self::resolve_endpoint(&actors, &actor_idx, &e.src, PortDirection::Output)?;
            let (dst, dst_port) =
                Self::resolve_endpoint(&actors, &actor_idx, &e.dst, PortDirection::Input)?;
            for endpoint in [&e.src, &e.dst] {
                if !used.insert((endpoint.actor.as_str(), endpoint.port.as_str())) {
                    return Err(StructuralError::DuplicateEndpoint {
                        actor: endpoint.actor.to_owned(),
                        port: endpoint.port.to_owned(),
                    });
                }
            }
            if !src_port.token_type.is_compatible(&dst_port.token_type) {
                return Err(StructuralError::TypeMismatch {
                    src: e.src.to_string(),
                    src_type: src_port.token_type.to_string(),
                    dst: e.dst.to_string(),
                    dst_type: dst_port.token_type.to_string(),
                });
            }
            resolved.push(ResolvedEdge {
                src,
                dst,
                production: src_port.rate as u64,
                consumption: dst_port.rate as u64,
            });
        }
        for a in &actors {
            if let Some(p) = a
                .ports
                .iter()
                .find(|p| !used.contains(&(a.id.as_str(), p.name.as_str())))
            {
                return Err(StructuralError::DanglingPort {
                    actor: a.id.to_owned(),
                    port: p.name.to_owned(),
                });
            }
        }
        Ok(DataflowGraph {
            actors,
            edges,
            resolved,
            actor_idx,
        })
    }

    fn resolve_endpoint<'a>(
        actors: &'a [Actor],
        actor_idx: &HashMap<String, usize>,
        endpoint: &PortRef,
        direction: PortDirection,
    ) -> Result<(usize, &'a Port), StructuralError> {
        let idx = *actor_idx
            .get(&endpoint.actor)
            .ok_or_else(|| StructuralError::UnknownActor(endpoint.actor.to_owned()))?;
        let port = actors[idx]
            .port(&endpoint.port)
            .ok_or_else(|| StructuralError::UnknownPort {
                actor: endpoint.actor.to_owned(),
                port: endpoint.port.to_owned(),
            })?;
        if port.direction != direction {
            return Err(StructuralError::DirectionMismatch {
                actor: endpoint.actor.to_owned(),
                port: endpoint.port.to_owned(),
            });
        }
        Ok((idx, port))
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn actor(&self, id: &str) -> Option<&Actor> {
        self.actor_idx.get(id).map(|i| &self.actors[*i])
    }

    pub fn actor_index(&self, id: &str) -> Option<usize> {
        self.actor_idx.get(id).copied()
    }

    /// Source and destination actor indexes of the edge at position `edge`.
    pub fn endpoints(&self, edge: usize) -> (usize, usize) {
        let r = &self.resolved[edge];
        (r.src, r.dst)
    }

    pub fn production(&self, edge: usize) -> u64 {
        self.resolved[edge].production
    }

    pub fn consumption(&self, edge: usize) -> u64 {
        self.resolved[edge].consumption
    }

    pub fn incoming(&self, actor: usize) -> impl Iterator<Item = usize> + '_ {
        self.resolved
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.dst == actor)
            .map(|(i, _)| i)
    }

    pub fn outgoing(&self, actor: usize) -> impl Iterator<Item = usize> + '_ {
        self.resolved
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.src == actor)
            .map(|(i, _)| i)
    }

    /// The actor graph with actor indexes as node weights and edge positions as
    /// edge weights. Node `i` of the result is actor `i`.
    pub fn as_graph(&self) -> Graph<usize, usize> {
        let mut g: Graph<usize, usize> = Graph::with_capacity(self.actors.len(), self.edges.len());
        let nodes: Vec<_> = (0..self.actors.len()).map(|i| g.add_node(i)).collect();
        for (i, r) in self.resolved.iter().enumerate() {
            g.add_edge(nodes[r.src], nodes[r.dst], i);
        }
        g
    }
}

impl TryFrom<DataflowGraphBody> for DataflowGraph {
    type Error = StructuralError;

    fn try_from(body: DataflowGraphBody) -> Result<Self, Self::Error> {
        DataflowGraph::new(body.actors, body.edges)
    }
}

impl From<DataflowGraph> for DataflowGraphBody {
    fn from(g: DataflowGraph) -> Self {
        DataflowGraphBody {
            actors: g.actors,
            edges: g.edges,
        }
    }
}

impl JsonSchema for DataflowGraph {
    fn schema_name() -> String {
        "DataflowGraph".to_owned()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        DataflowGraphBody::json_schema(gen)
    }
}
