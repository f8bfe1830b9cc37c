use std::collections::{HashMap, HashSet};

use petgraph::{algo::dijkstra, graph::UnGraph};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    dataflow::DataflowGraph,
    error::{ConfigurationError, MappingError},
    system::ActorBinding,
    CostedImplementation,
};

fn one_u32() -> u32 {
    1
}

fn one_u64() -> u64 {
    1
}

/// One reconfigurable resource of the fabric.
///
/// `capacity` counts how many implementation units of `unit_type` the resource
/// hosts at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResourceUnit {
    pub id: String,
    pub unit_type: String,
    #[serde(default = "one_u32")]
    pub capacity: u32,
}

impl ResourceUnit {
    pub fn new(id: &str, unit_type: &str, capacity: u32) -> ResourceUnit {
        ResourceUnit {
            id: id.to_owned(),
            unit_type: unit_type.to_owned(),
            capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FabricResourceModelBody {
    pub units: Vec<ResourceUnit>,
    /// Undirected interconnect links between unit ids.
    #[serde(default)]
    pub links: Vec<(String, String)>,
    #[serde(default = "one_u32")]
    pub max_hops: u32,
    /// Communication time between actors sharing a unit.
    #[serde(default = "one_u64")]
    pub intra_unit_delay: u64,
    /// Communication time per interconnect hop.
    #[serde(default = "one_u64")]
    pub inter_unit_delay: u64,
}

/// Abstract description of the CGRA: its units and their interconnect.
///
/// The model is immutable. Assignments are tested against it, never applied to
/// it, so any number of evaluations can consult it at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FabricResourceModelBody", into = "FabricResourceModelBody")]
pub struct FabricResourceModel {
    units: Vec<ResourceUnit>,
    links: Vec<(String, String)>,
    max_hops: u32,
    intra_unit_delay: u64,
    inter_unit_delay: u64,
    unit_idx: HashMap<String, usize>,
    hops: Vec<Vec<Option<u32>>>,
}

impl FabricResourceModel {
    pub fn new(body: FabricResourceModelBody) -> Result<FabricResourceModel, ConfigurationError> {
        let mut unit_idx = HashMap::new();
        for (i, u) in body.units.iter().enumerate() {
            if unit_idx.insert(u.id.to_owned(), i).is_some() {
                return Err(ConfigurationError::DuplicateIdentifier(u.id.to_owned()));
            }
            if u.capacity == 0 {
                return Err(ConfigurationError::InvalidFabric(format!(
                    "unit '{}' has no capacity",
                    u.id
                )));
            }
        }
        let mut g: UnGraph<usize, ()> = UnGraph::default();
        let nodes: Vec<_> = (0..body.units.len()).map(|i| g.add_node(i)).collect();
        let mut seen = HashSet::new();
        for (a, b) in &body.links {
            let (ia, ib) = match (unit_idx.get(a), unit_idx.get(b)) {
                (Some(ia), Some(ib)) => (*ia, *ib),
                _ => {
                    return Err(ConfigurationError::InvalidFabric(format!(
                        "link {} - {} refers to an unknown unit",
                        a, b
                    )))
                }
            };
            if ia == ib {
                return Err(ConfigurationError::InvalidFabric(format!(
                    "unit '{}' is linked to itself",
                    a
                )));
            }
            if seen.insert((ia.min(ib), ia.max(ib))) {
                g.add_edge(nodes[ia], nodes[ib], ());
            }
        }
        let hops = nodes
            .iter()
            .map(|n| {
                let dist = dijkstra(&g, *n, None, |_| 1u32);
                nodes.iter().map(|m| dist.get(m).copied()).collect()
            })
            .collect();
        Ok(FabricResourceModel {
            units: body.units,
            links: body.links,
            max_hops: body.max_hops,
            intra_unit_delay: body.intra_unit_delay,
            inter_unit_delay: body.inter_unit_delay,
            unit_idx,
            hops,
        })
    }

    /// A `width` by `height` mesh of single capacity units of one type, linked to
    /// their horizontal and vertical neighbours. Unit ids are `u{x}_{y}`.
    pub fn grid(width: u32, height: u32, unit_type: &str) -> Result<FabricResourceModel, ConfigurationError> {
        let id = |x: u32, y: u32| format!("u{}_{}", x, y);
        let mut units = Vec::new();
        let mut links = Vec::new();
        for y in 0..height {
            for x in 0..width {
                units.push(ResourceUnit::new(&id(x, y), unit_type, 1));
                if x + 1 < width {
                    links.push((id(x, y), id(x + 1, y)));
                }
                if y + 1 < height {
                    links.push((id(x, y), id(x, y + 1)));
                }
            }
        }
        FabricResourceModel::new(FabricResourceModelBody {
            units,
            links,
            max_hops: 1,
            intra_unit_delay: 1,
            inter_unit_delay: 1,
        })
    }

    pub fn units(&self) -> &[ResourceUnit] {
        &self.units
    }

    pub fn unit(&self, id: &str) -> Option<&ResourceUnit> {
        self.unit_idx.get(id).map(|i| &self.units[*i])
    }

    pub fn units_of_type<'a>(&'a self, unit_type: &'a str) -> impl Iterator<Item = &'a ResourceUnit> {
        self.units.iter().filter(move |u| u.unit_type == unit_type)
    }

    pub fn max_hops(&self) -> u32 {
        self.max_hops
    }

    /// Interconnect distance between two units, if they are connected at all.
    pub fn hops(&self, a: &str, b: &str) -> Option<u32> {
        let ia = self.unit_idx.get(a)?;
        let ib = self.unit_idx.get(b)?;
        self.hops[*ia][*ib]
    }

    /// Time for one token to travel between the units hosting two actors.
    pub fn communication_delay(&self, src: Option<&str>, dst: Option<&str>) -> u64 {
        match (src, dst) {
            (Some(a), Some(b)) if a == b => self.intra_unit_delay,
            (Some(a), Some(b)) => {
                self.inter_unit_delay * self.hops(a, b).unwrap_or(self.max_hops) as u64
            }
            _ => self.inter_unit_delay * self.max_hops as u64,
        }
    }

    /// Sum of the capacities of every unit.
    pub fn total_capacity(&self) -> u64 {
        self.units.iter().map(|u| u.capacity as u64).sum()
    }

    /// Tests whether the bindings, one per actor of `graph` in actor order, are
    /// physically realizable.
    ///
    /// Every instance loads its own unit. Any instance of a producer may feed
    /// any instance of its consumer, so every such pair must be within reach.
    pub fn fits(&self, graph: &DataflowGraph, bindings: &[ActorBinding]) -> Result<(), MappingError> {
        let mut load = vec![0u32; self.units.len()];
        for instance in bindings.iter().flat_map(|b| b.instances.iter()) {
            let unit_type = instance.implementation.unit_type();
            let exceeded = |unit: Option<&str>| MappingError::CapacityExceeded {
                unit_type: unit_type.to_owned(),
                unit: unit.map(|u| u.to_owned()),
            };
            let unit = instance.unit.as_deref().ok_or_else(|| exceeded(None))?;
            let idx = *self.unit_idx.get(unit).ok_or_else(|| exceeded(Some(unit)))?;
            if self.units[idx].unit_type != unit_type {
                return Err(exceeded(Some(unit)));
            }
            load[idx] = load[idx].saturating_add(instance.implementation.units());
            if load[idx] > self.units[idx].capacity {
                return Err(exceeded(Some(unit)));
            }
        }
        for e in 0..graph.edges().len() {
            let (src, dst) = graph.endpoints(e);
            let (Some(s), Some(d)) = (bindings.get(src), bindings.get(dst)) else {
                continue;
            };
            for (su, du) in s
                .units()
                .flatten()
                .flat_map(|su| d.units().flatten().map(move |du| (su, du)))
            {
                if su != du && self.hops(su, du).map_or(true, |h| h > self.max_hops) {
                    return Err(MappingError::AdjacencyViolated {
                        src_actor: graph.actors()[src].id.to_owned(),
                        dst_actor: graph.actors()[dst].id.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<FabricResourceModelBody> for FabricResourceModel {
    type Error = ConfigurationError;

    fn try_from(body: FabricResourceModelBody) -> Result<Self, Self::Error> {
        FabricResourceModel::new(body)
    }
}

impl From<FabricResourceModel> for FabricResourceModelBody {
    fn from(f: FabricResourceModel) -> Self {
        FabricResourceModelBody {
            units: f.units,
            links: f.links,
            max_hops: f.max_hops,
            intra_unit_delay: f.intra_unit_delay,
            inter_unit_delay: f.inter_unit_delay,
        }
    }
}

impl JsonSchema for FabricResourceModel {
    fn schema_name() -> String {
        "FabricResourceModel".to_owned()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        FabricResourceModelBody::json_schema(gen)
    }
}
