use std::collections::VecDeque;

use log::debug;
use petgraph::algo::connected_components;
use sylva_core::{AnalysisError, DataflowGraph, RepetitionVector};

pub(crate) fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn lcm(a: u128, b: u128) -> Option<u128> {
    (a / gcd(a, b)).checked_mul(b)
}

/// A positive rational kept in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ratio {
    num: u128,
    den: u128,
}

impl Ratio {
    fn new(num: u128, den: u128) -> Ratio {
        let g = gcd(num, den);
        Ratio {
            num: num / g,
            den: den / g,
        }
    }

    /// `self * p / c`, failing on overflow.
    fn scale(self, p: u64, c: u64) -> Option<Ratio> {
        let num = self.num.checked_mul(p as u128)?;
        let den = self.den.checked_mul(c as u128)?;
        Some(Ratio::new(num, den))
    }
}

/// Solves the balance equations of `graph`.
///
/// Returns the unique minimal positive integer vector `q` such that for every
/// edge `q[src] * production == q[dst] * consumption`. All actors of a graph
/// share one period, so a graph with more than one weakly connected component
/// is rejected as `Unconnected`.
pub fn repetition_vector(graph: &DataflowGraph) -> Result<RepetitionVector, AnalysisError> {
    let n = graph.actors().len();
    let components = connected_components(&graph.as_graph());
    if components > 1 {
        return Err(AnalysisError::Unconnected { components });
    }
    let mut rates: Vec<Option<Ratio>> = vec![None; n];
    rates[0] = Some(Ratio::new(1, 1));
    let mut queue = VecDeque::from([0usize]);
    while let Some(a) = queue.pop_front() {
        let Some(qa) = rates[a] else { continue };
        let neighbours = graph
            .outgoing(a)
            .map(|e| {
                let (_, dst) = graph.endpoints(e);
                (e, dst, qa.scale(graph.production(e), graph.consumption(e)))
            })
            .chain(graph.incoming(a).map(|e| {
                let (src, _) = graph.endpoints(e);
                (e, src, qa.scale(graph.consumption(e), graph.production(e)))
            }))
            .collect::<Vec<_>>();
        for (e, other, q) in neighbours {
            let q = q.ok_or(AnalysisError::RepetitionOverflow)?;
            match rates[other] {
                None => {
                    rates[other] = Some(q);
                    queue.push_back(other);
                }
                Some(known) if known != q => {
                    return Err(AnalysisError::InconsistentRates {
                        edge: graph.edges()[e].name(),
                    })
                }
                Some(_) => {}
            }
        }
    }
    let rates: Vec<Ratio> = rates
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(AnalysisError::Unconnected { components })?;
    let mut den = 1u128;
    for r in &rates {
        den = lcm(den, r.den).ok_or(AnalysisError::RepetitionOverflow)?;
    }
    let scaled = rates
        .iter()
        .map(|r| r.num.checked_mul(den / r.den))
        .collect::<Option<Vec<u128>>>()
        .ok_or(AnalysisError::RepetitionOverflow)?;
    let common = scaled.iter().copied().fold(0, gcd);
    let mut q = RepetitionVector::new();
    for (a, v) in graph.actors().iter().zip(scaled) {
        let v = u64::try_from(v / common).map_err(|_| AnalysisError::RepetitionOverflow)?;
        q.insert(a.id.to_owned(), v);
    }
    debug!(
        "Repetition vector: {}",
        q.iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .reduce(|s1, s2| format!("{}, {}", s1, s2))
            .unwrap_or("None".to_owned())
    );
    Ok(q)
}
