/// Divisors of `n` in increasing order.
pub fn divisors(n: u64) -> Vec<u64> {
    let mut low = Vec::new();
    let mut high = Vec::new();
    let mut d = 1u64;
    while d.saturating_mul(d) <= n {
        if n % d == 0 {
            low.push(d);
            if d != n / d {
                high.push(n / d);
            }
        }
        d += 1;
    }
    low.extend(high.into_iter().rev());
    low
}

/// Smallest entry of the increasing `list` not below `target`, else its last.
fn at_least(list: &[u64], target: u64) -> u64 {
    list.iter()
        .copied()
        .find(|d| *d >= target)
        .or(list.last().copied())
        .unwrap_or(1)
}

/// Instance counts matching `actor` running `count` instances.
///
/// With `count` instances, `actor` needs `reps[actor] / count` sequential
/// rounds per period. Every other actor gets the fewest instances, among the
/// divisors of its repetitions, that cover its firings in that many rounds.
fn balanced_with(reps: &[u64], divisors: &[Vec<u64>], actor: usize, count: u64) -> Vec<u64> {
    let rounds = (reps[actor] / count).max(1);
    reps.iter()
        .zip(divisors.iter())
        .map(|(r, ds)| at_least(ds, r / rounds))
        .collect()
}

/// Every load balanced assignment of parallel instance counts, one count per
/// actor in actor order, without repetitions.
///
/// Instance counts divide the repetitions so that firings deal evenly over
/// the instances. Profiles are listed starting from the actors that fire most
/// and, per actor, from the fewest instances, so the first profile runs every
/// actor on a single instance and a prefix of the list holds the profiles
/// closest to it.
pub fn load_balanced_profiles(reps: &[u64]) -> Vec<Vec<u64>> {
    let divisors: Vec<Vec<u64>> = reps.iter().map(|r| divisors(*r)).collect();
    let mut order: Vec<usize> = (0..reps.len()).collect();
    order.sort_by(|a, b| reps[*b].cmp(&reps[*a]));
    let mut profiles: Vec<Vec<u64>> = Vec::new();
    for actor in order {
        for count in &divisors[actor] {
            let profile = balanced_with(reps, &divisors, actor, *count);
            if !profiles.contains(&profile) {
                profiles.push(profile);
            }
        }
    }
    if profiles.is_empty() {
        profiles.push(vec![1; reps.len()]);
    }
    profiles
}

/// The leading `effort` percent of `profiles`, at least one of them.
pub fn within_effort(mut profiles: Vec<Vec<u64>>, effort: u8) -> Vec<Vec<u64>> {
    let keep = (profiles.len() * effort.min(100) as usize / 100).max(1);
    profiles.truncate(keep);
    profiles
}
