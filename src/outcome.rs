use rand::Rng;

/// One configured reward outcome: a weight plus optional nested suboutcomes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub weight: f64,
    pub category: String,
    pub suboutcomes: Vec<SubOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubOutcome {
    pub weight: f64,
    pub name: String,
}

/// Cumulative-distribution sampling over a weight list. Returns the selected
/// index, or `None` for an empty or weightless list (the "no outcome"
/// sentinel).
///
/// Floating accumulation can leave the final bound fractionally below 1.0; a
/// draw above it selects the last index.
pub fn resolve_weighted<R: Rng>(weights: &[f64], rng: &mut R) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    let draw: f64 = rng.gen();
    let mut cumulative = 0.0;
    let mut last_eligible = 0;
    for (i, weight) in weights.iter().enumerate() {
        if !weight.is_finite() || *weight <= 0.0 {
            continue;
        }
        cumulative += weight / total;
        last_eligible = i;
        if draw < cumulative {
            return Some(i);
        }
    }
    Some(last_eligible)
}

/// Selects among top-level outcomes.
pub fn resolve_outcome<R: Rng>(outcomes: &[Outcome], rng: &mut R) -> Option<usize> {
    let weights: Vec<f64> = outcomes.iter().map(|o| o.weight).collect();
    resolve_weighted(&weights, rng)
}

/// Selects among one outcome's suboutcomes.
pub fn resolve_suboutcome<R: Rng>(outcome: &Outcome, rng: &mut R) -> Option<usize> {
    let weights: Vec<f64> = outcome.suboutcomes.iter().map(|s| s.weight).collect();
    resolve_weighted(&weights, rng)
}
