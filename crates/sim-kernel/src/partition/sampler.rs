//! Sampling draws against a partition.
//!
//! A [`PartitionSampler`] is a read-only request: an optional excluded
//! entity, an optional label constraint, and an optional weighting function
//! over label tuples. Empty candidate sets answer `None`, never an error;
//! only a malformed request (impossible constraint dimensions, negative or
//! non-finite weights) faults.

use contracts::{LabelSet, LabelValue, PartitionKey, PersonId};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::error::SimError;
use crate::partition::index::PartitionIndex;
use crate::people::PopulationView;

type WeightFn = Box<dyn Fn(&LabelSet) -> f64>;

/// Constraints and weights for one sampling draw.
#[derive(Default)]
pub struct PartitionSampler {
    pub(crate) excluded: Option<PersonId>,
    pub(crate) label_constraint: Option<Vec<Option<LabelValue>>>,
    pub(crate) weighting: Option<WeightFn>,
}

impl PartitionSampler {
    /// Uniform draw over the whole partition.
    pub fn uniform() -> Self {
        Self::default()
    }

    /// Never return this entity, without ever treating its slot as a dead
    /// weight: draws are made over the remaining candidates directly.
    pub fn exclude(mut self, person: PersonId) -> Self {
        self.excluded = Some(person);
        self
    }

    /// Restrict candidates to entities whose label tuple matches. `None`
    /// positions are wildcards; the constraint may name fewer dimensions
    /// than the partition has labelers, never more.
    pub fn constrain(mut self, constraint: Vec<Option<LabelValue>>) -> Self {
        self.label_constraint = Some(constraint);
        self
    }

    /// Sample label tuples proportionally to the returned non-negative
    /// weight, then uniformly within the chosen tuple's members.
    pub fn weight_by<W>(mut self, weighting: W) -> Self
    where
        W: Fn(&LabelSet) -> f64 + 'static,
    {
        self.weighting = Some(Box::new(weighting));
        self
    }
}

fn constraint_matches(constraint: Option<&[Option<LabelValue>]>, labels: &LabelSet) -> bool {
    match constraint {
        None => true,
        Some(required) => required.iter().enumerate().all(|(dimension, want)| match want {
            None => true,
            Some(value) => labels.get(dimension) == Some(value),
        }),
    }
}

struct Candidate<'a> {
    labels: &'a LabelSet,
    members: &'a [PersonId],
    effective: usize,
    excluded_position: Option<usize>,
}

impl Candidate<'_> {
    /// Map a draw in `0..effective` to a member, skipping the excluded slot
    /// by the swap trick: the excluded member is conceptually moved to the
    /// end of the cell, and the draw range already stops one short.
    fn pick(&self, offset: usize) -> PersonId {
        match self.excluded_position {
            Some(excluded) if offset == excluded => self.members[self.members.len() - 1],
            _ => self.members[offset],
        }
    }
}

/// Draw from a materialized index.
pub(crate) fn sample_index(
    index: &PartitionIndex,
    sampler: &PartitionSampler,
    dimensions: usize,
    key: &PartitionKey,
    rng: &mut ChaCha8Rng,
) -> Result<Option<PersonId>, SimError> {
    if let Some(constraint) = &sampler.label_constraint {
        if constraint.len() > dimensions {
            return Err(SimError::InvalidLabelConstraint {
                expected: dimensions,
                got: constraint.len(),
            });
        }
    }

    let excluded_slot = sampler.excluded.and_then(|person| index.position_of(person));
    let mut candidates = Vec::new();
    for (labels, members) in index.cells() {
        if !constraint_matches(sampler.label_constraint.as_deref(), labels) {
            continue;
        }
        let excluded_position = match &excluded_slot {
            Some((excluded_labels, position)) if *excluded_labels == labels => Some(*position),
            _ => None,
        };
        let effective = members.len() - usize::from(excluded_position.is_some());
        if effective == 0 {
            continue;
        }
        candidates.push(Candidate {
            labels,
            members,
            effective,
            excluded_position,
        });
    }
    if candidates.is_empty() {
        return Ok(None);
    }

    let (candidate, offset) = match &sampler.weighting {
        Some(weight_fn) => {
            let mut weights = Vec::with_capacity(candidates.len());
            let mut total = 0.0_f64;
            for candidate in &candidates {
                let weight = weight_fn(candidate.labels);
                if !weight.is_finite() || weight < 0.0 {
                    return Err(SimError::InvalidSamplingWeight {
                        key: key.clone(),
                        weight,
                    });
                }
                weights.push(weight);
                total += weight;
            }
            if total <= 0.0 {
                return Ok(None);
            }
            let mut draw = rng.random::<f64>() * total;
            let mut selected = None;
            for (position, weight) in weights.iter().enumerate() {
                if *weight <= 0.0 {
                    continue;
                }
                if draw < *weight {
                    selected = Some(position);
                    break;
                }
                draw -= *weight;
            }
            // Float accumulation can leave a sliver past the last cell.
            let selected = match selected.or_else(|| weights.iter().rposition(|w| *w > 0.0)) {
                Some(position) => position,
                None => return Ok(None),
            };
            let candidate = &candidates[selected];
            let offset = rng.random_range(0..candidate.effective);
            (candidate, offset)
        }
        None => {
            let total: usize = candidates.iter().map(|candidate| candidate.effective).sum();
            let mut draw = rng.random_range(0..total);
            let mut selected = &candidates[candidates.len() - 1];
            for candidate in &candidates {
                if draw < candidate.effective {
                    selected = candidate;
                    break;
                }
                draw -= candidate.effective;
            }
            (selected, draw)
        }
    };

    Ok(Some(candidate.pick(offset)))
}

/// Draw from the full live population, for degenerate partitions: O(1)
/// direct indexing into the store, no materialized index involved.
pub(crate) fn sample_population(
    view: &dyn PopulationView,
    sampler: &PartitionSampler,
    key: &PartitionKey,
    rng: &mut ChaCha8Rng,
) -> Result<Option<PersonId>, SimError> {
    if let Some(constraint) = &sampler.label_constraint {
        if !constraint.is_empty() {
            return Err(SimError::InvalidLabelConstraint {
                expected: 0,
                got: constraint.len(),
            });
        }
    }
    if let Some(weight_fn) = &sampler.weighting {
        // A degenerate partition has a single, empty label tuple.
        let weight = weight_fn(&LabelSet::default());
        if !weight.is_finite() || weight < 0.0 {
            return Err(SimError::InvalidSamplingWeight {
                key: key.clone(),
                weight,
            });
        }
        if weight == 0.0 {
            return Ok(None);
        }
    }

    let population = view.population();
    let excluded = sampler.excluded.filter(|person| view.person_exists(*person));
    match excluded {
        Some(excluded) => {
            if population <= 1 {
                return Ok(None);
            }
            let index = rng.random_range(0..population - 1);
            match view.person_by_index(index) {
                Some(person) if person == excluded => Ok(view.person_by_index(population - 1)),
                other => Ok(other),
            }
        }
        None => {
            if population == 0 {
                return Ok(None);
            }
            Ok(view.person_by_index(rng.random_range(0..population)))
        }
    }
}
