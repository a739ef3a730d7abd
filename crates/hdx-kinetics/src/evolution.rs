//! Seeded differential evolution (`best1bin`) with a local polish.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use hdx_core::RngHandle;

use crate::powell::{self, Counted, Minimum, PowellOptions};

fn default_population_factor() -> usize {
    15
}

fn default_max_generations() -> usize {
    1000
}

fn default_tol() -> f64 {
    0.01
}

fn default_mutation() -> (f64, f64) {
    (0.5, 1.0)
}

fn default_recombination() -> f64 {
    0.7
}

fn default_polish() -> bool {
    true
}

/// Parameters of [`differential_evolution`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvolutionOptions {
    /// Population size is `population_factor x dimension`.
    #[serde(default = "default_population_factor")]
    pub population_factor: usize,
    /// Generation cap.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Relative spread of population energies at which the search stops.
    #[serde(default = "default_tol")]
    pub tol: f64,
    /// Absolute spread of population energies at which the search stops.
    #[serde(default)]
    pub atol: f64,
    /// Dither range of the mutation constant, resampled each generation.
    #[serde(default = "default_mutation")]
    pub mutation: (f64, f64),
    /// Binomial crossover probability.
    #[serde(default = "default_recombination")]
    pub recombination: f64,
    /// Refine the best member with [`powell::minimize`].
    #[serde(default = "default_polish")]
    pub polish: bool,
}

impl Default for EvolutionOptions {
    fn default() -> Self {
        Self {
            population_factor: default_population_factor(),
            max_generations: default_max_generations(),
            tol: default_tol(),
            atol: 0.0,
            mutation: default_mutation(),
            recombination: default_recombination(),
            polish: default_polish(),
        }
    }
}

fn scale(unit: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    unit.iter()
        .zip(bounds)
        .map(|(&u, &(lo, hi))| lo + u * (hi - lo))
        .collect()
}

/// Latin hypercube sample of `size` points in the unit cube.
fn latin_hypercube(size: usize, dim: usize, rng: &mut RngHandle) -> Vec<Vec<f64>> {
    let mut population = vec![vec![0.0; dim]; size];
    let segment = 1.0 / size as f64;
    for j in 0..dim {
        let mut strata: Vec<usize> = (0..size).collect();
        strata.shuffle(rng);
        for (member, stratum) in population.iter_mut().zip(strata) {
            member[j] = (stratum as f64 + rng.gen::<f64>()) * segment;
        }
    }
    population
}

fn converged(energies: &[f64], options: &EvolutionOptions) -> bool {
    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let var = energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
    let spread = var.sqrt();
    spread.is_finite() && spread <= options.atol + options.tol * mean.abs()
}

/// Global minimisation of `f` inside `bounds`.
///
/// Members live in the unit cube and are scaled to the bounds before
/// evaluation. Trial components leaving the cube are resampled uniformly.
/// Members are replaced as soon as a trial improves on them. The result is
/// deterministic for a given `rng` state.
pub fn differential_evolution<F: FnMut(&[f64]) -> f64>(
    f: F,
    bounds: &[(f64, f64)],
    options: &EvolutionOptions,
    rng: &mut RngHandle,
) -> Minimum {
    let dim = bounds.len();
    let size = (options.population_factor * dim).max(5);
    let mut objective = Counted::new(f);

    let mut population = latin_hypercube(size, dim, rng);
    let mut energies: Vec<f64> = population
        .iter()
        .map(|member| objective.call(&scale(member, bounds)))
        .collect();
    let mut best = 0;
    for (i, &e) in energies.iter().enumerate() {
        if e < energies[best] {
            best = i;
        }
    }

    let (m_lo, m_hi) = options.mutation;
    let mut generations = 0;
    while generations < options.max_generations && !converged(&energies, options) {
        generations += 1;
        let mutation = if m_hi > m_lo {
            rng.gen_range(m_lo..m_hi)
        } else {
            m_lo
        };
        for i in 0..size {
            let (r0, r1) = loop {
                let r0 = rng.gen_range(0..size);
                let r1 = rng.gen_range(0..size);
                if r0 != i && r1 != i && r0 != r1 {
                    break (r0, r1);
                }
            };
            let fill = rng.gen_range(0..dim.max(1));
            let mut trial = population[i].clone();
            for j in 0..dim {
                if j == fill || rng.gen::<f64>() < options.recombination {
                    trial[j] = population[best][j]
                        + mutation * (population[r0][j] - population[r1][j]);
                }
            }
            for value in trial.iter_mut() {
                if !(0.0..=1.0).contains(&*value) {
                    *value = rng.gen::<f64>();
                }
            }
            let energy = objective.call(&scale(&trial, bounds));
            if energy <= energies[i] {
                population[i] = trial;
                energies[i] = energy;
                if energy < energies[best] {
                    best = i;
                }
            }
        }
    }

    let mut result = Minimum {
        x: scale(&population[best], bounds),
        value: energies[best],
        iterations: generations,
        evaluations: objective.evaluations,
    };
    if options.polish {
        let polished = powell::minimize(
            |x: &[f64]| objective.call(x),
            &result.x,
            bounds,
            &PowellOptions::default(),
        );
        result.evaluations = objective.evaluations;
        if polished.value < result.value {
            result.x = polished.x;
            result.value = polished.value;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_wells(p: &[f64]) -> f64 {
        let left = (p[0] + 2.0).powi(2) + 1.0;
        let right = (p[0] - 3.0).powi(2);
        left.min(right) + p[1].powi(2)
    }

    #[test]
    fn finds_deeper_well() {
        let mut rng = RngHandle::from_seed(7);
        let result = differential_evolution(
            two_wells,
            &[(-5.0, 5.0), (-1.0, 1.0)],
            &EvolutionOptions::default(),
            &mut rng,
        );
        assert!((result.x[0] - 3.0).abs() < 1e-3, "{:?}", result);
        assert!(result.value < 1e-6);
    }

    #[test]
    fn same_seed_same_result() {
        let bounds = [(-5.0, 5.0), (-1.0, 1.0)];
        let options = EvolutionOptions::default();
        let a = differential_evolution(two_wells, &bounds, &options, &mut RngHandle::from_seed(11));
        let b = differential_evolution(two_wells, &bounds, &options, &mut RngHandle::from_seed(11));
        assert_eq!(a, b);
    }
}
