//! Derivative-free bounded minimisation used to allocate power across motors.
//!
//! The search runs in two phases over the unit hypercube. A DIRECT (dividing rectangles) global
//! phase samples the whole box, repeatedly trisecting the rectangles that could still hold the
//! minimum. The best point found is then polished with a Hooke-Jeeves pattern search.
//! Both phases stop as soon as the objective reaches the stop value or the time budget runs out.

use log::debug;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum AllocationError {
    #[error("cannot allocate power across zero motors")]
    NoMotors,
    #[error("invalid bounds [{lower}, {upper}]")]
    InvalidBounds { lower: f64, upper: f64 },
    #[error("invalid stop value {0}")]
    InvalidStopValue(f64),
    #[error("time budget must be non-zero")]
    ZeroTimeBudget,
}

/// Why a search finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The objective reached the stop value.
    StopValue,
    /// The pattern step shrank below the minimum step.
    Converged,
    /// The time budget ran out; the best point found so far is returned.
    TimeBudget,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub x: Vec<f64>,
    pub value: f64,
    pub evaluations: usize,
    pub termination: Termination,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Allocator {
    /// Lower bound of every variable.
    pub lower: f64,
    /// Upper bound of every variable.
    pub upper: f64,
    /// Objective value at or below which the search stops early.
    pub stop_value: f64,
    /// Wall-clock budget for one search.
    pub max_time: Duration,
    /// Objective evaluations spent in the global phase before polishing.
    pub global_evaluations: usize,
    /// Pattern step, relative to the bound width, below which the polish has converged.
    pub min_step: f64,
}

impl Default for Allocator {
    fn default() -> Self {
        Self {
            lower: -1.,
            upper: 1.,
            stop_value: 0.002,
            max_time: Duration::from_millis(250),
            global_evaluations: 400,
            min_step: 1e-9,
        }
    }
}

impl Allocator {
    pub fn with_stop_value(mut self, stop_value: f64) -> Self {
        self.stop_value = stop_value;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn with_global_evaluations(mut self, evaluations: usize) -> Self {
        self.global_evaluations = evaluations;
        self
    }

    fn check(&self, dimensions: usize) -> Result<(), AllocationError> {
        if dimensions == 0 {
            return Err(AllocationError::NoMotors);
        }
        if !(self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper) {
            return Err(AllocationError::InvalidBounds {
                lower: self.lower,
                upper: self.upper,
            });
        }
        if self.stop_value.is_nan() {
            return Err(AllocationError::InvalidStopValue(self.stop_value));
        }
        if self.max_time.is_zero() {
            return Err(AllocationError::ZeroTimeBudget);
        }
        Ok(())
    }

    /// Minimise `objective` over `dimensions` variables, starting from the center of the bounds.
    ///
    /// Returns within roughly `max_time` plus the cost of one objective evaluation.
    pub fn minimize<F>(&self, dimensions: usize, objective: F) -> Result<Solution, AllocationError>
    where
        F: FnMut(&[f64]) -> f64,
    {
        self.check(dimensions)?;

        let mut search = Search {
            objective,
            lower: self.lower,
            width: self.upper - self.lower,
            stop_value: self.stop_value,
            deadline: Instant::now() + self.max_time,
            evaluations: 0,
            best: vec![0.5; dimensions],
            best_value: f64::INFINITY,
        };

        let termination = match search.direct(dimensions, self.global_evaluations) {
            Some(termination) => termination,
            None => search.polish(0.1, self.min_step),
        };

        if termination == Termination::TimeBudget {
            debug!(
                "allocation hit its {:?} budget after {} evaluations, best {:.4}",
                self.max_time, search.evaluations, search.best_value
            );
        }

        Ok(Solution {
            x: search.to_bounds(&search.best),
            value: search.best_value,
            evaluations: search.evaluations,
            termination,
        })
    }
}

struct Search<F> {
    objective: F,
    lower: f64,
    width: f64,
    stop_value: f64,
    deadline: Instant,
    evaluations: usize,
    /// Best point so far, in unit coordinates
    best: Vec<f64>,
    best_value: f64,
}

impl<F> Search<F>
where
    F: FnMut(&[f64]) -> f64,
{
    fn to_bounds(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter().map(|u| self.lower + u * self.width).collect()
    }

    fn evaluate(&mut self, unit: &[f64]) -> f64 {
        let x = self.to_bounds(unit);
        let value = (self.objective)(&x);
        self.evaluations += 1;

        let value = if value.is_nan() { f64::INFINITY } else { value };
        if value < self.best_value {
            self.best_value = value;
            self.best.clear();
            self.best.extend_from_slice(unit);
        }
        value
    }

    fn termination(&self) -> Option<Termination> {
        if self.best_value <= self.stop_value {
            Some(Termination::StopValue)
        } else if Instant::now() >= self.deadline {
            Some(Termination::TimeBudget)
        } else {
            None
        }
    }

    /// Global phase. Returns `None` once the evaluation budget is spent.
    fn direct(&mut self, dimensions: usize, max_evaluations: usize) -> Option<Termination> {
        let center = vec![0.5; dimensions];
        let value = self.evaluate(&center);
        let mut rects = vec![Rect::new(center, vec![0; dimensions], value)];

        loop {
            if let Some(termination) = self.termination() {
                return Some(termination);
            }
            if self.evaluations >= max_evaluations {
                return None;
            }

            let mut selected = potentially_optimal(&rects);
            // Highest index first so `swap_remove` never moves a pending rectangle
            selected.sort_unstable_by(|a, b| b.cmp(a));

            for index in selected {
                let parent = rects.swap_remove(index);
                let parent = self.divide(parent, &mut rects);
                rects.push(parent);

                if self.termination().is_some() {
                    break;
                }
            }
        }
    }

    /// Trisect `parent` along each of its longest sides, best sampled side first.
    fn divide(&mut self, mut parent: Rect, children: &mut Vec<Rect>) -> Rect {
        let level = parent.levels.iter().copied().min().unwrap_or(0);
        let delta = 3f64.powi(-(level as i32 + 1));

        let mut candidates = Vec::new();
        for dim in 0..parent.levels.len() {
            if parent.levels[dim] != level {
                continue;
            }

            let mut low = parent.center.clone();
            low[dim] -= delta;
            let low_value = self.evaluate(&low);

            let mut high = parent.center.clone();
            high[dim] += delta;
            let high_value = self.evaluate(&high);

            candidates.push((dim, low, low_value, high, high_value));
        }

        candidates.sort_by(|a, b| a.2.min(a.4).total_cmp(&b.2.min(b.4)));

        for (dim, low, low_value, high, high_value) in candidates {
            parent.levels[dim] += 1;
            children.push(Rect::new(low, parent.levels.clone(), low_value));
            children.push(Rect::new(high, parent.levels.clone(), high_value));
        }

        Rect::new(parent.center, parent.levels, parent.value)
    }

    /// Local phase: Hooke-Jeeves pattern search from the best point.
    fn polish(&mut self, initial_step: f64, min_step: f64) -> Termination {
        let mut base = self.best.clone();
        let mut base_value = self.best_value;
        let mut step = initial_step;

        loop {
            if let Some(termination) = self.termination() {
                return termination;
            }
            if step < min_step {
                return Termination::Converged;
            }

            let (mut point, mut value) = self.explore(&base, base_value, step);
            if value >= base_value {
                step /= 2.;
                continue;
            }

            while value < base_value {
                let pattern: Vec<f64> = point
                    .iter()
                    .zip(&base)
                    .map(|(p, b)| (2. * p - b).clamp(0., 1.))
                    .collect();
                base = point;
                base_value = value;

                if self.termination().is_some() {
                    break;
                }

                let pattern_value = self.evaluate(&pattern);
                (point, value) = self.explore(&pattern, pattern_value, step);
            }
        }
    }

    /// Try a step in both directions along every axis, keeping each improvement.
    fn explore(&mut self, start: &[f64], start_value: f64, step: f64) -> (Vec<f64>, f64) {
        let mut point = start.to_vec();
        let mut value = start_value;

        for dim in 0..point.len() {
            let original = point[dim];
            for candidate in [original + step, original - step] {
                point[dim] = candidate.clamp(0., 1.);
                if point[dim] == original {
                    continue;
                }

                let candidate_value = self.evaluate(&point);
                if candidate_value < value {
                    value = candidate_value;
                    break;
                }
                point[dim] = original;
            }
        }

        (point, value)
    }
}

/// A hyperrectangle in unit coordinates, with sides of length `3^-level`.
struct Rect {
    center: Vec<f64>,
    levels: Vec<u32>,
    value: f64,
    /// Half the diagonal
    size: f64,
}

impl Rect {
    fn new(center: Vec<f64>, levels: Vec<u32>, value: f64) -> Self {
        // Sum in a canonical order so equally sized rectangles compare exactly equal
        let mut sorted = levels.clone();
        sorted.sort_unstable();
        let size = 0.5
            * sorted
                .iter()
                .map(|&k| 9f64.powi(-(k as i32)))
                .sum::<f64>()
                .sqrt();

        Self {
            center,
            levels,
            value,
            size,
        }
    }
}

/// Indices of the rectangles on the lower-right convex hull of (size, value),
/// starting from the best rectangle.
fn potentially_optimal(rects: &[Rect]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rects.len()).collect();
    order.sort_by(|&a, &b| {
        rects[a]
            .size
            .total_cmp(&rects[b].size)
            .then(rects[a].value.total_cmp(&rects[b].value))
    });

    // Best rectangle of each size
    let mut candidates: Vec<(f64, f64, usize)> = Vec::new();
    for index in order {
        let rect = &rects[index];
        match candidates.last() {
            Some(&(size, _, _)) if size == rect.size => {}
            _ => candidates.push((rect.size, rect.value, index)),
        }
    }

    let start = candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.1.total_cmp(&b.1).then(b.0.total_cmp(&a.0)))
        .map_or(0, |(i, _)| i);

    let mut hull: Vec<(f64, f64, usize)> = Vec::new();
    for &point in &candidates[start..] {
        while let [.., o, a] = hull[..] {
            let cross = (a.0 - o.0) * (point.1 - o.1) - (a.1 - o.1) * (point.0 - o.0);
            if cross > 0. {
                break;
            }
            hull.pop();
        }
        hull.push(point);
    }

    hull.into_iter().map(|(_, _, index)| index).collect()
}
