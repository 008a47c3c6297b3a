use anyhow::Result;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use tracing::debug;

use crate::Features;
use crate::agent::Mode;
use crate::estimator::{ActionValues, Estimator};
use crate::game::Action;

// =============================================================================
// Exploration Schedule
// =============================================================================

#[derive(Debug, Clone)]
pub struct ExplorationConfig {
    /// Starting rate when training.
    pub initial_rate: f64,
    /// Starting rate when playing.
    pub eval_rate: f64,
    pub decay: f64,
    /// Lower clamp applied after every decay step. Not the same constant as
    /// `eval_rate`.
    pub floor: f64,
    /// Exploration weights in action order.
    pub weights: [f64; Action::COUNT],
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            initial_rate: 0.7,
            eval_rate: 0.05,
            decay: 0.97,
            floor: 0.1,
            weights: [0.2, 0.2, 0.2, 0.2, 0.1, 0.1],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("cannot exploit: the estimator has not been fit yet")]
    NotFit,
    #[error(transparent)]
    Estimator(#[from] anyhow::Error),
}

// =============================================================================
// Epsilon-greedy Selector
// =============================================================================

pub struct EpsilonGreedy {
    rate: f64,
    decay: f64,
    floor: f64,
    explore_dist: WeightedIndex<f64>,
    last_was_exploration: bool,
}

impl EpsilonGreedy {
    pub fn new(config: &ExplorationConfig, mode: Mode) -> Result<Self> {
        let rate = match mode {
            Mode::Train => config.initial_rate,
            Mode::Play => config.eval_rate,
        };
        Ok(Self {
            rate,
            decay: config.decay,
            floor: config.floor,
            explore_dist: WeightedIndex::new(config.weights)?,
            last_was_exploration: false,
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn last_was_exploration(&self) -> bool {
        self.last_was_exploration
    }

    /// Explore while the estimator is unfit or with probability `rate`,
    /// otherwise take the greedy action. Decays the rate either way.
    pub fn select<E: Estimator, R: Rng>(
        &mut self,
        estimator: &E,
        features: &Features,
        rng: &mut R,
    ) -> Result<Action, PolicyError> {
        let explore = !estimator.is_fit() || rng.random::<f64>() < self.rate;
        let action = if explore {
            debug!("Exploring random action");
            Action::from_index(self.explore_dist.sample(rng))
        } else {
            debug!("Exploiting (predict actions)");
            greedy_action(estimator, features)?
        };
        self.last_was_exploration = explore;
        self.rate = (self.rate * self.decay).max(self.floor);
        Ok(action)
    }
}

pub fn greedy_action<E: Estimator>(estimator: &E, features: &Features) -> Result<Action, PolicyError> {
    if !estimator.is_fit() {
        return Err(PolicyError::NotFit);
    }
    let values = estimator.predict(features)?;
    Ok(argmax(&values))
}

/// Highest score; the earliest action wins ties.
pub fn argmax(values: &ActionValues) -> Action {
    let mut best = 0;
    for i in 1..values.len() {
        if values[i] > values[best] {
            best = i;
        }
    }
    Action::from_index(best)
}
