use anyhow::{Context, Result};
use rand::Rng;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::Features;
use crate::estimator::{ActionValues, Estimator};
use crate::game::Action;
use crate::replay::{ExperienceBuffer, Transition};

// =============================================================================
// Learner Hyperparameters
// =============================================================================

#[derive(Debug, Clone)]
pub struct LearnerConfig {
    pub gamma: f32,
    pub learning_rate: f32,
    /// Minimum buffer length before a fit. The batch itself is the whole buffer.
    pub batch_size: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            learning_rate: 0.001,
            batch_size: 20,
        }
    }
}

// =============================================================================
// Q-learning Update
// =============================================================================

pub struct Learner {
    config: LearnerConfig,
}

impl Learner {
    pub fn new(config: LearnerConfig) -> Self {
        Self { config }
    }

    /// One-step TD update of `current` toward `reward + gamma * max_next`.
    pub fn td_target(&self, current: f32, reward: f32, max_next: f32) -> f32 {
        current + self.config.learning_rate * (reward + self.config.gamma * max_next - current)
    }

    /// Regression row for one transition: the current prediction (zeros before
    /// the first fit) with the taken action's slot replaced by its target.
    pub fn target_row<E: Estimator>(&self, estimator: &E, t: &Transition) -> Result<ActionValues> {
        let fit = estimator.is_fit();
        let mut values = if fit {
            estimator.predict(&t.state)?
        } else {
            [0.0; Action::COUNT]
        };

        let slot = t.action.index();
        values[slot] = match &t.next_state {
            Some(next) if fit => {
                let max_next = estimator
                    .predict(next)?
                    .into_iter()
                    .fold(f32::NEG_INFINITY, f32::max);
                self.td_target(values[slot], t.reward, max_next)
            }
            _ => t.reward,
        };
        Ok(values)
    }

    pub fn build_batch<E: Estimator>(
        &self,
        estimator: &E,
        batch: &[&Transition],
    ) -> Result<(Vec<Features>, Vec<ActionValues>)> {
        let mut xs = Vec::with_capacity(batch.len());
        let mut ys = Vec::with_capacity(batch.len());
        for t in batch {
            ys.push(self.target_row(estimator, t)?);
            xs.push(t.state);
        }
        Ok((xs, ys))
    }

    /// Fit on a shuffled copy of the whole buffer. Returns the number of rows
    /// fit, or `None` when the buffer is still below the batch threshold.
    pub fn learn<E: Estimator, R: Rng>(
        &self,
        buffer: &ExperienceBuffer,
        estimator: &mut E,
        rng: &mut R,
    ) -> Result<Option<usize>> {
        if buffer.len() < self.config.batch_size {
            debug!(
                transitions = buffer.len(),
                threshold = self.config.batch_size,
                "not enough transitions to fit"
            );
            return Ok(None);
        }

        let batch = buffer.sample(rng, buffer.len());
        let (xs, ys) = self.build_batch(estimator, &batch)?;
        estimator.fit(&xs, &ys).context("Estimator fit failed")?;
        info!(rows = xs.len(), "fitted estimator");
        Ok(Some(xs.len()))
    }
}

// =============================================================================
// Reward Log
// =============================================================================

/// Append-only log of per-step rewards, one value per line.
pub struct RewardLog {
    path: PathBuf,
}

impl RewardLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, rewards: &[f32]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open reward log {}", self.path.display()))?;
        let mut writer = std::io::BufWriter::new(file);
        for r in rewards {
            writeln!(writer, "{r}")?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write reward log {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FEATURE_DIM;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    /// Scores each state by its first feature, one slot per action.
    struct Linear {
        fit: bool,
        fits: Vec<usize>,
    }

    impl Estimator for Linear {
        fn is_fit(&self) -> bool {
            self.fit
        }
        fn predict(&self, f: &Features) -> Result<ActionValues> {
            Ok(std::array::from_fn(|i| f[0] * (i as f32 + 1.0)))
        }
        fn fit(&mut self, xs: &[Features], ys: &[ActionValues]) -> Result<()> {
            assert_eq!(xs.len(), ys.len());
            self.fits.push(xs.len());
            self.fit = true;
            Ok(())
        }
        fn save(&self, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn transition(state: f32, action: Action, next: Option<f32>, reward: f32) -> Transition {
        Transition {
            state: [state; FEATURE_DIM],
            action,
            next_state: next.map(|v| [v; FEATURE_DIM]),
            reward,
        }
    }

    #[test]
    fn terminal_target_is_raw_reward() {
        let learner = Learner::new(LearnerConfig::default());
        let est = Linear { fit: true, fits: vec![] };
        let t = transition(2.0, Action::Left, None, 1000.0);
        let row = learner.target_row(&est, &t).unwrap();
        assert_eq!(row[Action::Left.index()], 1000.0);
        // untouched slots keep the prediction
        assert_eq!(row[Action::Up.index()], 2.0);
        assert_eq!(row[Action::Bomb.index()], 12.0);

        let odd = Learner::new(LearnerConfig {
            gamma: 0.1,
            learning_rate: 0.9,
            batch_size: 1,
        });
        assert_eq!(odd.target_row(&est, &t).unwrap()[Action::Left.index()], 1000.0);
    }

    #[test]
    fn bootstrapped_target_follows_td_rule() {
        let learner = Learner::new(LearnerConfig::default());
        let est = Linear { fit: true, fits: vec![] };
        let t = transition(1.0, Action::Down, Some(2.0), -1.0);
        let row = learner.target_row(&est, &t).unwrap();

        let q = 3.0; // 1.0 * (2 + 1)
        let max_next = 12.0; // 2.0 * 6
        let expected = q + 0.001 * (-1.0 + 0.95 * max_next - q);
        assert!((row[Action::Down.index()] - expected).abs() < 1e-6);
    }

    #[test]
    fn unfit_estimator_regresses_toward_rewards() {
        let learner = Learner::new(LearnerConfig::default());
        let est = Linear { fit: false, fits: vec![] };
        let t = transition(1.0, Action::Wait, Some(2.0), -10.0);
        let row = learner.target_row(&est, &t).unwrap();
        assert_eq!(row, [0.0, 0.0, 0.0, 0.0, -10.0, 0.0]);
    }

    #[test]
    fn below_threshold_skips_fit() {
        let learner = Learner::new(LearnerConfig::default());
        let mut est = Linear { fit: false, fits: vec![] };
        let mut buffer = ExperienceBuffer::new(1000);
        for i in 0..19 {
            buffer.push(transition(i as f32, Action::Up, Some(0.0), -1.0));
        }
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(learner.learn(&buffer, &mut est, &mut rng).unwrap(), None);
        assert!(est.fits.is_empty());

        buffer.push(transition(19.0, Action::Up, None, 5.0));
        assert_eq!(learner.learn(&buffer, &mut est, &mut rng).unwrap(), Some(20));
        assert_eq!(est.fits, vec![20]);
    }

    #[test]
    fn reward_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = RewardLog::new(dir.path().join("statistics"));
        log.append(&[-1.0, 1000.0]).unwrap();
        log.append(&[-10.5]).unwrap();
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text, "-1\n1000\n-10.5\n");
    }

    #[test]
    fn reward_log_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log = RewardLog::new(dir.path().join("nope").join("statistics"));
        assert!(log.append(&[1.0]).is_err());
    }
}
