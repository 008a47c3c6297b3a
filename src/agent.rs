use anyhow::{Result, bail};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::estimator::{Estimator, QRegressor, RegressorConfig};
use crate::features::extract;
use crate::game::{Action, GameSnapshot};
use crate::learner::{Learner, LearnerConfig, RewardLog};
use crate::policy::{EpsilonGreedy, ExplorationConfig, PolicyError};
use crate::replay::{ExperienceBuffer, PositionHistory, Transition};
use crate::reward::{RewardConfig, loiter_events};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Play,
}

// =============================================================================
// Agent Configuration
// =============================================================================

pub struct AgentConfig {
    pub model_path: PathBuf,
    pub stats_path: PathBuf,
    /// Experience buffer checkpoint, written every round when set.
    pub replay_path: Option<PathBuf>,
    /// Continue training from the persisted model and replay checkpoint.
    pub resume: bool,
    pub history_size: usize,
    pub position_history: usize,
    pub seed: Option<u64>,
    pub exploration: ExplorationConfig,
    pub learner: LearnerConfig,
    pub reward: RewardConfig,
    pub regressor: RegressorConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("weights.safetensors"),
            stats_path: PathBuf::from("statistics"),
            replay_path: None,
            resume: false,
            history_size: 1000,
            position_history: 5,
            seed: None,
            exploration: ExplorationConfig::default(),
            learner: LearnerConfig::default(),
            reward: RewardConfig::default(),
            regressor: RegressorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub reward: f32,
    pub transitions: usize,
    /// Rows used for the fit, `None` when the buffer was below the threshold.
    pub fitted_rows: Option<usize>,
    pub logged_rewards: usize,
}

struct Training {
    transitions: ExperienceBuffer,
    positions: PositionHistory,
    rewards: Vec<f32>,
    learner: Learner,
    reward_log: RewardLog,
}

// =============================================================================
// Agent Session
// =============================================================================

/// All per-agent state for one session; callbacks take it by `&mut`.
pub struct Agent<E: Estimator> {
    mode: Mode,
    estimator: E,
    policy: EpsilonGreedy,
    training: Option<Training>,
    reward_table: RewardConfig,
    model_path: PathBuf,
    replay_path: Option<PathBuf>,
    rng: SmallRng,
}

impl Agent<QRegressor> {
    /// Training starts from a fresh model unless `resume` is set; playing loads
    /// the persisted model when one exists.
    pub fn setup(config: AgentConfig, mode: Mode) -> Result<Self> {
        let load_model = match mode {
            Mode::Play => true,
            Mode::Train => config.resume,
        };

        let estimator = if load_model && config.model_path.exists() {
            info!("Using existing model {}", config.model_path.display());
            QRegressor::load(&config.model_path, config.regressor.clone())?
        } else {
            if mode == Mode::Play {
                warn!(
                    "No model at {}, playing with random actions",
                    config.model_path.display()
                );
            }
            QRegressor::new(config.regressor.clone())?
        };

        let resume = config.resume;
        let mut agent = Self::with_estimator(config, mode, estimator)?;
        if resume {
            agent.resume_replay()?;
        }
        Ok(agent)
    }
}

impl<E: Estimator> Agent<E> {
    pub fn with_estimator(config: AgentConfig, mode: Mode, estimator: E) -> Result<Self> {
        let policy = EpsilonGreedy::new(&config.exploration, mode)?;
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let training = (mode == Mode::Train).then(|| Training {
            transitions: ExperienceBuffer::new(config.history_size),
            positions: PositionHistory::new(config.position_history),
            rewards: Vec::new(),
            learner: Learner::new(config.learner.clone()),
            reward_log: RewardLog::new(config.stats_path.clone()),
        });
        Ok(Self {
            mode,
            estimator,
            policy,
            training,
            reward_table: config.reward,
            model_path: config.model_path,
            replay_path: config.replay_path,
            rng,
        })
    }

    fn resume_replay(&mut self) -> Result<()> {
        let Some(training) = self.training.as_mut() else {
            return Ok(());
        };
        let Some(path) = self.replay_path.as_ref().filter(|p| p.exists()) else {
            return Ok(());
        };
        training.transitions = ExperienceBuffer::load(path)?;
        info!(
            "Resumed {} transitions from {}",
            training.transitions.len(),
            path.display()
        );
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn exploration_rate(&self) -> f64 {
        self.policy.rate()
    }

    pub fn last_was_exploration(&self) -> bool {
        self.policy.last_was_exploration()
    }

    pub fn transitions(&self) -> usize {
        self.training.as_ref().map_or(0, |t| t.transitions.len())
    }

    pub fn pending_rewards(&self) -> &[f32] {
        self.training
            .as_ref()
            .map(|t| t.rewards.as_slice())
            .unwrap_or_default()
    }

    pub fn act(&mut self, snapshot: &GameSnapshot) -> Result<Action, PolicyError> {
        let features = extract(snapshot);
        let action = self
            .policy
            .select(&self.estimator, &features, &mut self.rng)?;
        debug!("Took action {action}");
        Ok(action)
    }

    /// Rewards the step from `old` to `new` and stores the transition when the
    /// agent acted from a known state.
    pub fn game_events_occurred(
        &mut self,
        old: Option<&GameSnapshot>,
        action: Option<Action>,
        new: &GameSnapshot,
        events: &[String],
    ) -> Result<f32> {
        debug!(
            "Encountered game event(s) {} in step {}",
            quoted(events),
            new.step
        );

        let training = training_state(&mut self.training)?;

        let current = new.position();
        let mut events = events.to_vec();
        events.extend(
            loiter_events(&training.positions, current)
                .into_iter()
                .map(|e| e.to_string()),
        );
        training.positions.push(current);

        let reward = self.reward_table.shape(&events);
        info!("Awarded {reward} for events {}", events.join(", "));
        training.rewards.push(reward);

        if let (Some(old), Some(action)) = (old, action) {
            training.transitions.push(Transition {
                state: extract(old),
                action,
                next_state: Some(extract(new)),
                reward,
            });
        }
        Ok(reward)
    }

    /// Stores the terminal transition, fits, then writes the reward log and
    /// the model. Any write failure aborts with an error.
    pub fn end_of_round(
        &mut self,
        last: &GameSnapshot,
        last_action: Option<Action>,
        events: &[String],
    ) -> Result<RoundReport> {
        debug!("Encountered event(s) {} in final step", quoted(events));

        let reward = self.reward_table.shape(events);
        info!("Awarded {reward} for events {}", events.join(", "));

        let training = training_state(&mut self.training)?;
        training.rewards.push(reward);
        if let Some(action) = last_action {
            training.transitions.push(Transition {
                state: extract(last),
                action,
                next_state: None,
                reward,
            });
        }

        let fitted_rows = training
            .learner
            .learn(&training.transitions, &mut self.estimator, &mut self.rng)?;

        training.reward_log.append(&training.rewards)?;
        let logged_rewards = training.rewards.len();
        training.rewards.clear();

        self.estimator.save(&self.model_path)?;
        if let Some(path) = self.replay_path.as_ref() {
            training.transitions.save(path)?;
        }

        let report = RoundReport {
            reward,
            transitions: training.transitions.len(),
            fitted_rows,
            logged_rewards,
        };
        info!(
            round = last.round,
            transitions = report.transitions,
            fitted = report.fitted_rows.is_some(),
            epsilon = self.policy.rate(),
            "round finished"
        );
        Ok(report)
    }
}

fn training_state(training: &mut Option<Training>) -> Result<&mut Training> {
    match training.as_mut() {
        Some(t) => Ok(t),
        None => bail!("training callback invoked while playing"),
    }
}

fn quoted(events: &[String]) -> String {
    events
        .iter()
        .map(|e| format!("{e:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Position;

    fn snapshot() -> GameSnapshot {
        GameSnapshot::arena(7, 7, Position::new(3, 3))
    }

    fn play_config(dir: &std::path::Path) -> AgentConfig {
        AgentConfig {
            model_path: dir.join("weights.safetensors"),
            stats_path: dir.join("statistics"),
            seed: Some(9),
            ..Default::default()
        }
    }

    #[test]
    fn play_without_model_explores() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = Agent::setup(play_config(dir.path()), Mode::Play).unwrap();
        assert_eq!(agent.mode(), Mode::Play);
        assert!(!agent.estimator().is_fit());
        assert_eq!(agent.exploration_rate(), 0.05);
        agent.act(&snapshot()).unwrap();
        assert!(agent.last_was_exploration());
    }

    #[test]
    fn training_callbacks_rejected_while_playing() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = Agent::setup(play_config(dir.path()), Mode::Play).unwrap();
        let snap = snapshot();
        assert!(
            agent
                .game_events_occurred(Some(&snap), Some(Action::Up), &snap, &[])
                .is_err()
        );
        assert!(agent.end_of_round(&snap, Some(Action::Up), &[]).is_err());
        assert!(!dir.path().join("statistics").exists());
    }

    #[test]
    fn loitering_is_penalized_once_history_fills() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = Agent::setup(play_config(dir.path()), Mode::Train).unwrap();
        let snap = snapshot();
        let waited = vec!["WAITED".to_string()];
        for _ in 0..5 {
            let r = agent
                .game_events_occurred(Some(&snap), Some(Action::Wait), &snap, &waited)
                .unwrap();
            assert_eq!(r, -10.0);
        }
        let r = agent
            .game_events_occurred(Some(&snap), Some(Action::Wait), &snap, &waited)
            .unwrap();
        assert_eq!(r, -10.0 - 10.0 - 20.0 - 30.0);
        assert_eq!(agent.transitions(), 6);
        assert_eq!(agent.pending_rewards().len(), 6);
    }

    #[test]
    fn first_step_without_previous_state_stores_no_transition() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = Agent::setup(play_config(dir.path()), Mode::Train).unwrap();
        let snap = snapshot();
        agent.game_events_occurred(None, None, &snap, &[]).unwrap();
        assert_eq!(agent.transitions(), 0);
        assert_eq!(agent.pending_rewards(), &[0.0]);
    }
}
