use anyhow::Result;
use std::cell::RefCell;
use std::path::Path;

use bomber_qlearn::game::{Action, GameSnapshot, Position};
use bomber_qlearn::{ActionValues, Agent, AgentConfig, Estimator, Features, Mode};

/// Records every fit and save; predicts a constant once fit.
#[derive(Default)]
struct Recorder {
    fit: bool,
    fits: Vec<Vec<ActionValues>>,
    saves: RefCell<usize>,
    failing_save: bool,
}

impl Estimator for Recorder {
    fn is_fit(&self) -> bool {
        self.fit
    }

    fn predict(&self, _features: &Features) -> Result<ActionValues> {
        Ok([1.0; Action::COUNT])
    }

    fn fit(&mut self, features: &[Features], targets: &[ActionValues]) -> Result<()> {
        assert_eq!(features.len(), targets.len());
        self.fits.push(targets.to_vec());
        self.fit = true;
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        *self.saves.borrow_mut() += 1;
        if self.failing_save {
            anyhow::bail!("disk full");
        }
        std::fs::write(path, b"recorder")?;
        Ok(())
    }
}

fn config(dir: &Path) -> AgentConfig {
    AgentConfig {
        model_path: dir.join("model.bin"),
        stats_path: dir.join("statistics"),
        seed: Some(42),
        ..Default::default()
    }
}

fn at(x: i32) -> GameSnapshot {
    let mut snap = GameSnapshot::arena(30, 5, Position::new(x, 2));
    snap.coins = vec![Position::new(28, 2)];
    snap
}

fn events(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Walks right for `steps` moves, then ends the round.
fn play_round(agent: &mut Agent<Recorder>, steps: i32) -> bomber_qlearn::RoundReport {
    for x in 1..=steps {
        let old = at(x);
        let action = agent.act(&old).unwrap();
        let new = at(x + 1);
        agent
            .game_events_occurred(Some(&old), Some(action), &new, &events(&["MOVED_RIGHT"]))
            .unwrap();
    }
    agent
        .end_of_round(&at(steps + 1), Some(Action::Wait), &events(&["COIN_COLLECTED"]))
        .unwrap()
}

#[test]
fn nineteen_transitions_do_not_fit_twenty_do() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = Agent::with_estimator(config(dir.path()), Mode::Train, Recorder::default())
        .unwrap();

    let first = play_round(&mut agent, 18);
    assert_eq!(first.transitions, 19);
    assert_eq!(first.fitted_rows, None);
    assert!(agent.estimator().fits.is_empty());

    let second = play_round(&mut agent, 0);
    assert_eq!(second.transitions, 20);
    assert_eq!(second.fitted_rows, Some(20));
    assert_eq!(agent.estimator().fits.len(), 1);
    assert_eq!(agent.estimator().fits[0].len(), 20);
}

#[test]
fn first_fit_targets_are_raw_rewards() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = Agent::with_estimator(config(dir.path()), Mode::Train, Recorder::default())
        .unwrap();
    play_round(&mut agent, 24);

    let targets = &agent.estimator().fits[0];
    assert_eq!(targets.len(), 25);
    for row in targets {
        // one slot carries the reward, the others stay zero
        let nonzero: Vec<f32> = row.iter().copied().filter(|&v| v != 0.0).collect();
        assert_eq!(nonzero.len(), 1, "row {row:?}");
        assert!(nonzero[0] == -1.0 || nonzero[0] == 1000.0, "row {row:?}");
    }
}

#[test]
fn every_round_logs_rewards_and_saves_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = Agent::with_estimator(config(dir.path()), Mode::Train, Recorder::default())
        .unwrap();

    let report = play_round(&mut agent, 3);
    assert_eq!(report.reward, 1000.0);
    assert_eq!(report.logged_rewards, 4);
    assert!(agent.pending_rewards().is_empty());
    assert_eq!(*agent.estimator().saves.borrow(), 1);
    assert!(dir.path().join("model.bin").exists());

    play_round(&mut agent, 2);
    assert_eq!(*agent.estimator().saves.borrow(), 2);

    let log = std::fs::read_to_string(dir.path().join("statistics")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines, vec!["-1", "-1", "-1", "1000", "-1", "-1", "1000"]);
}

#[test]
fn unwritable_reward_log_aborts_the_round() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.stats_path = dir.path().join("missing").join("statistics");
    let mut agent = Agent::with_estimator(cfg, Mode::Train, Recorder::default()).unwrap();

    let old = at(1);
    let result = agent.end_of_round(&old, Some(Action::Up), &events(&["GOT_KILLED"]));
    assert!(result.is_err());
    assert_eq!(*agent.estimator().saves.borrow(), 0);
}

#[test]
fn failed_model_save_aborts_the_round() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder {
        failing_save: true,
        ..Default::default()
    };
    let mut agent = Agent::with_estimator(config(dir.path()), Mode::Train, recorder).unwrap();

    let result = agent.end_of_round(&at(1), Some(Action::Up), &events(&["GOT_KILLED"]));
    assert!(result.is_err());
    assert_eq!(*agent.estimator().saves.borrow(), 1);
    assert!(!dir.path().join("model.bin").exists());
}

#[cfg(target_os = "linux")]
#[test]
fn failed_replay_checkpoint_aborts_the_round() {
    let dir = tempfile::tempdir().unwrap();
    let replay = dir.path().join("replay.bin");
    std::os::unix::fs::symlink("/dev/full", &replay).unwrap();

    let mut cfg = config(dir.path());
    cfg.replay_path = Some(replay);
    let mut agent = Agent::with_estimator(cfg, Mode::Train, Recorder::default()).unwrap();

    let result = agent.end_of_round(&at(1), Some(Action::Up), &events(&["GOT_KILLED"]));
    assert!(result.is_err());
}

#[cfg(target_os = "linux")]
#[test]
fn full_disk_model_metadata_aborts_the_round() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("weights.safetensors");
    std::os::unix::fs::symlink("/dev/full", model.with_extension("json")).unwrap();

    let mut cfg = config(dir.path());
    cfg.model_path = model;
    let mut agent = Agent::setup(cfg, Mode::Train).unwrap();

    let result = agent.end_of_round(&at(1), Some(Action::Up), &events(&["GOT_KILLED"]));
    assert!(result.is_err());
}

#[test]
fn replay_checkpoint_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let replay = dir.path().join("replay.bin");

    let mut cfg = config(dir.path());
    cfg.replay_path = Some(replay.clone());
    let mut agent = Agent::with_estimator(cfg, Mode::Train, Recorder::default()).unwrap();
    play_round(&mut agent, 5);
    assert!(replay.exists());

    let mut cfg = config(dir.path());
    cfg.model_path = dir.path().join("fresh.safetensors");
    cfg.replay_path = Some(replay);
    cfg.resume = true;
    let resumed = Agent::setup(cfg, Mode::Train).unwrap();
    assert_eq!(resumed.transitions(), 6);
    assert!(!resumed.estimator().is_fit());
}
