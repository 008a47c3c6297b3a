//! Newline-delimited JSON bridge to the game harness.
//!
//! Each input line is one callback; each callback produces one output line.
//!
//! ```text
//! {"callback":"act","state":{...}}
//! {"callback":"game_events_occurred","old_state":{...},"action":"UP","new_state":{...},"events":["MOVED_UP"]}
//! {"callback":"end_of_round","last_state":{...},"last_action":"WAIT","events":["SURVIVED_ROUND"]}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use tracing::debug;

use crate::agent::{Agent, RoundReport};
use crate::estimator::Estimator;
use crate::game::{Action, GameSnapshot};

#[derive(Debug, Deserialize)]
#[serde(tag = "callback", rename_all = "snake_case")]
pub enum Request {
    Act {
        state: GameSnapshot,
    },
    GameEventsOccurred {
        #[serde(default)]
        old_state: Option<GameSnapshot>,
        #[serde(default)]
        action: Option<Action>,
        new_state: GameSnapshot,
        #[serde(default)]
        events: Vec<String>,
    },
    EndOfRound {
        last_state: GameSnapshot,
        #[serde(default)]
        last_action: Option<Action>,
        #[serde(default)]
        events: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Action {
        action: Action,
        explored: bool,
    },
    Reward {
        reward: f32,
    },
    RoundEnd {
        #[serde(flatten)]
        report: RoundReport,
    },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ServeStats {
    pub steps: u64,
    pub rounds: u64,
}

pub fn handle<E: Estimator>(agent: &mut Agent<E>, request: Request) -> Result<Response> {
    match request {
        Request::Act { state } => {
            let action = agent.act(&state)?;
            Ok(Response::Action {
                action,
                explored: agent.last_was_exploration(),
            })
        }
        Request::GameEventsOccurred {
            old_state,
            action,
            new_state,
            events,
        } => {
            let reward =
                agent.game_events_occurred(old_state.as_ref(), action, &new_state, &events)?;
            Ok(Response::Reward { reward })
        }
        Request::EndOfRound {
            last_state,
            last_action,
            events,
        } => {
            let report = agent.end_of_round(&last_state, last_action, &events)?;
            Ok(Response::RoundEnd { report })
        }
    }
}

/// Runs callbacks until `input` is exhausted. The first failing line aborts.
pub fn serve<E, R, W>(agent: &mut Agent<E>, input: R, mut output: W) -> Result<ServeStats>
where
    E: Estimator,
    R: BufRead,
    W: Write,
{
    let mut stats = ServeStats::default();
    for (idx, line) in input.lines().enumerate() {
        let lineno = idx + 1;
        let line = line.with_context(|| format!("Failed to read request line {lineno}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = serde_json::from_str(&line)
            .with_context(|| format!("Malformed request on line {lineno}"))?;
        let response = handle(agent, request)
            .with_context(|| format!("Callback on line {lineno} failed"))?;
        match &response {
            Response::Action { .. } => stats.steps += 1,
            Response::RoundEnd { .. } => stats.rounds += 1,
            Response::Reward { .. } => {}
        }
        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
    debug!(steps = stats.steps, rounds = stats.rounds, "input exhausted");
    Ok(stats)
}
