use crate::game::{Event, Position};
use crate::replay::PositionHistory;

// =============================================================================
// Reward Table
// =============================================================================

pub struct RewardConfig {
    pub moved: f32,
    pub waited: f32,
    pub invalid_action: f32,
    pub bomb_exploded: f32,
    pub bomb_dropped: f32,
    pub crate_destroyed: f32,
    pub coin_found: f32,
    pub coin_collected: f32,
    pub killed_opponent: f32,
    pub killed_self: f32,
    pub got_killed: f32,
    pub opponent_eliminated: f32,
    pub survived_round: f32,
    pub distance_2: f32,
    pub distance_1: f32,
    pub distance_0: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            moved: -1.0,
            waited: -10.0,
            invalid_action: -10.0,
            bomb_exploded: 0.0,
            bomb_dropped: 0.0,
            crate_destroyed: 0.0,
            coin_found: 10.0,
            coin_collected: 1000.0,
            killed_opponent: 0.0,
            killed_self: 0.0,
            got_killed: 0.0,
            opponent_eliminated: 0.0,
            survived_round: 0.0,
            distance_2: -10.0,
            distance_1: -20.0,
            distance_0: -30.0,
        }
    }
}

impl RewardConfig {
    pub fn reward(&self, event: Event) -> f32 {
        match event {
            Event::MovedLeft | Event::MovedRight | Event::MovedUp | Event::MovedDown => self.moved,
            Event::Waited => self.waited,
            Event::InvalidAction => self.invalid_action,
            Event::BombExploded => self.bomb_exploded,
            Event::BombDropped => self.bomb_dropped,
            Event::CrateDestroyed => self.crate_destroyed,
            Event::CoinFound => self.coin_found,
            Event::CoinCollected => self.coin_collected,
            Event::KilledOpponent => self.killed_opponent,
            Event::KilledSelf => self.killed_self,
            Event::GotKilled => self.got_killed,
            Event::OpponentEliminated => self.opponent_eliminated,
            Event::SurvivedRound => self.survived_round,
            Event::Distance2 => self.distance_2,
            Event::Distance1 => self.distance_1,
            Event::Distance0 => self.distance_0,
        }
    }

    /// Sum of the table entries; names outside the table add nothing.
    pub fn shape<S: AsRef<str>>(&self, events: &[S]) -> f32 {
        events
            .iter()
            .filter_map(|e| e.as_ref().parse::<Event>().ok())
            .map(|e| self.reward(e))
            .sum()
    }
}

// =============================================================================
// Loitering
// =============================================================================

/// Derived events for an agent that keeps returning to where it was.
///
/// Only fires once the history is full; entries are compared oldest first, so
/// index 2 of a five-slot history is three moves back.
pub fn loiter_events(history: &PositionHistory, current: Position) -> Vec<Event> {
    let mut out = Vec::new();
    if !history.is_full() {
        return out;
    }
    let checks = [(2, 1.0, Event::Distance2), (1, 2.0, Event::Distance1), (0, 3.0, Event::Distance0)];
    for (index, radius, event) in checks {
        if history
            .get(index)
            .is_some_and(|past| current.euclidean(past) < radius)
        {
            out.push(event);
        }
    }
    out
}
