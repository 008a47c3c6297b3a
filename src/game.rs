use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Tile Codes
// =============================================================================

pub mod tile {
    pub const WALL: i8 = -1;
    pub const FREE: i8 = 0;
    pub const CRATE: i8 = 1;
}

// =============================================================================
// Event Identifiers
// =============================================================================

pub mod events {
    pub const MOVED_LEFT: &str = "MOVED_LEFT";
    pub const MOVED_RIGHT: &str = "MOVED_RIGHT";
    pub const MOVED_UP: &str = "MOVED_UP";
    pub const MOVED_DOWN: &str = "MOVED_DOWN";
    pub const WAITED: &str = "WAITED";
    pub const INVALID_ACTION: &str = "INVALID_ACTION";

    pub const BOMB_DROPPED: &str = "BOMB_DROPPED";
    pub const BOMB_EXPLODED: &str = "BOMB_EXPLODED";

    pub const CRATE_DESTROYED: &str = "CRATE_DESTROYED";
    pub const COIN_FOUND: &str = "COIN_FOUND";
    pub const COIN_COLLECTED: &str = "COIN_COLLECTED";

    pub const KILLED_OPPONENT: &str = "KILLED_OPPONENT";
    pub const KILLED_SELF: &str = "KILLED_SELF";
    pub const GOT_KILLED: &str = "GOT_KILLED";
    pub const OPPONENT_ELIMINATED: &str = "OPPONENT_ELIMINATED";
    pub const SURVIVED_ROUND: &str = "SURVIVED_ROUND";

    // Derived in-process from the position history
    pub const DISTANCE_2: &str = "DISTANCE_2";
    pub const DISTANCE_1: &str = "DISTANCE_1";
    pub const DISTANCE_0: &str = "DISTANCE_0";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    MovedLeft,
    MovedRight,
    MovedUp,
    MovedDown,
    Waited,
    InvalidAction,
    BombDropped,
    BombExploded,
    CrateDestroyed,
    CoinFound,
    CoinCollected,
    KilledOpponent,
    KilledSelf,
    GotKilled,
    OpponentEliminated,
    SurvivedRound,
    Distance2,
    Distance1,
    Distance0,
}

impl Event {
    pub const ALL: [Event; 19] = [
        Event::MovedLeft,
        Event::MovedRight,
        Event::MovedUp,
        Event::MovedDown,
        Event::Waited,
        Event::InvalidAction,
        Event::BombDropped,
        Event::BombExploded,
        Event::CrateDestroyed,
        Event::CoinFound,
        Event::CoinCollected,
        Event::KilledOpponent,
        Event::KilledSelf,
        Event::GotKilled,
        Event::OpponentEliminated,
        Event::SurvivedRound,
        Event::Distance2,
        Event::Distance1,
        Event::Distance0,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Event::MovedLeft => events::MOVED_LEFT,
            Event::MovedRight => events::MOVED_RIGHT,
            Event::MovedUp => events::MOVED_UP,
            Event::MovedDown => events::MOVED_DOWN,
            Event::Waited => events::WAITED,
            Event::InvalidAction => events::INVALID_ACTION,
            Event::BombDropped => events::BOMB_DROPPED,
            Event::BombExploded => events::BOMB_EXPLODED,
            Event::CrateDestroyed => events::CRATE_DESTROYED,
            Event::CoinFound => events::COIN_FOUND,
            Event::CoinCollected => events::COIN_COLLECTED,
            Event::KilledOpponent => events::KILLED_OPPONENT,
            Event::KilledSelf => events::KILLED_SELF,
            Event::GotKilled => events::GOT_KILLED,
            Event::OpponentEliminated => events::OPPONENT_ELIMINATED,
            Event::SurvivedRound => events::SURVIVED_ROUND,
            Event::Distance2 => events::DISTANCE_2,
            Event::Distance1 => events::DISTANCE_1,
            Event::Distance0 => events::DISTANCE_0,
        }
    }
}

impl FromStr for Event {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Event::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown event {s:?}"))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Action Space
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Action {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
    Wait = 4,
    Bomb = 5,
}

impl Action {
    pub const COUNT: usize = 6;
    pub const ALL: [Action; Action::COUNT] = [
        Action::Up,
        Action::Right,
        Action::Down,
        Action::Left,
        Action::Wait,
        Action::Bomb,
    ];

    pub fn from_index(i: usize) -> Self {
        assert!(i < Self::COUNT, "action index {i} out of range");
        Self::ALL[i]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Up => "UP",
            Action::Right => "RIGHT",
            Action::Down => "DOWN",
            Action::Left => "LEFT",
            Action::Wait => "WAIT",
            Action::Bomb => "BOMB",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Board
// =============================================================================

/// Board coordinate. Serialized as `[x, y]` like the harness does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn euclidean(self, other: Position) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Position> for (i32, i32) {
    fn from(p: Position) -> Self {
        (p.x, p.y)
    }
}

/// Column-major grid addressed as `cells[x][y]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid<T> {
    cells: Vec<Vec<T>>,
}

impl<T: Copy> Grid<T> {
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            cells: vec![vec![value; height]; width],
        }
    }

    pub fn width(&self) -> usize {
        self.cells.len()
    }

    pub fn height(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn get(&self, pos: Position) -> Option<T> {
        if pos.x < 0 || pos.y < 0 {
            return None;
        }
        self.cells
            .get(pos.x as usize)
            .and_then(|col| col.get(pos.y as usize))
            .copied()
    }

    pub fn set(&mut self, pos: Position, value: T) {
        if pos.x < 0 || pos.y < 0 {
            return;
        }
        if let Some(cell) = self
            .cells
            .get_mut(pos.x as usize)
            .and_then(|col| col.get_mut(pos.y as usize))
        {
            *cell = value;
        }
    }

    /// Cells in scan order: x-major, then y.
    pub fn iter(&self) -> impl Iterator<Item = (Position, T)> + '_ {
        self.cells.iter().enumerate().flat_map(|(x, col)| {
            col.iter()
                .enumerate()
                .map(move |(y, &v)| (Position::new(x as i32, y as i32), v))
        })
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// The acting agent: `[name, score, bombs_left, [x, y]]` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "(String, i32, bool, Position)",
    into = "(String, i32, bool, Position)"
)]
pub struct AgentInfo {
    pub name: String,
    pub score: i32,
    pub can_bomb: bool,
    pub position: Position,
}

impl From<(String, i32, bool, Position)> for AgentInfo {
    fn from((name, score, can_bomb, position): (String, i32, bool, Position)) -> Self {
        Self {
            name,
            score,
            can_bomb,
            position,
        }
    }
}

impl From<AgentInfo> for (String, i32, bool, Position) {
    fn from(a: AgentInfo) -> Self {
        (a.name, a.score, a.can_bomb, a.position)
    }
}

/// An active bomb: `[[x, y], timer]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Position, u32)", into = "(Position, u32)")]
pub struct Bomb {
    pub position: Position,
    pub timer: u32,
}

impl From<(Position, u32)> for Bomb {
    fn from((position, timer): (Position, u32)) -> Self {
        Self { position, timer }
    }
}

impl From<Bomb> for (Position, u32) {
    fn from(b: Bomb) -> Self {
        (b.position, b.timer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub step: u32,
    pub field: Grid<i8>,
    #[serde(rename = "self")]
    pub agent: AgentInfo,
    #[serde(default)]
    pub others: Vec<AgentInfo>,
    #[serde(default)]
    pub bombs: Vec<Bomb>,
    #[serde(default)]
    pub coins: Vec<Position>,
    pub explosion_map: Grid<u8>,
}

impl GameSnapshot {
    /// Test fixture: round 1, step 1, no coins, bombs or explosions. Real
    /// snapshots come from the harness and are deserialized.
    pub fn new(field: Grid<i8>, agent: AgentInfo) -> Self {
        let explosion_map = Grid::filled(field.width(), field.height(), 0);
        Self {
            round: 1,
            step: 1,
            field,
            agent,
            others: Vec::new(),
            bombs: Vec::new(),
            coins: Vec::new(),
            explosion_map,
        }
    }

    /// Test fixture: walls on the border, free cells inside and a lone agent
    /// named `"agent"` that can bomb.
    pub fn arena(width: usize, height: usize, position: Position) -> Self {
        let mut field = Grid::filled(width, height, tile::FREE);
        for x in 0..width as i32 {
            field.set(Position::new(x, 0), tile::WALL);
            field.set(Position::new(x, height as i32 - 1), tile::WALL);
        }
        for y in 0..height as i32 {
            field.set(Position::new(0, y), tile::WALL);
            field.set(Position::new(width as i32 - 1, y), tile::WALL);
        }
        let agent = AgentInfo {
            name: "agent".to_string(),
            score: 0,
            can_bomb: true,
            position,
        };
        Self::new(field, agent)
    }

    pub fn position(&self) -> Position {
        self.agent.position
    }
}
