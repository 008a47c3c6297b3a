use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::Features;
use crate::game::{Action, Position};

// =============================================================================
// Transitions
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
pub struct Transition {
    #[serde(with = "serde_big_array::BigArray")]
    pub state: Features,
    pub action: Action,
    /// `None` marks the last step of a round.
    #[serde(with = "terminal_features")]
    pub next_state: Option<Features>,
    pub reward: f32,
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        self.next_state.is_none()
    }
}

mod terminal_features {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::Features;

    #[derive(Serialize, Deserialize)]
    struct Row(#[serde(with = "serde_big_array::BigArray")] Features);

    pub fn serialize<S: Serializer>(value: &Option<Features>, s: S) -> Result<S::Ok, S::Error> {
        value.map(Row).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Features>, D::Error> {
        Ok(Option::<Row>::deserialize(d)?.map(|r| r.0))
    }
}

// =============================================================================
// Experience Buffer
// =============================================================================

#[derive(Serialize, Deserialize)]
pub struct ExperienceBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ExperienceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, t: Transition) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(t);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// `amount` distinct transitions in random order.
    ///
    /// # Panics
    /// Panics if `amount` exceeds the number of stored transitions.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, amount: usize) -> Vec<&Transition> {
        assert!(
            amount <= self.buffer.len(),
            "cannot sample {amount} transitions from a buffer of {}",
            self.buffer.len()
        );
        rand::seq::index::sample(rng, self.buffer.len(), amount)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create replay checkpoint {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)?;
        writer
            .flush()
            .with_context(|| format!("Failed to write replay checkpoint {}", path.display()))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open replay checkpoint {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let replay = bincode::deserialize_from(reader)?;
        Ok(replay)
    }
}

// =============================================================================
// Position History
// =============================================================================

/// Most recent agent positions, oldest first.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    positions: VecDeque<Position>,
    capacity: usize,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            positions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, p: Position) {
        if self.positions.len() >= self.capacity {
            self.positions.pop_front();
        }
        self.positions.push_back(p);
    }

    pub fn is_full(&self) -> bool {
        self.positions.len() >= self.capacity
    }

    /// Index 0 is the oldest entry.
    pub fn get(&self, index: usize) -> Option<Position> {
        self.positions.get(index).copied()
    }
}
