//! Snapshot → feature vector.
//!
//! Layout of the 21 raw values before scaling and expansion:
//!
//! | range  | content                                             |
//! |--------|-----------------------------------------------------|
//! | 0..4   | neighbor codes up/right/down/left (1 wall, 2 crate) |
//! | 4..8   | nearest coin offsets up/right/down/left             |
//! | 8..12  | nearest bomb offsets                                |
//! | 12..16 | nearest explosion offsets                           |
//! | 16..20 | nearest crate offsets                               |
//! | 20     | can place bomb                                      |
//!
//! Offsets hold the distance along the axis toward the target, or
//! [`NO_DIRECTION`] when the target is not in that direction.

use crate::game::{GameSnapshot, Grid, Position, tile};
use crate::{FEATURE_DIM, Features, RAW_FEATURE_DIM};

pub const NO_DIRECTION: f32 = -1.0;

pub const NEIGHBOR_OFFSET: usize = 0;
pub const COIN_OFFSET: usize = 4;
pub const BOMB_OFFSET: usize = 8;
pub const EXPLOSION_OFFSET: usize = 12;
pub const CRATE_OFFSET: usize = 16;
pub const CAN_BOMB_OFFSET: usize = 20;

/// up, right, down, left
const NEIGHBORS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

pub fn extract(snapshot: &GameSnapshot) -> Features {
    let raw = raw_features(snapshot);
    polynomial_features(&min_max_normalize(&raw))
}

pub fn raw_features(snapshot: &GameSnapshot) -> [f32; RAW_FEATURE_DIM] {
    let me = snapshot.position();
    let mut f = [0f32; RAW_FEATURE_DIM];

    f[NEIGHBOR_OFFSET..COIN_OFFSET].copy_from_slice(&neighbor_codes(&snapshot.field, me));

    let coin = nearest(me, snapshot.coins.iter().copied());
    f[COIN_OFFSET..BOMB_OFFSET].copy_from_slice(&direction_offsets(me, coin));

    let bomb = nearest(me, snapshot.bombs.iter().map(|b| b.position));
    f[BOMB_OFFSET..EXPLOSION_OFFSET].copy_from_slice(&direction_offsets(me, bomb));

    let explosion = nearest(
        me,
        snapshot
            .explosion_map
            .iter()
            .filter(|&(_, v)| v > 0)
            .map(|(p, _)| p),
    );
    f[EXPLOSION_OFFSET..CRATE_OFFSET].copy_from_slice(&direction_offsets(me, explosion));

    // The agent's own cell is marked occupied, so it never counts as a crate.
    let crate_cell = nearest(
        me,
        snapshot
            .field
            .iter()
            .filter(|&(p, v)| v == tile::CRATE && p != me)
            .map(|(p, _)| p),
    );
    f[CRATE_OFFSET..CAN_BOMB_OFFSET].copy_from_slice(&direction_offsets(me, crate_cell));

    f[CAN_BOMB_OFFSET] = if snapshot.agent.can_bomb { 1.0 } else { 0.0 };
    f
}

/// Cells off the board read as walls.
pub fn neighbor_codes(field: &Grid<i8>, at: Position) -> [f32; 4] {
    NEIGHBORS.map(|(dx, dy)| match field.get(at.offset(dx, dy)) {
        Some(tile::CRATE) => 2.0,
        Some(tile::WALL) | None => 1.0,
        Some(_) => 0.0,
    })
}

/// Closest candidate by Manhattan distance; the first one wins ties.
pub fn nearest<I>(origin: Position, candidates: I) -> Option<Position>
where
    I: IntoIterator<Item = Position>,
{
    let mut best: Option<(Position, i32)> = None;
    for p in candidates {
        let d = origin.manhattan(p);
        if best.is_none_or(|(_, min)| d < min) {
            best = Some((p, d));
        }
    }
    best.map(|(p, _)| p)
}

pub fn direction_offsets(origin: Position, target: Option<Position>) -> [f32; 4] {
    let mut dir = [NO_DIRECTION; 4];
    let Some(target) = target else {
        return dir;
    };
    let dx = target.x - origin.x;
    let dy = target.y - origin.y;
    if dx > 0 {
        dir[1] = dx as f32;
    } else if dx < 0 {
        dir[3] = -dx as f32;
    }
    if dy > 0 {
        dir[2] = dy as f32;
    } else if dy < 0 {
        dir[0] = -dy as f32;
    }
    dir
}

/// Rescale to [0, 1] over the vector itself; a constant vector maps to zeros.
pub fn min_max_normalize<const N: usize>(values: &[f32; N]) -> [f32; N] {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= 0.0 {
        return [0.0; N];
    }
    values.map(|v| ((v - min) / range).clamp(0.0, 1.0))
}

/// Degree-2 expansion: `[1, x_0..x_n, x_0*x_0, x_0*x_1, .., x_n*x_n]`.
pub fn polynomial_features(values: &[f32; RAW_FEATURE_DIM]) -> Features {
    let mut out = [0f32; FEATURE_DIM];
    out[0] = 1.0;
    out[1..=RAW_FEATURE_DIM].copy_from_slice(values);
    let mut idx = 1 + RAW_FEATURE_DIM;
    for i in 0..RAW_FEATURE_DIM {
        for j in i..RAW_FEATURE_DIM {
            out[idx] = values[i] * values[j];
            idx += 1;
        }
    }
    debug_assert_eq!(idx, FEATURE_DIM);
    out
}
