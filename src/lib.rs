pub const RAW_FEATURE_DIM: usize = 21;
/// Bias + linear terms + all pairwise products (with squares) of the raw features.
pub const FEATURE_DIM: usize = 1 + RAW_FEATURE_DIM + RAW_FEATURE_DIM * (RAW_FEATURE_DIM + 1) / 2;
pub type Features = [f32; FEATURE_DIM];

pub mod agent;
pub mod estimator;
pub mod features;
pub mod game;
pub mod learner;
pub mod logging;
pub mod policy;
pub mod protocol;
pub mod replay;
pub mod reward;
pub mod stats;

pub use agent::{Agent, AgentConfig, Mode, RoundReport};
pub use estimator::{ActionValues, Estimator, QRegressor, RegressorConfig};
pub use features::extract;
pub use game::{Action, AgentInfo, Bomb, Event, GameSnapshot, Grid, Position, events};
pub use learner::{Learner, LearnerConfig, RewardLog};
pub use policy::{EpsilonGreedy, ExplorationConfig, PolicyError};
pub use protocol::{Request, Response, serve};
pub use replay::{ExperienceBuffer, PositionHistory, Transition};
pub use reward::{RewardConfig, loiter_events};
pub use stats::RewardStats;
