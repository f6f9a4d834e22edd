pub mod command;
pub mod config;
pub mod feeder;
pub mod heartbeat;
pub mod topics;

pub use command::{run_duration_ms, Command, CommandError};
pub use config::{BrokerConfig, FeederConfig};
pub use feeder::{FeederEngine, FeederState, PinCommand};
pub use heartbeat::HeartbeatSchedule;
pub use topics::*;
