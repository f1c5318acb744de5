pub mod agent;
pub mod bounds;
pub mod buffers;
pub mod constants;
pub mod error;
pub mod flocking;
pub mod grid;
pub mod performance;
pub mod poi;
pub mod population;
pub mod scan;
pub mod simulator;
pub mod transfer;

pub use agent::{Agent, ColonyId, OwnerTag};
pub use bounds::Aabb;
pub use error::{BufferError, GridError, SimulationError, TransferError};
pub use flocking::FlockingParams;
pub use poi::{Poi, PoiField};
pub use simulator::{Simulator, SimulatorKind, SimulatorSettings, StepReport};
pub use transfer::{join_combat, leave_combat, lock_pair, split_to_new_simulator, transfer, AgentBatch, LeaveOutcome};
