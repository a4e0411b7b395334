// SPDX-License-Identifier: GPL-3.0-only
pub mod coordinator;
pub mod scheduler;
pub mod state;

pub use coordinator::SyncCoordinator;
pub use scheduler::SyncScheduler;
pub use state::{ConnectionState, SessionSnapshot, StockUpdate, SyncEvent, SyncReport};
