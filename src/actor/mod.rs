//! Actor-based runtime for the routing workflow
//!
//! The Guardian supervises a DeadlineMonitor that sweeps for overdue work on
//! a fixed interval. Workflow operations themselves run directly on the
//! services; actors only own the scheduled side of the system.

pub mod guardian;
pub mod message;
pub mod monitor;

pub use guardian::*;
pub use message::*;
pub use monitor::*;
