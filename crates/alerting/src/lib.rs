//! Alerting System
//!
//! Separates "is something wrong" (the per-cycle verdict, which can be
//! noisy) from "should we alert" (this state machine, the sole debounce
//! authority). Notifications fire only when the status changes.

mod machine;
mod state;

pub use machine::{OutageStateMachine, StateMachineConfig, Transition};
pub use state::{MonitorStatus, NotificationEvent, OutageState};
