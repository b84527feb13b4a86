//! Smart sync: periodic and event-triggered invalidation of registered key sets.

pub mod controller;

pub use controller::{
    HostEvent, SkipReason, SmartSyncController, SyncHandle, SyncOutcome, SyncState, SyncTrigger,
};
