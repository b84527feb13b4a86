//! User behaviour history used as a prefetch signal.
//!
//! - [`profile`]: the bounded per-user profile and its update rules
//! - [`storage`]: durable client storage the profile persists into
//! - [`tracker`]: best-effort record/load entry points

pub mod profile;
pub mod storage;
pub mod tracker;
