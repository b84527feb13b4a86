//! Network awareness.
//!
//! - [`monitor`]: classifies link state into a [`monitor::ConnectionQuality`]
//! - [`policy`]: maps connection quality to the [`policy::AdaptiveSettings`] every
//!   other component consults before acting

pub mod monitor;
pub mod policy;
