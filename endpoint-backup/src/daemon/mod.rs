//! Process lifecycle for the agent binary.

pub mod shutdown;
