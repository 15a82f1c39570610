//! exd-testkit
//!
//! Shared scaffolding for the end-to-end scenario tests under `tests/`:
//! a scriptable gateway whose rejections and fill reports the test
//! controls, and a rig that wires a full order manager (in-memory journal
//! and store, real position keeper) around it.

pub mod rig;
pub mod scripted_gateway;

pub use rig::{order, signal, TestRig};
pub use scripted_gateway::ScriptedGateway;
