//! `tbphase` - Hierarchical phase execution engine
//!
//! This library drives a tree of testbench components through an ordered
//! graph of named phases. Each phase walks the tree top-down, bottom-up or
//! as one concurrent task per component, and moves through a fixed
//! lifecycle of states.

pub mod cli;
pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod objection;
pub mod observability;
pub mod phase;
pub mod ready_to_end;
pub mod supervisor;
pub mod topology;
pub mod traversal;

mod sync;
