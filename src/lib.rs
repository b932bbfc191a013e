//! Single-Lane Bridge Simulation Library
//!
//! Simulates two-way traffic over a single-lane bridge: a gate decides which
//! direction may enter, and same-direction cars follow each other with a
//! minimum gap.

pub mod simulation;
