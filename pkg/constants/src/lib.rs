//! Centralized constants for the coredump detector.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod controller;
pub mod network;
pub mod paths;
pub mod state;
