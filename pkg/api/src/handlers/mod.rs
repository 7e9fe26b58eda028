pub mod coredumps;
pub mod definitions;
pub mod pods;
pub mod quotas;
pub mod watch;
