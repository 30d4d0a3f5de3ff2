// monitoring/mod.rs
pub mod count_sink;
pub mod signal_broadcast;
pub mod signal_monitor;
