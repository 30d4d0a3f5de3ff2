// control_system/mod.rs
pub mod admin_cli;
pub mod allocation_policies;
pub mod cycle_driver;
pub mod intersection_state;
pub mod mode_controller;
pub mod traffic_light_controller;
