//! NCH Wi-Fi controller library
//! Discovers NCH devices over Bluetooth, opens a serial session to one of
//! them and switches its Wi-Fi radio on or off.

// Module declarations
pub mod commands;
pub mod config;
pub mod console;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;
