//! Kiosk command/event loop tying capture, engine and service together.

pub mod controller;

pub use controller::{KioskCommand, KioskController, KioskEvent};
