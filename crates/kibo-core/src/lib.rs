//! kibo-core — the desktop companion's domain logic, no UI.
//!
//! [`kibo::Kibo`] owns the session state and runs the dispatch pipeline,
//! speech, persona changes, and the timer-driven workflows. Frontends
//! subscribe to [`events::KiboEvent`] via tokio::broadcast and to full
//! state snapshots via tokio::watch.

pub mod capabilities;
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod kibo;
pub mod persona;
pub mod prompts;
pub mod providers;
pub mod schedulers;
pub mod speech;
pub mod state;
pub mod storage;
pub mod store;
pub mod types;
pub mod web;

pub use kibo::{Kibo, WeakKibo};
