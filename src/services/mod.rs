//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own room lifecycle, presence accounting, and persistence
//! concerns so route handlers can stay focused on protocol translation and
//! auth plumbing.

pub mod access;
pub mod persistence;
pub mod presence;
pub mod room;
pub mod session;
pub mod snapshot;
