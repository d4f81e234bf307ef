//! Event payloads published into a tripwire engine.
//!
//! An event is a type string plus a flat JSON key/value payload and a
//! timestamp. Zero knowledge of rules, conditions, or actions.

pub mod types;

pub use types::Event;
