//! fmgr Core
//!
//! Resource model, provider abstraction and ordered-list position logic for
//! managing FortiManager "move" resources as values.

pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod plan;
pub mod position;
pub mod provider;
pub mod resource;
pub mod schema;
