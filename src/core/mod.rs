//! Core domain models for conveyor
//!
//! This module defines the fundamental data structures that represent
//! projects, pipelines, steps, matrices, and substitution contexts.

pub mod config;
pub mod error;
pub mod matrix;
pub mod pipeline;
pub mod state;
pub mod subst;
pub mod template;

pub use config::*;
pub use error::*;
pub use matrix::*;
pub use pipeline::*;
pub use state::*;
pub use subst::*;
pub use template::*;
