#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chart;
pub mod classifier;
pub mod clients;
pub mod config;
pub mod error;
pub mod model;
pub mod observability;
pub mod pipeline;
pub(crate) mod schema;
pub mod store;
pub mod util;
