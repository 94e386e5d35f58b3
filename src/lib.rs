pub mod config;
pub mod epiweek;
pub mod features;
pub mod fetch;
pub mod locations;
pub mod model;
pub mod output;
pub mod sources;
pub mod transforms;
pub mod versioned;
