pub mod app;
pub mod config;
pub mod dimension;
pub mod domain;
pub mod error;
pub mod facts;
pub mod gbif;
pub mod interchange;
pub mod normalize;
pub mod output;
pub mod query;
pub mod record;
pub mod store;
pub mod taxonomy;
