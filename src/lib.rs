// Library exports for zuppi
// Integration tests build the router from here

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod media;
pub mod routes;
pub mod social;
pub mod state;
