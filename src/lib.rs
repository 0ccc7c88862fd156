pub mod access;
pub mod auth;
pub mod background;
pub mod config;
pub mod error;
pub mod models;
pub mod naming;
pub mod persistence;
pub mod routes;
pub mod sandbox;
pub mod services;
pub mod state;
pub mod storage;
pub mod store;
