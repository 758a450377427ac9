//! UniGoods backend library
//!
//! Campus marketplace server: item listings, trade proposals between
//! students, and student-ID verification.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod item;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod trade;
pub mod user;
pub mod verification;
pub mod websocket;
