//! Gatehouse - session-based authentication and role authorization
//!
//! This library provides account storage, session resolution and the
//! HTTP gates that protect routes by login state and role.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
