pub mod auth;
pub mod config;
pub mod domain;
pub mod handler;
pub mod memory;
pub mod postgres;
pub mod usecase;
