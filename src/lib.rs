pub mod bot;
pub mod config;
pub mod data;
pub mod db;
pub mod session;
