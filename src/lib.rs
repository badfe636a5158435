pub mod analysis;
pub mod config;
pub mod db;
pub mod llm;
pub mod query;
pub mod util;
pub mod web;
