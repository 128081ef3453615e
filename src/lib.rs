//! Transport CRM import service library.
//!
//! Ingests user spreadsheets, maps their columns onto the CRM's canonical
//! schemas, stages the rows for review and keeps an auditable history of
//! every uploaded file.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod import;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
