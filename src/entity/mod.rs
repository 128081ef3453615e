//! SeaORM entity definitions for PostgreSQL database.

pub mod staging_record;
pub mod upload;
