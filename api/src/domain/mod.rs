//! SQL queries, one module per table family

pub mod content;
pub mod quota;
pub mod requests;
pub mod videos;
