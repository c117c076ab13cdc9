pub mod access;
pub mod api;
pub mod config;
pub mod crawl;
pub mod error;
pub mod html;
pub mod model;
pub mod report;
pub mod table;
