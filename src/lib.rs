pub mod aggregate;
pub mod app;
pub mod compare;
pub mod config;
pub mod demix;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod mapping;
pub mod merge;
pub mod output;
pub mod table;
