pub mod chrome;
pub mod chrome_export;
pub mod config;
pub mod filesystem;
pub mod logging;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod runtime;
pub mod safari;
pub mod safari_export;
pub mod stats;
