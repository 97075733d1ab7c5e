mod error;
mod frames;
mod logging;
mod marketplace;
mod pipeline;
mod probe;
mod runtime;
mod scoring;
mod trust;
mod tui;
mod types;
mod ui_utils;

pub use runtime::run;
