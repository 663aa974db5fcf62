//! Integration tests for the reality compiler

mod test_utils;

pub use test_utils::*;

mod config_loading;
mod custom_rules;
mod legacy_by_date;
mod persistence;
mod views;
