#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

pub mod attribution;
pub mod battery;
pub mod dispatch;
pub mod engine;
pub mod forecast;
pub mod interval;
pub mod plan;
pub mod prelude;
pub mod quantity;
pub mod recommendation;
pub mod scheduler;
pub mod settings;
pub mod tariff;

#[cfg(test)]
mod fixtures;
