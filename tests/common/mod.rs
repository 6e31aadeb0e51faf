#![allow(dead_code)]

pub mod recording;
pub mod strategies;

pub use recording::*;
pub use strategies::*;
