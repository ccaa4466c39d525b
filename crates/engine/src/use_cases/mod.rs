//! Use cases: round coordination and the solo story flow.

pub mod round;
pub mod story;
