//! Route handlers

pub mod alerts;
pub mod rules;
pub mod stream;
pub mod videos;
