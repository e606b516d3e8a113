pub mod action;
pub mod assistant;
