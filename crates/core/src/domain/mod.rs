pub mod artifact;
pub mod contract;
