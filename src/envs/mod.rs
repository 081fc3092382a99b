//! Environments bundled with the controller

pub mod point_mass;

pub use point_mass::PointMass;
