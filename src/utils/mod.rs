//! Export contents of `utils` folder
mod utils;
mod drift;
pub mod kinematics;

pub use self::{
    utils::*,
    drift::*,
    kinematics::{linear_velocity, angular_velocity, speed_profile},
};
