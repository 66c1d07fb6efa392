//! Export contents of `mot` folder
mod entity;
mod candidate_queue;
mod large_entity;
mod big_manager;
mod small_entity;
mod small_tracker;
mod region_filter;
mod presence;
pub mod mot_errors;

pub use self::{
    entity::{DisplayEntity, Entity, EntityKind},
    candidate_queue::*,
    large_entity::*,
    big_manager::*,
    small_entity::*,
    small_tracker::*,
    region_filter::*,
    presence::*,
    mot_errors::TrackerError,
};
