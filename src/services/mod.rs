//! Business logic services

pub mod catalog;
pub mod geo;
pub mod geocoding;
pub mod pricing;
pub mod proposal_state;
pub mod record;
pub mod routing;
pub mod sequencer;
pub mod store;
pub mod timeline;
pub mod travel_matrix;
