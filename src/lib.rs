pub mod constants;
pub mod fast_tracking;
pub mod field;
pub mod fitting;
pub mod geometry;
pub mod hits;
pub mod momentum;
pub mod swim;
pub mod tracker_errors;
pub mod tracklet;
