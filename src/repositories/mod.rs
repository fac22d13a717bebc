//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! probe hierarchy and measurement history.

pub mod hierarchy;
pub mod measurement;

pub use hierarchy::{HierarchyRepository, ResolvedProbe};
pub use measurement::{
    MeasurementPage, MeasurementRepository, ProjectionUpdate, StoredMeasurement, TimeRange,
};
