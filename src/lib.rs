//! Age-stratified epidemic model on fractional compartments.
//!
//! A susceptible / incubating / infectious front feeds diagnosed cases into one
//! clinical pathway graph per age cohort.  Every compartment moves a fixed share
//! of its occupants each day, staged as pending deltas and committed together.

pub mod data_management;
pub mod error;
pub mod markov;
pub mod model;
pub mod pathways;
pub mod scenario;
pub mod stats;
pub mod utilities;

pub use error::{DataError, ModelError};
pub use markov::{ExitState, OverflowPolicy, ProbState, StateGraph, StateId};
pub use model::EpiModel;
pub use pathways::{
    CareCapacity, CohortIncidence, PathState, PathTimings, PathsByAge, SubgroupRates,
};
pub use scenario::{CohortSpec, InitialValues, R0Schedule, R0Shift, Scenario};
pub use stats::{FitLog, FitRecord, ObservedSeries, SeriesLog, Summary};
