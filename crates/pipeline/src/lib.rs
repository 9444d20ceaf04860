//! Encrypted statistics pipeline
//!
//! One parametrized pipeline `(scheme, workload, transport)`: the holder
//! encrypts the workload fields, the analyzer evaluates the formulas and the
//! statistics protocol on ciphertexts, the holder decrypts and checks every
//! result against the plaintext ground truth.
//!
//! - **`coordinator`**: stage ordering, timings and the approx/exact comparison
//! - **`data`**: demo, synthetic and JSON datasets
//! - **`report`**: run reports
//! - **`settings`**: pipeline options and the TOML pipeline file
//! - **`truth`**: plaintext ground truth
//! - **`workload`**: named computation sets

pub mod coordinator;
pub mod data;
pub mod report;
pub mod settings;
pub mod truth;
pub mod workload;

pub use coordinator::{compare, Pipeline};
pub use data::Dataset;
pub use report::{
    Comparison, ComputationResult, RunReport, StageTimings, StatisticsResult, ZScore,
};
pub use settings::{PipelineFile, PipelineOptions};
pub use workload::{Computation, Workload};
