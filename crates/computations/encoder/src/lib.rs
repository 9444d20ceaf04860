//! Formula encoder
//!
//! Turns a rational business formula into an operation sequence for one
//! scheme variant. For the integer-only schemes it also derives the
//! [`ScalingPlan`] that clears denominators before encryption and reverses
//! the scaling after decryption, and checks the plan's worst case against the
//! plaintext modulus before any ciphertext operation runs.

pub mod eval;
pub mod formula;
pub mod plan;

pub use eval::evaluate;
pub use formula::{decimal, Aggregate, Coefficient, FieldRef, Formula, Term};
pub use plan::{worst_case_magnitude, FormulaEncoder, OpSequence, Plan, ScalingPlan, Step};
