//! Pre-solve helpers: the approximate feasibility subsolver used as a
//! warm-start device.

pub mod feasibility;
