// File: deemixbot-core/src/test_utils/mod.rs
pub mod fakes;
