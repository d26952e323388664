pub mod db;
pub mod explorer;
#[cfg(any(feature = "e2e-testing", debug_assertions))]
pub mod explorer_mock;
pub mod file_utils;
pub mod webhook;
