//! In-process API tests against the memory backend

mod api_tests;
mod common;
mod loan_tests;
