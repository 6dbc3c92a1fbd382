//! Test suite modules

mod health;
mod perf;
mod session_flow;
