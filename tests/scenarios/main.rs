//! End-to-end scenarios driving the engine against /bin/sh scripts

mod helpers;

mod failure_handling;
mod matrix_runs;
mod templates;
mod timeouts;
