//! Test suites for the gateway daemon.

mod end_to_end;
pub(crate) mod support;
