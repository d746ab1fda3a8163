//! Integration tests for drivemirror-sync
//!
//! Drives the coordinator and its components against an in-memory remote
//! store and a temporary mirror directory.


mod test_coordinator;
mod test_mutation;
mod test_usage;
