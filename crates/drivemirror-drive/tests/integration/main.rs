//! Integration tests for drivemirror-drive
//!
//! Uses wiremock to stand in for the Drive v2 API and checks request shape,
//! pagination and failure-class mapping of `DriveRemoteStore`.

mod common;

mod test_listing;
mod test_mutations;
