//! # taxonorm API
//!
//! Read-only REST surface over run reports and the record store.
//!
//! | Route | Returns |
//! |-------|---------|
//! | `GET /health` | Status, version and record count |
//! | `GET /reports` | Report summaries, newest first |
//! | `GET /reports/{run_id}` | One full run report |
//! | `GET /records` | Records in scope (`project_code`, `solution`, `limit`) |
//! | `GET /distinct/{field_path}` | Distinct values of a field in scope |

pub mod rest;

pub use rest::{routes, ApiState, RestApi};
