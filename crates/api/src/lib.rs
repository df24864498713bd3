//! HTTP surface of paynotify: read-only payment queries, service status and
//! the inbound adapter discovery processes use to submit payments.

pub mod routes;
pub mod state;
