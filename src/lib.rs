#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::new_without_default,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

pub mod alert;
pub mod auth;
pub mod background;
pub mod certs;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod queue;
pub mod routes;
pub mod shell;
pub mod state;
pub mod status_page;
pub mod tenant;
