//! CLI domain: parse, route and output only.
//! No domain logic; the route table dispatches to the service and the tree.

mod output;
mod parse;
mod route;

pub use output::{
    format_changesets_json, format_changesets_text, format_entry, format_roots,
    format_sync_report, map_error,
};
pub use parse::{Cli, Commands};
pub use route::RunContext;
