//! falbridge Engine library.
//!
//! Server-side half of the fal.ai bridge for a node-graph image host.
//!
//! ## Structure
//!
//! - `use_cases/` - Payload building, uploads, remote execution relay, downloads
//! - `nodes/` - Node kinds contributed to the host and their registry
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP and WebSocket entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod nodes;
pub mod use_cases;

pub use app::App;
