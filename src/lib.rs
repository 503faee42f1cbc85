//! # graphfind
//!
//! Keyword search across geodatabase tables, feature layers, and the
//! relationship graphs that connect them.
//!
//! The search engine lives in [`graphfind_core`]; this crate supplies a
//! SQLite-backed store, configuration, a CLI (`gfind`), and an HTTP service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌────────────┐
//! │ gfind.toml   │──▶│ Session +        │──▶│  SQLite     │
//! │ inventory    │   │ graphfind-core   │   │ SqliteStore │
//! └──────────────┘   └────────┬─────────┘   └────────────┘
//!                             │
//!                 ┌───────────┴──────────┐
//!                 ▼                      ▼
//!            ┌──────────┐          ┌──────────┐
//!            │   CLI    │          │   HTTP   │
//!            │ (gfind)  │          │  (axum)  │
//!            └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gfind init                          # create the class registry
//! gfind classes                       # list registered classes
//! gfind find "123" --json             # search the inventory
//! gfind serve                         # start the HTTP service
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Class and relationship registry schema |
//! | [`sqlite_store`] | SQLite [`Store`](graphfind_core::store::Store) |
//! | [`session`] | Session construction from config |
//! | [`search`] | `find` / `find_in` and the CLI search commands |
//! | [`parallel`] | One task per searchable table |
//! | [`server`] | HTTP service |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod db;
pub mod logging;
pub mod migrate;
pub mod parallel;
pub mod search;
pub mod server;
pub mod session;
pub mod sqlite_store;
