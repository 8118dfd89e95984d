//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                       |
//! |-----------|----------------------------------------|
//! | `migrate` | `Migrate`                              |
//! | `state`   | `Status`, `List`, `Reset`, `History`   |
//! | `project` | `Init`, `New`                          |
//! | `config`  | `Config`                               |

pub mod config;
pub mod migrate;
pub mod project;
pub mod state;

pub use config::cmd_config;
pub use migrate::cmd_migrate;
pub use project::{cmd_init, cmd_new};
pub use state::{cmd_history, cmd_list, cmd_reset, cmd_status};
