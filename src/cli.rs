// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Command-line surface: two positional paths, plus a small set of
//! ambient flags (verbosity, checkpoint forking, the exec sandbox root)
//! that don't change the persisted format.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "moor-persist", about = "LambdaMOO-lineage textdump loader/dumper")]
pub struct Args {
    /// Path to the input database file to load.
    pub input_db: PathBuf,

    /// Path to the output database file to write.
    pub output_db: PathBuf,

    /// Increase log verbosity (-v, -vv). Overrides RUST_LOG if set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run checkpoint dumps in the calling process instead of forking a
    /// "checkpointer" child.
    #[arg(long, default_value_t = false)]
    pub no_fork: bool,

    /// Root directory the exec collaborator is allowed to run binaries
    /// from. If unset, the exec collaborator is unavailable.
    #[arg(long, value_name = "exec-root")]
    pub exec_root: Option<PathBuf>,
}

impl Args {
    /// The `tracing_subscriber` env-filter directive implied by `-v`
    /// repetitions, falling back to `RUST_LOG` (or `info`) at zero.
    pub fn log_filter(&self) -> String {
        match self.verbose {
            0 => std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }

    pub fn checkpoint_policy(&self) -> crate::snapshot::CheckpointPolicy {
        if self.no_fork {
            crate::snapshot::CheckpointPolicy::Inline
        } else {
            crate::snapshot::CheckpointPolicy::Fork
        }
    }
}
