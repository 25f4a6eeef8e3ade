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

use clap::Parser;
use moor_persist::cli::Args;
use moor_persist::dbio::{DbioReader, DbioWriter};
use moor_persist::snapshot::{DumpReason, SnapshotWriter};
use moor_persist::textdump::{dump_textdump, load_textdump};
use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let input = File::open(&args.input_db)
        .map_err(|e| format!("could not open input db {:?}: {e}", args.input_db))?;
    let mut reader = DbioReader::new(BufReader::new(input));
    let db = load_textdump(&mut reader)?;
    tracing::info!(
        objects = db.objects.len(),
        users = db.users.len(),
        programs = db.programs.len(),
        was_upgraded = db.was_upgraded,
        "textdump loaded"
    );

    let mut snapshot = SnapshotWriter::new(&args.output_db, args.checkpoint_policy());
    snapshot.dump(DumpReason::Shutdown, |w: &mut DbioWriter<File>| {
        dump_textdump(w, &db)
    })?;
    tracing::info!(path = ?args.output_db, "textdump written");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log_filter()))
        .with_target(false)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("moor-persist: {e}");
            ExitCode::FAILURE
        }
    }
}
