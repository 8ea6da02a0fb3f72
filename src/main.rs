//! etl-dag - Comment-preserving editor for ETL DAG files

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = etl_dag::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
