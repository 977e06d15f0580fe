//! DLQ Replay - Entry Point
//!
//! Exits 0 when the DLQ was drained (or already empty) and 1 when the run
//! halted on a failed republish.

use clap::Parser;
use flowpay_dlq_replay::Cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    let cli = Cli::parse();
    let summary = flowpay_dlq_replay::run(cli).await?;

    Ok(if summary.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
