use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod stress;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hammer a shared buffer pool with fanned-out frames and verify payloads.
    Stress(StressArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Stress(args) => stress::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct StressArgs {
    /// Worker threads sharing one pool.
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,
    /// Source frames built per thread.
    #[arg(long, default_value_t = 1000)]
    pub iterations: usize,
    /// Payload size in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 256)]
    pub size: usize,
    /// Additional owners per source frame.
    #[arg(long, default_value_t = 4)]
    pub fan_out: usize,
    /// Largest pooled size class (power of two).
    #[arg(long, value_name = "BYTES", env = "MSGFRAME_MAX_BUFFER_SIZE")]
    pub max_buffer_size: Option<usize>,
    /// Upper bound on idle bytes retained by the pool.
    #[arg(long, value_name = "BYTES", env = "MSGFRAME_MAX_POOLED_BYTES")]
    pub max_pooled_bytes: Option<usize>,
    /// Allocate on every take instead of recycling.
    #[arg(long)]
    pub unpooled: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
