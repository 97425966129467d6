use std::time::Instant;

use msgframe_frame::Frame;
use msgframe_pool::{BufferPool, PoolConfig, PoolStats, PoolStrategy};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::StressArgs;
use crate::exit::{frame_error, pool_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS};
use crate::output::{print_stress_report, OutputFormat};

#[derive(Serialize)]
pub struct StressReport {
    pub schema_id: &'static str,
    pub strategy: &'static str,
    pub threads: u16,
    pub iterations: usize,
    pub size: usize,
    pub fan_out: usize,
    pub frames: u64,
    pub owners_verified: u64,
    pub corruptions: u64,
    pub outstanding: u64,
    pub elapsed_ms: u64,
    pub stats: PoolStats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    frames: u64,
    owners_verified: u64,
    corruptions: u64,
}

impl Tally {
    fn merge(self, other: Tally) -> Tally {
        Tally {
            frames: self.frames + other.frames,
            owners_verified: self.owners_verified + other.owners_verified,
            corruptions: self.corruptions + other.corruptions,
        }
    }
}

pub fn run(args: StressArgs, format: OutputFormat) -> CliResult<i32> {
    let config = pool_config(&args);
    let pool = BufferPool::with_config(config).map_err(|e| pool_error("stress", e))?;

    info!(
        threads = args.threads,
        iterations = args.iterations,
        size = args.size,
        fan_out = args.fan_out,
        "starting stress run"
    );
    let started = Instant::now();

    let tally = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..args.threads)
            .map(|worker| {
                let pool = &pool;
                let args = &args;
                scope.spawn(move || run_worker(pool, worker, args))
            })
            .collect();

        workers.into_iter().try_fold(Tally::default(), |total, handle| {
            let tally = handle
                .join()
                .map_err(|_| CliError::new(INTERNAL, "stress worker panicked"))??;
            Ok::<_, CliError>(total.merge(tally))
        })
    })?;

    let stats = pool.stats();
    let outstanding = stats.outstanding();
    if outstanding != 0 {
        warn!(outstanding, "buffers were not returned to the pool");
    }

    let report = StressReport {
        schema_id: "https://schemas.3leaps.dev/msgframe/cli/v1/stress-report.schema.json",
        strategy: match config.strategy {
            PoolStrategy::Pooled => "pooled",
            PoolStrategy::Unpooled => "unpooled",
        },
        threads: args.threads,
        iterations: args.iterations,
        size: args.size,
        fan_out: args.fan_out,
        frames: tally.frames,
        owners_verified: tally.owners_verified,
        corruptions: tally.corruptions,
        outstanding,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        stats,
    };
    info!(
        frames = report.frames,
        corruptions = report.corruptions,
        elapsed_ms = report.elapsed_ms,
        "stress run finished"
    );
    print_stress_report(&report, format);

    if report.corruptions > 0 || outstanding > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "stress: {} corrupted payload(s), {} buffer(s) outstanding",
                report.corruptions, outstanding
            ),
        ));
    }
    Ok(SUCCESS)
}

fn pool_config(args: &StressArgs) -> PoolConfig {
    let mut config = if args.unpooled {
        PoolConfig::unpooled()
    } else {
        PoolConfig::default()
    };
    if let Some(max) = args.max_buffer_size {
        config.max_buffer_size = max;
    }
    if let Some(limit) = args.max_pooled_bytes {
        config.max_pooled_bytes = limit;
    }
    config
}

fn run_worker(pool: &BufferPool, worker: u16, args: &StressArgs) -> CliResult<Tally> {
    let mut tally = Tally::default();

    for iteration in 0..args.iterations {
        let marker = marker(worker, iteration);
        let mut source = Frame::new();
        source
            .init_pool_owned(pool, args.size)
            .map_err(|e| frame_error("init", e))?;
        source
            .with_payload_mut(|payload| payload.fill(marker))
            .map_err(|e| frame_error("fill", e))?;

        // Alternate between the two ways of gaining owners.
        let mut owners = fan_out(&mut source, args.fan_out, iteration % 2 == 0)?;
        owners.push(source);

        for owner in &owners {
            let intact = owner
                .with_payload(|payload| payload.iter().all(|byte| *byte == marker))
                .map_err(|e| frame_error("verify", e))?;
            if intact {
                tally.owners_verified += 1;
            } else {
                tally.corruptions += 1;
                warn!(worker, iteration, marker, "payload does not match marker");
            }
        }

        // The source goes first, so the last copy is the one returning the buffer.
        for mut owner in owners.into_iter().rev() {
            owner.close().map_err(|e| frame_error("close", e))?;
        }
        tally.frames += 1;
    }

    debug!(worker, frames = tally.frames, "stress worker done");
    Ok(tally)
}

fn fan_out(source: &mut Frame, count: usize, by_copy: bool) -> CliResult<Vec<Frame>> {
    if by_copy {
        return (0..count)
            .map(|_| {
                let mut copy = Frame::new();
                copy.copy_from(source).map_err(|e| frame_error("copy", e))?;
                Ok(copy)
            })
            .collect();
    }

    source.add_references(count);
    (0..count)
        .map(|_| source.claim_reference().map_err(|e| frame_error("claim", e)))
        .collect()
}

/// Non-zero byte unique enough per worker and iteration to expose buffer reuse
/// across owners.
fn marker(worker: u16, iteration: usize) -> u8 {
    let mixed = (worker as usize).wrapping_mul(31).wrapping_add(iteration);
    (mixed % 255) as u8 + 1
}
