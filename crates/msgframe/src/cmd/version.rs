use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("msgframe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: msgframe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", target_triple());
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "pool: min_buffer_size={} max_buffer_size={}",
        msgframe_pool::DEFAULT_MIN_BUFFER_SIZE,
        msgframe_pool::DEFAULT_MAX_BUFFER_SIZE
    );

    Ok(SUCCESS)
}

fn target_triple() -> String {
    match option_env!("MSGFRAME_BUILD_TARGET") {
        Some(target) => target.to_string(),
        None => format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
    }
}
