use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("muxstream {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: muxstream");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("MUXSTREAM_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("MUXSTREAM_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("rust_version: {}", env!("CARGO_PKG_RUST_VERSION"));
    println!(
        "protocol_version: {}",
        muxstream_frame::PROTOCOL_VERSION
    );
    println!(
        "features: websocket={}, cli=true",
        cfg!(feature = "websocket")
    );

    Ok(SUCCESS)
}
