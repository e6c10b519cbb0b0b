use muxstream_client::{Client, ClientConfig, StreamError};

use crate::cmd::{block_on, parse_duration, peer_label, ProbeArgs};
use crate::exit::{config_error, stream_error, CliResult, SUCCESS};
use crate::output::{print_handshake, OutputFormat};

pub fn run(args: ProbeArgs, format: OutputFormat, mut config: ClientConfig) -> CliResult<i32> {
    config = args.target.apply(config)?;
    let timeout = parse_duration(&args.timeout)?;
    config.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

    let peer = peer_label(&config);
    let client = Client::from_config(&config).map_err(config_error)?;

    let handshake = block_on(async {
        let result = match client.recover().await {
            Ok(()) => client
                .handshake()
                .await
                .ok_or_else(|| StreamError::connection("connection lost after handshake")),
            Err(err) => Err(err),
        };
        client.close().await;
        result
    })?
    .map_err(|err| stream_error("probe failed", err))?;

    print_handshake(&handshake, &peer, format);
    Ok(SUCCESS)
}
