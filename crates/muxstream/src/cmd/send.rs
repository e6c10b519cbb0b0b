use std::fs;

use muxstream_client::{Client, ClientConfig, Headers};
use tracing::debug;

use crate::cmd::{block_on, parse_duration, peer_label, SendArgs};
use crate::exit::{config_error, io_error, stream_error, CliResult, SUCCESS};
use crate::output::{print_body, BodyKind, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat, config: ClientConfig) -> CliResult<i32> {
    let config = args.target.apply(config)?;
    let timeout = match &args.timeout {
        Some(raw) => parse_duration(raw)?,
        None => config.request_timeout(),
    };
    let body = resolve_body(&args)?;
    let headers: Headers = args.headers.iter().cloned().collect();
    let peer = peer_label(&config);
    let client = Client::from_config(&config).map_err(config_error)?;

    debug!(peer = %peer, len = body.len(), headers = headers.len(), "sending request");
    let reply = block_on(async {
        let result = if args.correlation_id {
            client.send_with_correlation_id(&body, &headers, timeout).await
        } else {
            client.send(&body, &headers, timeout).await
        };
        client.close().await;
        result
    })?
    .map_err(|err| stream_error("send failed", err))?;

    print_body(BodyKind::Response, &reply, &peer, format);
    Ok(SUCCESS)
}

fn resolve_body(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
