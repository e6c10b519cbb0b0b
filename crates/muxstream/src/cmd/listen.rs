use muxstream_client::{Client, ClientConfig, StreamError};
use tokio::sync::mpsc;
use tracing::info;

use crate::cmd::{block_on, peer_label, ListenArgs};
use crate::exit::{config_error, stream_error, CliResult, SUCCESS};
use crate::output::{print_body, BodyKind, OutputFormat};

enum Event {
    Push(bytes::Bytes),
    Closed(StreamError),
}

pub fn run(args: ListenArgs, format: OutputFormat, config: ClientConfig) -> CliResult<i32> {
    let config = args.target.apply(config)?;
    let peer = peer_label(&config);
    let client = Client::from_config(&config).map_err(config_error)?;

    let (tx, mut events) = mpsc::unbounded_channel();
    let pushes = tx.clone();
    client.on_push(move |body| {
        let _ = pushes.send(Event::Push(body));
    });
    client.on_peer_closed(move |err| {
        let _ = tx.send(Event::Closed(err));
    });

    block_on(async {
        if let Err(err) = client.recover().await {
            return Err(stream_error("connect failed", err));
        }
        info!(peer = %peer, "listening for pushes");

        let mut printed = 0usize;
        let result = loop {
            if args.count.is_some_and(|count| printed >= count) {
                break Ok(SUCCESS);
            }
            let event = tokio::select! {
                _ = tokio::signal::ctrl_c() => break Ok(SUCCESS),
                event = events.recv() => event,
            };
            match event {
                Some(Event::Push(body)) => {
                    print_body(BodyKind::Push, &body, &peer, format);
                    printed = printed.saturating_add(1);
                }
                Some(Event::Closed(err)) => break Err(stream_error("connection lost", err)),
                None => break Ok(SUCCESS),
            }
        };
        client.close().await;
        result
    })?
}
