//! `text/event-stream` framing
//!
//! Frames are written by hand (`data: {json}\n\n`); incoming streams are
//! parsed with `eventsource-stream`. Only the `data` payload of each event
//! is kept.

use eventsource_stream::Eventsource;
use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt};
use rsc_core::{Error, Result};
use serde::Serialize;

/// One event: `data: {json}\n\n`
pub fn encode_frame<T: Serialize>(value: &T) -> Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(value)?))
}

/// Event payloads of a byte stream (e.g. `reqwest::Response::bytes_stream`).
/// The first upstream or parse error is yielded once and ends the stream.
pub fn decode_stream<S, B, E>(bytes: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    bytes
        .eventsource()
        .scan(false, |failed, event| {
            if *failed {
                return future::ready(None);
            }
            let next = match event {
                Ok(event) => Ok(event.data),
                Err(e) => {
                    *failed = true;
                    Err(Error::Transport {
                        status: 0,
                        message: format!("Event stream failed: {}", e),
                        correlation_id: String::new(),
                    })
                }
            };
            future::ready(Some(next))
        })
        .boxed()
}
