//! Line-delimited JSON-RPC over stdin/stdout: one frame per line in, one
//! frame per line out, matching the teacher's own line-transport habits.
//! A single stdio process serves exactly one session (spec §4.6).

use std::sync::Arc;

use obridge_server::protocol::{self, Session};
use obridge_server::{dispatch, ServerContext};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::TransportError;

/// Reads frames from stdin until EOF or Ctrl-C, writing one response frame
/// per line to stdout. Lines that don't parse as a JSON-RPC envelope get a
/// best-effort `invalid_request` reply with a `null` id, since a frame that
/// fails to parse has no id to echo back.
pub async fn serve(ctx: Arc<ServerContext>) -> Result<(), TransportError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut session = Session::new();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = ctrl_c() => {
                tracing::info!("stdio transport interrupted");
                break;
            }
        };
        let Some(line) = line else {
            tracing::info!("stdin closed, stdio transport stopping");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame = match protocol::decode_frame(&line) {
            Ok(request) => match dispatch(&ctx, &mut session, None, None, request).await {
                Some(response) => Some(protocol::encode_frame(&response)),
                None => None,
            },
            Err(message) => Some(invalid_request_frame(&message)),
        };

        if let Some(mut frame) = frame {
            frame.push('\n');
            stdout.write_all(frame.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
}

fn invalid_request_frame(details: &str) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": {
            "code": -32600,
            "message": "invalid request",
            "data": { "type": "ProtocolError", "details": details },
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_frame_carries_details() {
        let frame = invalid_request_frame("malformed JSON: x");
        assert!(frame.contains("malformed JSON"));
        assert!(frame.contains("-32600"));
    }
}
