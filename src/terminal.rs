use std::io;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::pubsub::Subscription;

/// Write every message of the subscription to `writer`, one per line.
///
/// Returns when the subscription ends or the writer fails.
pub async fn print<W>(mut writer: W, subscription: Subscription) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut messages = subscription.into_stream();

    while let Some(message) = messages.next().await {
        let mut line = message.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }

    debug!("No more messages to print");

    Ok(())
}
