//! Bidirectional stream relay
//!
//! Two copy tasks move bytes between the client and the backend, one per
//! direction. A direction that reaches EOF shuts down the write side of its
//! destination, so the peer observes the end of stream without the whole
//! duplex connection being torn down; the relay finishes only when both
//! directions are done. There is deliberately no idle timeout: a honeypot
//! wants to observe how long an attacker lingers.

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::common::BufferPool;

/// Forward data between two streams until both directions have finished
///
/// Returns the byte totals as (client to backend, backend to client).
pub(crate) async fn relay<C, B>(client: C, backend: B, pool: &BufferPool) -> (u64, u64)
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    B: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);

    let upstream_pool = pool.clone();
    let upstream = tokio::spawn(async move {
        copy_direction(client_read, backend_write, upstream_pool).await
    });

    let downstream_pool = pool.clone();
    let downstream = tokio::spawn(async move {
        copy_direction(backend_read, client_write, downstream_pool).await
    });

    let (sent, received) = tokio::join!(upstream, downstream);
    let sent = sent.unwrap_or(0);
    let received = received.unwrap_or(0);

    debug!("relay finished: {} bytes up, {} bytes down", sent, received);
    (sent, received)
}

/// Copy one direction until EOF or error, then half-close the destination
async fn copy_direction<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    pool: BufferPool,
) -> u64
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut pooled = pool.get_buffer().await;
    let mut total = 0u64;

    loop {
        match reader.read(&mut pooled.buffer).await {
            Ok(0) => break, // EOF
            Ok(n) => {
                if writer.write_all(&pooled.buffer[..n]).await.is_err() {
                    break;
                }
                total += n as u64;
            }
            Err(e) => {
                debug!("relay read error: {}", e);
                break;
            }
        }
    }

    // Signal EOF to the destination; the opposite direction keeps flowing
    let _ = writer.shutdown().await;
    total
}
