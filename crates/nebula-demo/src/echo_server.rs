//! Framed echo server used as the demo's peer.

use std::net::SocketAddr;

use nebula_net::{FrameConfig, FrameError, read_frame, write_frame};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Accept connections forever, echoing every frame back to its sender.
pub async fn run(bind: SocketAddr, frame: FrameConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("Echo server listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!("Client connected from {peer}");

        let frame = frame.clone();
        tokio::spawn(async move {
            match echo(stream, &frame).await {
                Ok(echoed) => info!("Client {peer} disconnected after {echoed} frames"),
                Err(e) => warn!("Client {peer} dropped: {e}"),
            }
        });
    }
}

/// Echo frames until the peer closes. Returns the number of frames echoed.
pub async fn echo(mut stream: TcpStream, frame: &FrameConfig) -> Result<u64, FrameError> {
    let mut echoed = 0;
    loop {
        let payload = match read_frame(&mut stream, frame).await {
            Ok(payload) => payload,
            Err(FrameError::ConnectionClosed) => return Ok(echoed),
            Err(e) => return Err(e),
        };
        debug!("Echoing {} bytes", payload.len());
        write_frame(&mut stream, &payload, frame).await?;
        echoed += 1;
    }
}
