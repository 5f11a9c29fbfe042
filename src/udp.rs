//! Sends one distribution queue out over UDP to a fixed peer (e.g. OpenCPN
//! listening on `0.0.0.0:<port>`). Mirrors `process_udp_queue`: while
//! connected, the relays that feed this queue are enabled; on any send
//! failure they're disabled again (so upstream readers stop bothering to
//! produce lines nobody is consuming) and the connection is retried after
//! a cooldown.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{info, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::relay::SentenceRelay;

const RECONNECT_DELAY: Duration = Duration::from_secs(20);

/// Runs forever, draining `rx` to a UDP socket connected to `ip:port`.
/// `relays_writing_udp` are the relays that feed `read_queue`'s sender
/// side; they track this task's connection state so idle producers don't
/// pile up unconsumed backlog while nobody is listening on the UDP end.
pub async fn run(
    read_queue: String,
    mut rx: UnboundedReceiver<Bytes>,
    ip: String,
    port: u16,
    relays_writing_udp: Vec<Arc<SentenceRelay>>,
) {
    loop {
        for relay in &relays_writing_udp {
            relay.enable(&read_queue);
        }

        match connect_and_drain(&ip, port, &mut rx).await {
            Ok(()) => {
                // rx closed: no producer left, nothing more to do.
                return;
            }
            Err(e) => {
                warn!("udp sender {read_queue} -> {ip}:{port} lost connection: {e}");
                for relay in &relays_writing_udp {
                    relay.disable(&read_queue);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

async fn connect_and_drain(ip: &str, port: u16, rx: &mut UnboundedReceiver<Bytes>) -> std::io::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.connect((ip, port)).await?;
    info!("udp sender connected to {ip}:{port}");

    while let Some(line) = rx.recv().await {
        socket.send(&line).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_and_drain_forwards_every_queued_line() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(Bytes::from_static(b"$GPRMC*00\r\n")).unwrap();
        drop(tx);

        connect_and_drain(&server_addr.ip().to_string(), server_addr.port(), &mut rx)
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$GPRMC*00\r\n");
    }
}
