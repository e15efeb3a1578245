//! End-to-end tests against simulated controllers on loopback addresses.

use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use t100k_control::protocol::{CONTINUATION_MARKER, FRAME_COUNT, FRAME_LEN, START_MARKER};
use t100k_control::T100kNal;
use t100k_core::{Color, NalConfig, OutputItem};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Datagrams per controller and cycle: frames, continuation, start marker
const BURST_LEN: usize = FRAME_COUNT + 2;

/// A fake controller listening on `127.0.0.(50 + id)`
struct FakeDevice {
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    task: JoinHandle<()>,
}

impl FakeDevice {
    async fn spawn(id: u8, port: u16, acknowledge: bool) -> (Self, u16) {
        let addr = SocketAddr::new(Ipv4Addr::new(127, 0, 0, 50 + id).into(), port);
        let socket = UdpSocket::bind(addr).await.expect("bind fake device");
        let port = socket.local_addr().unwrap().port();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let datagram = buf[..len].to_vec();
                let is_continuation = datagram == CONTINUATION_MARKER;
                sink.lock().push(datagram);
                if is_continuation && acknowledge {
                    let _ = socket.send_to(&[0xAC], from).await;
                }
            }
        });

        (Self { received, task }, port)
    }

    fn count(&self) -> usize {
        self.received.lock().len()
    }

    fn bursts(&self) -> Vec<Vec<Vec<u8>>> {
        self.received
            .lock()
            .chunks(BURST_LEN)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn `acks.len()` devices sharing one port
async fn spawn_devices(acks: &[bool]) -> (Vec<FakeDevice>, u16) {
    let mut devices = Vec::new();
    let mut port = 0;
    for (id, ack) in acks.iter().enumerate() {
        let (device, bound) = FakeDevice::spawn(id as u8, port, *ack).await;
        port = bound;
        devices.push(device);
    }
    (devices, port)
}

fn loopback_config(count: u8, port: u16, fps: u32) -> NalConfig {
    NalConfig {
        strict_address_check: true,
        max_controller_count: count,
        target_frame_rate: fps,
        subnet: Ipv4Addr::new(127, 0, 0, 0),
        port,
        ack_timeout_ms: 30,
        idle_refresh_ms: Some(10_000),
        stop_grace_ms: 500,
    }
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn assert_burst_shape(burst: &[Vec<u8>]) {
    assert_eq!(burst.len(), BURST_LEN);
    for (index, frame) in burst[..FRAME_COUNT].iter().enumerate() {
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(frame[0], 0x88);
        assert_eq!(frame[1] as usize, index);
    }
    assert_eq!(burst[FRAME_COUNT], CONTINUATION_MARKER);
    assert_eq!(burst[FRAME_COUNT + 1], START_MARKER);
}

#[tokio::test]
async fn test_first_cycle_flushes_every_controller_once() {
    let (devices, port) = spawn_devices(&[true, true]).await;
    let mut nal = T100kNal::new();
    nal.initialize(loopback_config(2, port, 20)).await.unwrap();
    nal.start().unwrap();

    wait_for("initial flush", || {
        devices.iter().all(|d| d.count() >= BURST_LEN)
    })
    .await;

    for device in &devices {
        let bursts = device.bursts();
        assert_burst_shape(&bursts[0]);
        // All black: only the slot separators are set
        for frame in &bursts[0][..FRAME_COUNT] {
            for slot in frame[12..1036].chunks(16) {
                assert_eq!(slot[0], 0xFF);
                assert!(slot[1..].iter().all(|b| *b == 0));
            }
        }
    }
    wait_for("acknowledgments", || nal.is_online(0) && nal.is_online(1)).await;

    // Untouched controllers are not refreshed again
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(devices.iter().all(|d| d.count() == BURST_LEN));

    nal.destroy().await;
}

#[tokio::test]
async fn test_update_reaches_only_the_written_controller() {
    let (devices, port) = spawn_devices(&[true, true]).await;
    let mut nal = T100kNal::new();
    nal.initialize(loopback_config(2, port, 20)).await.unwrap();
    nal.start().unwrap();
    wait_for("initial flush", || {
        devices.iter().all(|d| d.count() >= BURST_LEN)
    })
    .await;

    nal.update_data([OutputItem::new(0, 3, 10, Color::new(0xFF, 0, 0))]).unwrap();
    wait_for("update burst", || devices[0].count() >= 2 * BURST_LEN).await;

    let bursts = devices[0].bursts();
    assert_burst_shape(&bursts[1]);
    let frame = &bursts[1][0];
    for byte in &frame[173..=177] {
        assert_eq!(*byte, 1 << 3);
    }
    for byte in &frame[178..=187] {
        assert_eq!(*byte & (1 << 3), 0);
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(devices[1].count(), BURST_LEN);

    nal.destroy().await;
}

#[tokio::test]
async fn test_updates_between_cycles_are_coalesced() {
    let (devices, port) = spawn_devices(&[true]).await;
    let mut nal = T100kNal::new();
    // 2 fps: at least 500 ms between cycle starts
    nal.initialize(loopback_config(1, port, 2)).await.unwrap();
    nal.start().unwrap();
    wait_for("initial flush", || devices[0].count() >= BURST_LEN).await;

    nal.update_data([OutputItem::new(0, 0, 0, Color::new(0, 0xFF, 0))]).unwrap();
    nal.update_data([OutputItem::new(0, 0, 0, Color::new(0, 0, 0xFF))]).unwrap();

    wait_for("update burst", || devices[0].count() >= 2 * BURST_LEN).await;
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(devices[0].count(), 2 * BURST_LEN);

    let bursts = devices[0].bursts();
    let slot = &bursts[1][0][12..28];
    // green planes clear, blue planes set for universe 0
    assert!(slot[6..11].iter().all(|b| *b & 1 == 0));
    assert!(slot[11..16].iter().all(|b| *b & 1 == 1));

    nal.destroy().await;
}

#[tokio::test]
async fn test_offline_controller_does_not_block_the_cycle() {
    // Controller 0 never answers
    let (devices, port) = spawn_devices(&[false, true]).await;
    let mut nal = T100kNal::new();
    // The update below is folded into the first cycle; idle refresh drives the rest
    let config = NalConfig {
        idle_refresh_ms: Some(100),
        ..loopback_config(2, port, 10)
    };
    nal.initialize(config).await.unwrap();
    nal.update_data([
        OutputItem::new(0, 1, 5, Color::WHITE),
        OutputItem::new(1, 1, 5, Color::WHITE),
    ])
    .unwrap();
    nal.start().unwrap();

    wait_for("second cycle", || {
        devices.iter().all(|d| d.count() >= 2 * BURST_LEN)
    })
    .await;
    assert!(!nal.is_online(0));
    assert!(nal.is_online(1));
    assert!(nal.cycle_count() >= 2);

    for device in &devices {
        for burst in device.bursts().iter().filter(|b| b.len() == BURST_LEN) {
            assert_burst_shape(burst);
        }
    }

    nal.destroy().await;
}

#[tokio::test]
async fn test_restart_after_stop() {
    let (devices, port) = spawn_devices(&[true]).await;
    let mut nal = T100kNal::new();
    nal.initialize(loopback_config(1, port, 20)).await.unwrap();
    nal.start().unwrap();
    wait_for("initial flush", || devices[0].count() >= BURST_LEN).await;

    nal.stop().await.unwrap();
    let stopped_at = devices[0].count();
    nal.update_data([OutputItem::new(0, 0, 0, Color::WHITE)]).unwrap_err();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(devices[0].count(), stopped_at);

    nal.start().unwrap();
    nal.update_data([OutputItem::new(0, 0, 0, Color::WHITE)]).unwrap();
    wait_for("burst after restart", || {
        devices[0].count() >= stopped_at + BURST_LEN
    })
    .await;

    nal.destroy().await;
}
