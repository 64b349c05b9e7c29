//! Protocol 1 UDP server.
//!
//! One socket, one task. Idle state waits for datagrams; a start command
//! switches to a `select!` loop that interleaves the timer-driven packet
//! producer with inbound command handling, so command effects and frame
//! production are naturally serialized. The producer timer skips missed
//! ticks rather than bursting to catch up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use num_complex::Complex64;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;

use hpsdremu_core::codec::unpack_tx_iq16;
use hpsdremu_core::config::format_mac;
use hpsdremu_core::error::{Error, Result};
use hpsdremu_core::{EchoBuffer, RadioConfig, RadioState, SignalGenerator};

use crate::frame::{
    apply_control_word, build_discovery_reply, control_response, fill_subframe,
    parse_control_word, samples_per_subframe, write_packet_header, PACKET_SIZE, SUBFRAME_OFFSETS,
    SUBFRAME_SIZE,
};

/// The Protocol 1 (Metis) emulator server.
///
/// Owns the socket, the signal source, and the optional echo buffer; the
/// only shared entity is [`RadioState`].
pub struct Protocol1Server {
    config: RadioConfig,
    state: Arc<RadioState>,
    socket: Arc<UdpSocket>,
    siggen: SignalGenerator,
    echo: Option<EchoBuffer>,
    peer: Option<SocketAddr>,
    packet: Box<[u8; PACKET_SIZE]>,
    scratch: Vec<Complex64>,
}

impl Protocol1Server {
    /// Bind the server socket. `addr` is a `host:port` string; the
    /// well-known port is 1024 (see [`crate::frame::DEFAULT_PORT`]).
    pub async fn bind(config: RadioConfig, state: Arc<RadioState>, addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| Error::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        let max_ddcs = config.hw.max_ddcs() as usize;
        let siggen = SignalGenerator::new(config.tone_hz, config.noise_level, max_ddcs);
        let echo = config
            .echo_enabled
            .then(|| EchoBuffer::new(state.sample_rate()));

        // Worst-case sample scratch: spr never exceeds the one-DDC value.
        let scratch = Vec::with_capacity(max_ddcs * samples_per_subframe(1));

        Ok(Self {
            config,
            state,
            socket: Arc::new(socket),
            siggen,
            echo,
            peer: None,
            packet: Box::new([0u8; PACKET_SIZE]),
            scratch,
        })
    }

    /// The bound local address (useful when binding to port 0 in tests).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until the surrounding task is dropped.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            addr = %self.socket.local_addr()?,
            radio = %self.config.hw,
            mac = %format_mac(&self.config.mac),
            "Protocol 1 server listening"
        );

        let mut recv_buf = [0u8; 2048];
        loop {
            if self.state.running() {
                self.stream(&mut recv_buf).await;
            } else {
                let result = self.socket.recv_from(&mut recv_buf).await;
                match result {
                    Ok((len, addr)) => self.handle_datagram(len, &recv_buf, addr).await,
                    Err(e) => tracing::warn!(error = %e, "recv failed"),
                }
            }
        }
    }

    /// The *Streaming* state: produce data packets on the sample-rate
    /// cadence while still servicing inbound datagrams.
    async fn stream(&mut self, recv_buf: &mut [u8; 2048]) {
        let mut cadence = self.cadence();
        let mut interval = tokio::time::interval(cadence);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("streaming started");

        while self.state.running() {
            let socket = Arc::clone(&self.socket);
            tokio::select! {
                _ = interval.tick() => {
                    self.send_data_packet().await;
                }
                result = socket.recv_from(recv_buf) => {
                    match result {
                        Ok((len, addr)) => self.handle_datagram(len, recv_buf, addr).await,
                        Err(e) => tracing::warn!(error = %e, "recv failed"),
                    }
                }
            }

            // Sample rate or DDC count changes move the packet cadence.
            let now = self.cadence();
            if now != cadence {
                cadence = now;
                interval = tokio::time::interval(cadence);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }
        }
        tracing::info!("streaming stopped");
    }

    /// Seconds per data packet: each packet carries `2 * spr` samples.
    fn cadence(&self) -> Duration {
        let nddc = self.state.n_active_ddc().max(1) as usize;
        let spr = samples_per_subframe(nddc);
        Duration::from_secs_f64((2 * spr) as f64 / self.state.sample_rate() as f64)
    }

    async fn handle_datagram(&mut self, len: usize, recv_buf: &[u8; 2048], addr: SocketAddr) {
        let data = &recv_buf[..len];
        if data.len() < 4 || data[0] != 0xEF || data[1] != 0xFE {
            tracing::debug!(len = data.len(), from = %addr, "ignoring datagram with unknown magic");
            return;
        }

        match data[2] {
            0x02 => {
                tracing::info!(from = %addr, "discovery request");
                let reply = build_discovery_reply(&self.config, self.state.running());
                if let Err(e) = self.socket.send_to(&reply, addr).await {
                    tracing::warn!(error = %e, "discovery reply send failed");
                }
            }
            0x04 => {
                if data[3] & 0x01 != 0 {
                    tracing::info!(to = %addr, "stream start");
                    self.peer = Some(addr);
                    self.state.set_running(true);
                } else {
                    tracing::info!("stream stop");
                    self.state.set_running(false);
                }
            }
            0x01 => {
                self.peer = Some(addr);
                self.handle_host_data(data);
            }
            other => {
                tracing::debug!(kind = other, from = %addr, "unrecognized packet type");
            }
        }
    }

    /// Decode both sub-frames of a host data packet: control words, PTT
    /// edges, and (in echo mode during PTT) the transmitted IQ payload.
    fn handle_host_data(&mut self, data: &[u8]) {
        if data.len() < PACKET_SIZE {
            tracing::debug!(len = data.len(), "short host data packet");
            return;
        }

        for &off in &SUBFRAME_OFFSETS {
            let sf = &data[off..off + SUBFRAME_SIZE];
            let Some(cw) = parse_control_word(sf) else {
                tracing::debug!(offset = off, "sub-frame without sync");
                continue;
            };

            self.apply_ptt(cw.ptt);
            apply_control_word(&self.state, &cw);

            if cw.ptt {
                if let Some(echo) = self.echo.as_mut() {
                    let tx_iq = unpack_tx_iq16(&sf[8..]);
                    echo.record(&tx_iq, self.state.tx_freq());
                }
            }
        }
    }

    /// Mirror the host PTT bit; the falling edge commits the echo burst
    /// before this task produces another frame.
    fn apply_ptt(&mut self, ptt: bool) {
        if self.state.set_ptt(ptt) != ptt {
            tracing::info!(ptt, "PTT changed");
            if !ptt {
                if let Some(echo) = self.echo.as_mut() {
                    echo.commit();
                }
            }
        }
    }

    async fn send_data_packet(&mut self) {
        let nddc = self.state.n_active_ddc().max(1) as usize;
        let spr = samples_per_subframe(nddc);

        write_packet_header(&mut self.packet[..], self.state.next_seq());
        for &off in &SUBFRAME_OFFSETS {
            self.fill_stream_subframe(off, nddc, spr);
        }

        if let Some(peer) = self.peer {
            if let Err(e) = self.socket.send_to(&self.packet[..], peer).await {
                tracing::warn!(error = %e, "data packet send failed; dropping");
            }
        }
    }

    fn fill_stream_subframe(&mut self, off: usize, nddc: usize, spr: usize) {
        let rate = self.state.sample_rate();

        self.scratch.resize(nddc * spr, Complex64::default());
        for ddc in 0..nddc {
            let chunk = &mut self.scratch[ddc * spr..(ddc + 1) * spr];
            match (ddc, self.echo.as_mut()) {
                (0, Some(echo)) if echo.has_playback() => {
                    echo.read_into(chunk, self.state.rx_freq(0), rate);
                }
                _ => self.siggen.generate_into(chunk, ddc, rate),
            }
        }

        let ctrl = control_response(
            self.state.next_ctrl_addr(),
            self.state.ptt(),
            self.state.tx_drive(),
        );
        let sf = &mut self.packet[off..off + SUBFRAME_SIZE];
        fill_subframe(sf, &ctrl, &self.scratch, nddc, spr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpsdremu_core::HardwareKind;
    use std::f64::consts::TAU;
    use tokio::time::timeout;

    const MAC: [u8; 6] = [0x00, 0x1c, 0xc0, 0xa2, 0x22, 0x5e];
    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    async fn spawn_server(config: RadioConfig) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let state = Arc::new(RadioState::new(config.hw, 48_000));
        let server = Protocol1Server::bind(config, state, "127.0.0.1:0")
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });
        (addr, handle)
    }

    fn quiet_config(hw: HardwareKind) -> RadioConfig {
        let mut config = RadioConfig::new(hw, MAC);
        config.noise_level = 0.0;
        config
    }

    async fn recv_packet(client: &UdpSocket, buf: &mut [u8]) -> usize {
        let (n, _) = timeout(RECV_TIMEOUT, client.recv_from(buf))
            .await
            .expect("timed out waiting for packet")
            .unwrap();
        n
    }

    fn discovery_request() -> [u8; 63] {
        let mut req = [0u8; 63];
        req[0] = 0xEF;
        req[1] = 0xFE;
        req[2] = 0x02;
        req
    }

    fn start_request(run: bool) -> [u8; 64] {
        let mut req = [0u8; 64];
        req[0] = 0xEF;
        req[1] = 0xFE;
        req[2] = 0x04;
        req[3] = u8::from(run);
        req
    }

    /// Build a 1032-byte host data packet whose sub-frames carry the given
    /// control bytes and an optional 16-bit TX IQ payload per sub-frame.
    fn host_data_packet(c0: u8, c1_c4: [u8; 4], payload: Option<[&[Complex64]; 2]>) -> Vec<u8> {
        let mut pkt = vec![0u8; PACKET_SIZE];
        pkt[0] = 0xEF;
        pkt[1] = 0xFE;
        pkt[2] = 0x01;
        pkt[3] = 0x02; // host endpoint
        for (i, &off) in SUBFRAME_OFFSETS.iter().enumerate() {
            pkt[off..off + 3].copy_from_slice(&crate::frame::SYNC);
            pkt[off + 3] = c0;
            pkt[off + 4..off + 8].copy_from_slice(&c1_c4);
            if let Some(bursts) = &payload {
                for (k, s) in bursts[i].iter().enumerate().take(63) {
                    let base = off + 8 + k * 8;
                    let i16_of = |v: f64| ((v * 32_767.0) as i16).to_be_bytes();
                    pkt[base + 4..base + 6].copy_from_slice(&i16_of(s.re));
                    pkt[base + 6..base + 8].copy_from_slice(&i16_of(s.im));
                }
            }
        }
        pkt
    }

    /// Deinterleave one sub-frame payload into per-DDC sample vectors.
    fn decode_subframe(sf: &[u8], nddc: usize) -> Vec<Vec<Complex64>> {
        assert_eq!(&sf[0..3], &crate::frame::SYNC);
        let spr = samples_per_subframe(nddc);
        let mut out = vec![Vec::with_capacity(spr); nddc];
        for row in 0..spr {
            let base = 8 + row * (6 * nddc + 2);
            for (ddc, samples) in out.iter_mut().enumerate() {
                let s = hpsdremu_core::codec::unpack_iq24(&sf[base + ddc * 6..base + ddc * 6 + 6]);
                samples.push(s[0]);
            }
        }
        out
    }

    #[tokio::test]
    async fn discovery_reply_identifies_the_board() {
        let (addr, server) = spawn_server(quiet_config(HardwareKind::Hermes)).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&discovery_request(), addr).await.unwrap();
        let mut buf = [0u8; 128];
        let n = recv_packet(&client, &mut buf).await;

        assert_eq!(n, 60);
        assert_eq!(&buf[0..3], &[0xEF, 0xFE, 0x02]);
        assert_eq!(buf[10], 0x01, "board code");
        assert_eq!(buf[11], 0x00, "protocol version");
        assert_eq!(buf[20], 0x04, "DDC count");
        server.abort();
    }

    #[tokio::test]
    async fn start_streams_tone_packets() {
        let (addr, server) = spawn_server(quiet_config(HardwareKind::Hermes)).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&start_request(true), addr).await.unwrap();
        let mut buf = [0u8; 2048];
        let n = recv_packet(&client, &mut buf).await;

        assert_eq!(n, PACKET_SIZE);
        assert_eq!(&buf[0..3], &[0xEF, 0xFE, 0x01]);
        assert_eq!(&buf[4..8], &[0, 0, 0, 0], "first packet has sequence 0");
        assert_eq!(&buf[8..11], &crate::frame::SYNC);
        assert_eq!(&buf[520..523], &crate::frame::SYNC);

        // 63 samples per sub-frame of a unit 1 kHz tone at 48 kHz: per
        // component RMS is 1/sqrt(2).
        let mut samples = Vec::new();
        for &off in &SUBFRAME_OFFSETS {
            samples.extend(decode_subframe(&buf[off..off + SUBFRAME_SIZE], 1).remove(0));
        }
        assert_eq!(samples.len(), 126);
        let rms = (samples.iter().map(|s| s.re * s.re).sum::<f64>() / samples.len() as f64).sqrt();
        assert!((rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.01, "RMS {rms}");
        server.abort();
    }

    #[tokio::test]
    async fn rate_command_reshapes_the_payload() {
        let (addr, server) = spawn_server(quiet_config(HardwareKind::Hermes)).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&start_request(true), addr).await.unwrap();
        let mut buf = [0u8; 2048];
        recv_packet(&client, &mut buf).await;

        // 192 kHz + 2 active DDCs: spr drops to 36 in 14-byte rows.
        let cmd = host_data_packet(0x00, [0x02, 0, 0, 0b0000_1000], None);
        client.send_to(&cmd, addr).await.unwrap();

        let mut reshaped = false;
        for _ in 0..40 {
            let n = recv_packet(&client, &mut buf).await;
            assert_eq!(n, PACKET_SIZE);
            let ddcs = decode_subframe(&buf[8..8 + SUBFRAME_SIZE], 2);
            if ddcs
                .iter()
                .all(|s| s.iter().all(|v| (v.norm() - 1.0).abs() < 1e-3))
            {
                reshaped = true;
                break;
            }
        }
        assert!(reshaped, "payload never switched to the 2-DDC layout");
        server.abort();
    }

    #[tokio::test]
    async fn telemetry_addresses_rotate_in_order() {
        let (addr, server) = spawn_server(quiet_config(HardwareKind::Hermes)).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&start_request(true), addr).await.unwrap();

        let mut addrs = Vec::new();
        let mut buf = [0u8; 2048];
        while addrs.len() < 4 {
            recv_packet(&client, &mut buf).await;
            let seq = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
            if seq as usize * 2 != addrs.len() {
                continue; // reordered or dropped on loopback; start is enough
            }
            for &off in &SUBFRAME_OFFSETS {
                addrs.push(buf[off + 3] & 0x7E);
            }
        }
        assert_eq!(addrs, [0x00, 0x08, 0x10, 0x18]);
        server.abort();
    }

    #[tokio::test]
    async fn echo_round_trip_replays_attenuated_tx() {
        let mut config = quiet_config(HardwareKind::Hermes);
        config.echo_enabled = true;
        let (addr, server) = spawn_server(config).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // 378 samples of a 0.5-amplitude 500 Hz tone at 48 kHz, split into
        // three data packets of two 63-sample sub-frames each, PTT held.
        let tone: Vec<Complex64> = (0..378)
            .map(|k| {
                let phase = TAU * 500.0 * k as f64 / 48_000.0;
                Complex64::new(phase.cos(), phase.sin()) * 0.5
            })
            .collect();
        for chunk in tone.chunks(126) {
            let pkt = host_data_packet(0x01, [0, 0, 0, 0], Some([&chunk[..63], &chunk[63..]]));
            client.send_to(&pkt, addr).await.unwrap();
        }
        // PTT release commits the recording.
        let release = host_data_packet(0x00, [0, 0, 0, 0], None);
        client.send_to(&release, addr).await.unwrap();

        client.send_to(&start_request(true), addr).await.unwrap();
        let mut buf = [0u8; 2048];
        loop {
            recv_packet(&client, &mut buf).await;
            if u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) == 0 {
                break;
            }
        }

        let samples = decode_subframe(&buf[8..8 + SUBFRAME_SIZE], 1).remove(0);

        // TX and RX are both at the default frequency: no shift, so the
        // first replayed sample is the first recorded one, 80 dB down.
        assert!((samples[0].re - 0.5e-4).abs() < 2e-6, "got {}", samples[0].re);
        assert!(samples[0].im.abs() < 2e-6);

        let rms = (samples.iter().map(|s| s.norm_sqr()).sum::<f64>() / samples.len() as f64).sqrt();
        let expected = 0.5e-4;
        assert!((rms / expected - 1.0).abs() < 0.05, "RMS {rms} vs {expected}");
        server.abort();
    }

    #[tokio::test]
    async fn stop_returns_to_idle() {
        let (addr, server) = spawn_server(quiet_config(HardwareKind::HermesLite)).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&start_request(true), addr).await.unwrap();
        let mut buf = [0u8; 2048];
        recv_packet(&client, &mut buf).await;

        client.send_to(&start_request(false), addr).await.unwrap();
        // Drain in-flight packets, then expect silence.
        tokio::time::sleep(Duration::from_millis(50)).await;
        while timeout(Duration::from_millis(10), client.recv_from(&mut buf))
            .await
            .is_ok()
        {}
        let idle = timeout(Duration::from_millis(100), client.recv_from(&mut buf)).await;
        assert!(idle.is_err(), "packets kept flowing after stop");

        // Discovery still answers in idle, now with the 0x02 magic.
        client.send_to(&discovery_request(), addr).await.unwrap();
        let n = recv_packet(&client, &mut buf).await;
        assert_eq!(n, 60);
        assert_eq!(buf[2], 0x02);
        server.abort();
    }
}
