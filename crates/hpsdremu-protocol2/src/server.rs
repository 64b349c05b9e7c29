//! Protocol 2 UDP server.
//!
//! Six inbound sockets (general, RX-specific, TX-specific, high-priority,
//! TX audio, TX IQ on consecutive ports) plus one outbound socket per DDC.
//! Hosts demultiplex the radio's streams by *source* port: high-priority
//! status arrives from the RX-specific port, mic audio from the TX-specific
//! port, and DDC `d` IQ from port base+11+d.
//!
//! There is no persistent streaming state: the run bit of the most recent
//! high-priority command decides whether the stream tasks exist.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use num_complex::Complex64;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use hpsdremu_core::codec::{pack_iq24, unpack_iq24};
use hpsdremu_core::config::format_mac;
use hpsdremu_core::error::{Error, Result};
use hpsdremu_core::{EchoBuffer, RadioConfig, RadioState, SignalGenerator};

use crate::frame::{
    build_discovery_reply, build_hp_status, build_mic_frame, parse_high_priority,
    parse_rx_specific, write_ddc_header, DDC_HEADER_SIZE, DDC_PACKET_SIZE, HP_STATUS_SIZE,
    MIC_PACKET_SIZE, MIC_SAMPLE_RATE, SAMPLES_PER_DDC_PACKET, SAMPLES_PER_MIC_PACKET,
};

/// High-priority status cadence (10 Hz).
const HP_STATUS_INTERVAL: Duration = Duration::from_millis(100);

/// The UDP port assignments, relative to a base port.
///
/// The well-known layout starts at 1024; tests move the whole plan to a
/// free region with [`PortPlan::from_base`].
#[derive(Debug, Clone, Copy)]
pub struct PortPlan {
    base: u16,
}

impl Default for PortPlan {
    fn default() -> Self {
        Self { base: 1024 }
    }
}

impl PortPlan {
    /// A plan rooted at an arbitrary base port.
    pub fn from_base(base: u16) -> Self {
        Self { base }
    }

    /// General / discovery port (1024).
    pub fn general(&self) -> u16 {
        self.base
    }

    /// RX-specific command port (1025); also the status source port.
    pub fn rx_specific(&self) -> u16 {
        self.base + 1
    }

    /// TX-specific command port (1026); also the mic source port.
    pub fn tx_specific(&self) -> u16 {
        self.base + 2
    }

    /// High-priority command port (1027).
    pub fn high_priority(&self) -> u16 {
        self.base + 3
    }

    /// TX audio port (1028).
    pub fn tx_audio(&self) -> u16 {
        self.base + 4
    }

    /// TX IQ port (1029).
    pub fn tx_iq(&self) -> u16 {
        self.base + 5
    }

    /// Source port for DDC `d` IQ packets (1035+d).
    pub fn ddc(&self, d: u8) -> u16 {
        self.base + 11 + d as u16
    }
}

/// Which inbound socket a datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortKind {
    General,
    RxSpecific,
    TxSpecific,
    HighPriority,
    TxAudio,
    TxIq,
}

/// The Protocol 2 emulator server.
pub struct Protocol2Server {
    inner: Arc<Inner>,
}

struct Inner {
    config: RadioConfig,
    state: Arc<RadioState>,
    siggen: tokio::sync::Mutex<SignalGenerator>,
    echo: Option<tokio::sync::Mutex<EchoBuffer>>,
    general: Arc<UdpSocket>,
    rx_specific: Arc<UdpSocket>,
    tx_specific: Arc<UdpSocket>,
    high_priority: Arc<UdpSocket>,
    tx_audio: Arc<UdpSocket>,
    tx_iq: Arc<UdpSocket>,
    ddc_socks: Vec<Arc<UdpSocket>>,
    peer: std::sync::Mutex<Option<SocketAddr>>,
    streams: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    /// Running sample count of DDC 0, the timestamp base for every stream.
    ddc0_samples: AtomicU64,
}

async fn bind_udp(host: &str, port: u16) -> Result<Arc<UdpSocket>> {
    let addr = format!("{host}:{port}");
    let socket = UdpSocket::bind(&addr).await.map_err(|e| Error::Bind {
        addr: addr.clone(),
        source: e,
    })?;
    tracing::info!(addr = %addr, "Protocol 2 listening");
    Ok(Arc::new(socket))
}

impl Protocol2Server {
    /// Bind all inbound command sockets and one outbound socket per DDC
    /// the board has.
    pub async fn bind(
        config: RadioConfig,
        state: Arc<RadioState>,
        host: &str,
        plan: PortPlan,
    ) -> Result<Self> {
        let general = bind_udp(host, plan.general()).await?;
        let rx_specific = bind_udp(host, plan.rx_specific()).await?;
        let tx_specific = bind_udp(host, plan.tx_specific()).await?;
        let high_priority = bind_udp(host, plan.high_priority()).await?;
        let tx_audio = bind_udp(host, plan.tx_audio()).await?;
        let tx_iq = bind_udp(host, plan.tx_iq()).await?;

        let mut ddc_socks = Vec::with_capacity(config.hw.max_ddcs() as usize);
        for d in 0..config.hw.max_ddcs() {
            ddc_socks.push(bind_udp(host, plan.ddc(d)).await?);
        }

        let max_ddcs = config.hw.max_ddcs() as usize;
        let siggen = tokio::sync::Mutex::new(SignalGenerator::new(
            config.tone_hz,
            config.noise_level,
            max_ddcs,
        ));
        let echo = config
            .echo_enabled
            .then(|| tokio::sync::Mutex::new(EchoBuffer::new(state.sample_rate())));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state,
                siggen,
                echo,
                general,
                rx_specific,
                tx_specific,
                high_priority,
                tx_audio,
                tx_iq,
                ddc_socks,
                peer: std::sync::Mutex::new(None),
                streams: std::sync::Mutex::new(Vec::new()),
                ddc0_samples: AtomicU64::new(0),
            }),
        })
    }

    /// Serve until the surrounding task is dropped. Stream tasks spawned by
    /// run commands are aborted when this future goes away.
    pub async fn run(self) -> Result<()> {
        let inner = self.inner;
        tracing::info!(
            radio = %inner.config.hw,
            ddcs = inner.config.hw.max_ddcs(),
            mac = %format_mac(&inner.config.mac),
            "Protocol 2 server ready"
        );

        let _stop_streams = StreamStopGuard(Arc::clone(&inner));

        let inbound = [
            (PortKind::General, Arc::clone(&inner.general)),
            (PortKind::RxSpecific, Arc::clone(&inner.rx_specific)),
            (PortKind::TxSpecific, Arc::clone(&inner.tx_specific)),
            (PortKind::HighPriority, Arc::clone(&inner.high_priority)),
            (PortKind::TxAudio, Arc::clone(&inner.tx_audio)),
            (PortKind::TxIq, Arc::clone(&inner.tx_iq)),
        ];

        let mut tasks = JoinSet::new();
        for (kind, socket) in inbound {
            let inner = Arc::clone(&inner);
            tasks.spawn(async move {
                let mut buf = [0u8; 2048];
                loop {
                    match socket.recv_from(&mut buf).await {
                        Ok((len, addr)) => inner.handle(kind, &buf[..len], addr).await,
                        Err(e) => tracing::warn!(port = ?kind, error = %e, "recv failed"),
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }
}

/// Aborts the stream tasks when the server's run future is dropped.
struct StreamStopGuard(Arc<Inner>);

impl Drop for StreamStopGuard {
    fn drop(&mut self) {
        self.0.stop_streaming();
    }
}

impl Inner {
    async fn handle(self: &Arc<Self>, kind: PortKind, data: &[u8], addr: SocketAddr) {
        match kind {
            PortKind::General => self.handle_general(data, addr).await,
            PortKind::RxSpecific => self.handle_rx_specific(data, addr),
            PortKind::TxSpecific => self.handle_tx_specific(data, addr),
            PortKind::HighPriority => self.handle_high_priority(data, addr).await,
            PortKind::TxAudio => self.handle_tx_audio(data),
            PortKind::TxIq => self.handle_tx_iq(data).await,
        }
    }

    fn set_peer(&self, addr: SocketAddr) {
        let mut peer = match self.peer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *peer != Some(addr) {
            tracing::info!(peer = %addr, "host address updated");
            *peer = Some(addr);
        }
    }

    fn peer(&self) -> Option<SocketAddr> {
        match self.peer.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn handle_general(self: &Arc<Self>, data: &[u8], addr: SocketAddr) {
        if data.len() < 5 {
            tracing::debug!(len = data.len(), "short general packet");
            return;
        }
        match data[4] {
            0x02 => {
                tracing::info!(from = %addr, "discovery request");
                let reply = build_discovery_reply(&self.config);
                if let Err(e) = self.general.send_to(&reply, addr).await {
                    tracing::warn!(error = %e, "discovery reply send failed");
                }
            }
            0x00 => {
                tracing::debug!(from = %addr, "general configuration");
                self.set_peer(addr);
            }
            other => {
                tracing::debug!(kind = other, "unrecognized general packet");
            }
        }
    }

    fn handle_rx_specific(&self, data: &[u8], addr: SocketAddr) {
        let cmd = match parse_rx_specific(data) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::debug!(error = %e, "dropping rx-specific packet");
                return;
            }
        };
        self.set_peer(addr);

        let enabled = cmd.enabled_mask.count_ones() as u8;
        if enabled > 0 {
            self.state.set_n_active_ddc(enabled);
        }

        // DDC 0's rate drives the whole stream; other slots are accepted
        // for wire compatibility.
        if cmd.rates_khz[0] > 0 {
            self.state.set_sample_rate(u32::from(cmd.rates_khz[0]) * 1000);
        }
    }

    fn handle_tx_specific(&self, data: &[u8], addr: SocketAddr) {
        tracing::debug!(from = %addr, len = data.len(), "tx-specific configuration");
        self.set_peer(addr);
    }

    async fn handle_high_priority(self: &Arc<Self>, data: &[u8], addr: SocketAddr) {
        let cmd = match parse_high_priority(data) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::debug!(error = %e, "dropping high-priority packet");
                return;
            }
        };
        self.set_peer(addr);

        if self.state.set_ptt(cmd.ptt) != cmd.ptt {
            tracing::info!(ptt = cmd.ptt, "PTT changed");
            if !cmd.ptt {
                if let Some(echo) = &self.echo {
                    echo.lock().await.commit();
                }
            }
        }

        for (ddc, &freq) in cmd.rx_freqs.iter().enumerate() {
            if freq > 0 {
                self.state.set_rx_freq(ddc, freq);
            }
        }
        if cmd.tx_freq > 0 {
            self.state.set_tx_freq(cmd.tx_freq);
        }
        if let Some(drive) = cmd.tx_drive {
            self.state.set_tx_drive(drive);
        }

        let was_running = self.state.set_running(cmd.run);
        if cmd.run && !was_running {
            tracing::info!("run asserted, starting streams");
            self.start_streaming();
        } else if !cmd.run && was_running {
            tracing::info!("run deasserted, stopping streams");
            self.stop_streaming();
        }
    }

    fn handle_tx_audio(&self, data: &[u8]) {
        tracing::debug!(len = data.len(), "tx audio discarded");
    }

    /// TX IQ feeds the echo recorder while PTT is held in echo mode.
    async fn handle_tx_iq(&self, data: &[u8]) {
        let Some(echo) = &self.echo else {
            tracing::debug!(len = data.len(), "tx IQ discarded");
            return;
        };
        if !self.state.ptt() || data.len() <= 4 {
            return;
        }
        let samples = unpack_iq24(&data[4..]);
        echo.lock().await.record(&samples, self.state.tx_freq());
    }

    fn start_streaming(self: &Arc<Self>) {
        self.stop_streaming();

        let nddc = self.state.n_active_ddc();
        let mut streams = match self.streams.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        streams.push(tokio::spawn(hp_status_loop(Arc::clone(self))));
        for ddc in 0..nddc {
            streams.push(tokio::spawn(ddc_iq_loop(Arc::clone(self), ddc)));
        }
        streams.push(tokio::spawn(mic_loop(Arc::clone(self))));
        tracing::info!(tasks = streams.len(), nddc, "stream tasks started");
    }

    fn stop_streaming(&self) {
        let mut streams = match self.streams.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handle in streams.drain(..) {
            handle.abort();
        }
    }

    async fn send_from(&self, socket: &UdpSocket, packet: &[u8]) {
        if let Some(peer) = self.peer() {
            if let Err(e) = socket.send_to(packet, peer).await {
                tracing::warn!(error = %e, "stream send failed; dropping packet");
            }
        }
    }
}

/// One DDC's IQ stream, sent from source port base+11+d.
async fn ddc_iq_loop(inner: Arc<Inner>, ddc: u8) {
    let Some(socket) = inner.ddc_socks.get(ddc as usize).map(Arc::clone) else {
        tracing::warn!(ddc, "no socket for DDC stream");
        return;
    };
    tracing::info!(ddc, "DDC IQ stream started");

    let mut seq: u32 = 0;
    let mut packet = [0u8; DDC_PACKET_SIZE];
    let mut scratch = [Complex64::new(0.0, 0.0); SAMPLES_PER_DDC_PACKET];

    let mut rate = inner.state.sample_rate();
    let mut interval = stream_interval(SAMPLES_PER_DDC_PACKET, rate);

    while inner.state.running() {
        interval.tick().await;

        let now = inner.state.sample_rate();
        if now != rate {
            rate = now;
            interval = stream_interval(SAMPLES_PER_DDC_PACKET, rate);
        }

        // DDC 0 replays the echo once a burst is committed; everything
        // else carries the generator tone.
        let mut from_echo = false;
        if ddc == 0 {
            if let Some(echo) = &inner.echo {
                let mut echo = echo.lock().await;
                if echo.has_playback() {
                    echo.read_into(&mut scratch, inner.state.rx_freq(0), rate);
                    from_echo = true;
                }
            }
        }
        if !from_echo {
            inner
                .siggen
                .lock()
                .await
                .generate_into(&mut scratch, ddc as usize, rate);
        }

        let timestamp = if ddc == 0 {
            inner
                .ddc0_samples
                .fetch_add(SAMPLES_PER_DDC_PACKET as u64, Ordering::Relaxed)
        } else {
            inner.ddc0_samples.load(Ordering::Relaxed)
        };

        write_ddc_header(&mut packet, seq, timestamp);
        let mut off = DDC_HEADER_SIZE;
        for sample in &scratch {
            off = pack_iq24(&mut packet, off, *sample);
        }
        seq = seq.wrapping_add(1);

        inner.send_from(&socket, &packet).await;
    }
    tracing::info!(ddc, "DDC IQ stream stopped");
}

/// 10 Hz high-priority status, sent from the RX-specific source port.
async fn hp_status_loop(inner: Arc<Inner>) {
    let mut seq: u32 = 0;
    let mut packet = [0u8; HP_STATUS_SIZE];
    let mut interval = tokio::time::interval(HP_STATUS_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while inner.state.running() {
        interval.tick().await;
        build_hp_status(&mut packet, seq, inner.state.ptt(), inner.state.tx_drive());
        seq = seq.wrapping_add(1);
        inner.send_from(&inner.rx_specific, &packet).await;
    }
}

/// 48 kHz mic silence in 64-sample frames, from the TX-specific port.
async fn mic_loop(inner: Arc<Inner>) {
    let mut seq: u32 = 0;
    let mut packet = [0u8; MIC_PACKET_SIZE];
    let mut interval = stream_interval(SAMPLES_PER_MIC_PACKET, MIC_SAMPLE_RATE);

    while inner.state.running() {
        interval.tick().await;
        build_mic_frame(&mut packet, seq);
        seq = seq.wrapping_add(1);
        inner.send_from(&inner.tx_specific, &packet).await;
    }
}

/// An interval delivering `samples` worth of wall-clock time per tick,
/// skipping ticks instead of bursting when the task falls behind.
fn stream_interval(samples: usize, sample_rate: u32) -> tokio::time::Interval {
    let mut interval =
        tokio::time::interval(Duration::from_secs_f64(samples as f64 / sample_rate as f64));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
