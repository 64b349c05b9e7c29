//! Protocol 2 (direct Ethernet) wire format.
//!
//! Pure byte-layout code with no I/O. Protocol 2 spreads the radio over
//! several UDP ports, so unlike Protocol 1 there is no framing magic; each
//! port carries exactly one packet shape. All multi-byte fields are
//! big-endian.

use hpsdremu_core::config::{
    RadioConfig, FIRMWARE_VERSION, MERCURY_VERSIONS, METIS_VERSION, PENNY_VERSION,
};
use hpsdremu_core::error::{Error, Result};
use hpsdremu_core::state::RX_SLOTS;

/// Discovery reply length.
pub const DISCOVERY_REPLY_SIZE: usize = 60;

/// DDC IQ packet: 16-byte header + 238 six-byte samples.
pub const DDC_PACKET_SIZE: usize = 1444;

/// DDC IQ header length.
pub const DDC_HEADER_SIZE: usize = 16;

/// IQ samples carried per DDC packet.
pub const SAMPLES_PER_DDC_PACKET: usize = 238;

/// Sample width announced in every DDC packet header.
pub const BITS_PER_SAMPLE: u16 = 24;

/// High-priority status packet length.
pub const HP_STATUS_SIZE: usize = 60;

/// Mic frame: 4-byte sequence + 64 16-bit samples.
pub const MIC_PACKET_SIZE: usize = 132;

/// Mic samples per frame.
pub const SAMPLES_PER_MIC_PACKET: usize = 64;

/// The mic stream always runs at 48 kHz regardless of the DDC rate.
pub const MIC_SAMPLE_RATE: u32 = 48_000;

/// Byte offset of the first RX frequency in a high-priority command.
const HP_RX_FREQ_OFFSET: usize = 9;

/// Byte offset of the TX frequency in a high-priority command.
const HP_TX_FREQ_OFFSET: usize = 329;

/// Byte offset of the TX drive level in a high-priority command.
const HP_TX_DRIVE_OFFSET: usize = 345;

/// Byte offset of DDC 0's sample rate in an RX-specific command.
const RX_RATE_OFFSET: usize = 18;

/// Stride between per-DDC fields in an RX-specific command.
const RX_RATE_STRIDE: usize = 6;

/// Build the 60-byte discovery reply.
///
/// Four zero header bytes, status `0x02`, MAC at 5..11, board code at 11,
/// protocol version 1 at 12, firmware at 13, Mercury versions at 14..18,
/// Penny at 18, Metis at 19, DDC count at 20.
pub fn build_discovery_reply(config: &RadioConfig) -> [u8; DISCOVERY_REPLY_SIZE] {
    let mut buf = [0u8; DISCOVERY_REPLY_SIZE];
    buf[4] = 0x02;
    buf[5..11].copy_from_slice(&config.mac);
    buf[11] = config.hw.board_code();
    buf[12] = 1; // protocol version
    buf[13] = FIRMWARE_VERSION;
    buf[14..18].copy_from_slice(&MERCURY_VERSIONS);
    buf[18] = PENNY_VERSION;
    buf[19] = METIS_VERSION;
    buf[20] = config.hw.max_ddcs();
    buf
}

/// A decoded high-priority command (host -> radio, port 1027).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighPriorityCommand {
    /// Run bit: start/stop the outbound streams.
    pub run: bool,
    /// PTT bit.
    pub ptt: bool,
    /// Twelve RX frequency slots; zero means "not set" and is ignored.
    pub rx_freqs: [u32; RX_SLOTS],
    /// TX frequency; zero means "not set".
    pub tx_freq: u32,
    /// TX drive level, when the packet is long enough to carry it.
    pub tx_drive: Option<u8>,
}

/// Decode a high-priority command.
///
/// Hosts send fixed 1444-byte packets, but only the run/PTT byte is
/// strictly required here; frequency and drive fields beyond the datagram
/// length are treated as absent.
pub fn parse_high_priority(data: &[u8]) -> Result<HighPriorityCommand> {
    if data.len() < 5 {
        return Err(Error::MalformedDatagram(format!(
            "high-priority command too short: {} bytes",
            data.len()
        )));
    }

    let run = data[4] & 0x01 != 0;
    let ptt = data[4] & 0x02 != 0;

    let mut rx_freqs = [0u32; RX_SLOTS];
    for (i, freq) in rx_freqs.iter_mut().enumerate() {
        let off = HP_RX_FREQ_OFFSET + i * 4;
        if let Some(bytes) = data.get(off..off + 4) {
            *freq = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
    }

    let tx_freq = data
        .get(HP_TX_FREQ_OFFSET..HP_TX_FREQ_OFFSET + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0);

    let tx_drive = data.get(HP_TX_DRIVE_OFFSET).copied();

    Ok(HighPriorityCommand {
        run,
        ptt,
        rx_freqs,
        tx_freq,
        tx_drive,
    })
}

/// A decoded RX-specific command (host -> radio, port 1025).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxSpecificCommand {
    /// Enabled-receiver bitmask (bit d = DDC d).
    pub enabled_mask: u8,
    /// Per-DDC sample rate in kHz; zero means "not present".
    pub rates_khz: [u16; RX_SLOTS],
}

/// Decode an RX-specific command.
pub fn parse_rx_specific(data: &[u8]) -> Result<RxSpecificCommand> {
    if data.len() < 8 {
        return Err(Error::MalformedDatagram(format!(
            "rx-specific command too short: {} bytes",
            data.len()
        )));
    }

    let enabled_mask = data[7];
    let mut rates_khz = [0u16; RX_SLOTS];
    for (d, rate) in rates_khz.iter_mut().enumerate() {
        let off = RX_RATE_OFFSET + d * RX_RATE_STRIDE;
        if let Some(bytes) = data.get(off..off + 2) {
            *rate = u16::from_be_bytes([bytes[0], bytes[1]]);
        }
    }

    Ok(RxSpecificCommand {
        enabled_mask,
        rates_khz,
    })
}

/// Write the 16-byte DDC IQ packet header.
///
/// Sequence, 64-bit timestamp (DDC 0's running sample count), bits per
/// sample, samples per frame.
pub fn write_ddc_header(packet: &mut [u8], seq: u32, timestamp: u64) {
    packet[0..4].copy_from_slice(&seq.to_be_bytes());
    packet[4..12].copy_from_slice(&timestamp.to_be_bytes());
    packet[12..14].copy_from_slice(&BITS_PER_SAMPLE.to_be_bytes());
    packet[14..16].copy_from_slice(&(SAMPLES_PER_DDC_PACKET as u16).to_be_bytes());
}

/// Build the 60-byte high-priority status packet (radio -> host, 10 Hz).
///
/// Sequence at 0, PTT in byte 4 bit 0, ADC overload byte 5 (always clean),
/// then the synthetic TX power telemetry: exciter at 6..8, forward at
/// 14..16, reverse at 22..24. During RX the power fields are zero.
pub fn build_hp_status(buf: &mut [u8; HP_STATUS_SIZE], seq: u32, ptt: bool, tx_drive: u8) {
    buf.fill(0);
    buf[0..4].copy_from_slice(&seq.to_be_bytes());
    buf[4] = u8::from(ptt);

    if ptt && tx_drive > 0 {
        let drive = tx_drive as u16;
        let exciter = drive * 10;
        let forward = (drive * drive) >> 4;
        let reverse = (forward / 50).max(1);
        buf[6..8].copy_from_slice(&exciter.to_be_bytes());
        buf[14..16].copy_from_slice(&forward.to_be_bytes());
        buf[22..24].copy_from_slice(&reverse.to_be_bytes());
    }
}

/// Build the 132-byte mic frame: sequence plus 64 samples of silence.
pub fn build_mic_frame(buf: &mut [u8; MIC_PACKET_SIZE], seq: u32) {
    buf.fill(0);
    buf[0..4].copy_from_slice(&seq.to_be_bytes());
}
