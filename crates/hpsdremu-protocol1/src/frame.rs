//! Protocol 1 (Metis) wire format.
//!
//! Pure byte-layout code with no I/O: discovery replies, host control-word
//! decoding, and the 1032-byte outbound data packet. All multi-byte fields
//! are big-endian.
//!
//! A data packet is `EF FE 01 <endpoint>` + 32-bit sequence + two 512-byte
//! sub-frames. Each sub-frame is `7F 7F 7F` sync, five control bytes
//! (C0-C4), and 504 bytes of interleaved sample payload.

use num_complex::Complex64;

use hpsdremu_core::codec::{pack_iq24, pack_mic16};
use hpsdremu_core::config::{
    RadioConfig, FIRMWARE_VERSION, MERCURY_VERSIONS, METIS_VERSION, PENNY_VERSION,
};
use hpsdremu_core::state::{code_to_rate, RadioState};

/// Well-known Protocol 1 UDP port.
pub const DEFAULT_PORT: u16 = 1024;

/// Outbound data packet size.
pub const PACKET_SIZE: usize = 1032;

/// Size of each of the two sub-frames.
pub const SUBFRAME_SIZE: usize = 512;

/// Byte offsets of the two sub-frames inside a data packet.
pub const SUBFRAME_OFFSETS: [usize; 2] = [8, 520];

/// Sample payload bytes per sub-frame.
pub const PAYLOAD_SIZE: usize = 504;

/// Sub-frame sync marker.
pub const SYNC: [u8; 3] = [0x7F, 0x7F, 0x7F];

/// Discovery reply length (padded with trailing zeros).
pub const DISCOVERY_REPLY_SIZE: usize = 60;

/// USB-style endpoint carried in the data packet header.
const ENDPOINT: u8 = 0x06;

/// Nominal supply-voltage telemetry reading.
const NOMINAL_SUPPLY: u16 = 3200;

/// Samples per DDC per sub-frame for a given active DDC count.
///
/// Each payload row carries `6 * nddc` IQ bytes plus a 2-byte mic sample.
pub fn samples_per_subframe(nddc: usize) -> usize {
    PAYLOAD_SIZE / (6 * nddc + 2)
}

/// Build the 60-byte discovery reply.
///
/// Byte 2 is `0x02` when idle, `0x03` while streaming. The remainder of the
/// layout: MAC at 3..9, firmware code at 9, board code at 10, protocol
/// version 0 at 11, Mercury versions at 14..18, Penny at 18, Metis at 19,
/// DDC count at 20, everything else zero.
pub fn build_discovery_reply(config: &RadioConfig, streaming: bool) -> [u8; DISCOVERY_REPLY_SIZE] {
    let mut buf = [0u8; DISCOVERY_REPLY_SIZE];
    buf[0] = 0xEF;
    buf[1] = 0xFE;
    buf[2] = if streaming { 0x03 } else { 0x02 };
    buf[3..9].copy_from_slice(&config.mac);
    buf[9] = FIRMWARE_VERSION;
    buf[10] = config.hw.board_code();
    buf[11] = 0; // protocol version 0
    buf[14..18].copy_from_slice(&MERCURY_VERSIONS);
    buf[18] = PENNY_VERSION;
    buf[19] = METIS_VERSION;
    buf[20] = config.hw.max_ddcs();
    buf
}

/// A decoded 5-byte host control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWord {
    /// PTT bit (C0 bit 0).
    pub ptt: bool,
    /// Command address (C0 with the PTT bit masked off).
    pub addr: u8,
    /// C1..C4 payload bytes.
    pub c: [u8; 4],
}

/// Extract the control word from a 512-byte sub-frame, if the sync marker
/// is present.
pub fn parse_control_word(subframe: &[u8]) -> Option<ControlWord> {
    if subframe.len() < 8 || subframe[0..3] != SYNC {
        return None;
    }
    Some(ControlWord {
        ptt: subframe[3] & 0x01 != 0,
        addr: subframe[3] & 0xFE,
        c: [subframe[4], subframe[5], subframe[6], subframe[7]],
    })
}

/// Apply a host control word to the radio state.
///
/// Addresses outside the handled set are legal; they are logged at debug
/// and mutate nothing. RX-frequency addresses targeting DDCs the board does
/// not have are accepted and ignored.
pub fn apply_control_word(state: &RadioState, cw: &ControlWord) {
    match cw.addr {
        0x00 => {
            if let Some(rate) = code_to_rate(cw.c[0] & 0x03) {
                state.set_sample_rate(rate);
            }
            // C4 bits [5:3] carry (active DDC count - 1).
            state.set_n_active_ddc(((cw.c[3] >> 3) & 0x07) + 1);
        }
        0x02 => {
            state.set_tx_freq(u32::from_be_bytes(cw.c));
        }
        addr if (0x04..0x12).contains(&addr) && addr % 2 == 0 => {
            let ddc = ((addr - 0x04) / 2) as usize;
            let freq = u32::from_be_bytes(cw.c);
            if ddc < state.hw().max_ddcs() as usize {
                state.set_rx_freq(ddc, freq);
            } else {
                tracing::debug!(ddc, freq, "RX frequency for absent DDC ignored");
            }
        }
        0x12 => {
            state.set_tx_drive(cw.c[0]);
        }
        addr => {
            tracing::debug!(addr = format_args!("0x{addr:02X}"), "unhandled control address");
        }
    }
}

/// Build the 5-byte control response for one telemetry address.
///
/// C0 is `addr | 0x80 | ptt`; hosts mask with `0x7E` to recover the
/// address. During TX the power registers carry synthetic values derived
/// from the drive level; during RX everything reads zero except the supply
/// voltage, which is pinned at a nominal value.
pub fn control_response(addr: u8, ptt: bool, tx_drive: u8) -> [u8; 5] {
    let mut ctrl = [0u8; 5];
    ctrl[0] = addr | 0x80 | u8::from(ptt);

    let drive = tx_drive as u16;
    match addr {
        0x00 => {
            // ADC overflow (none), firmware and Penny versions.
            ctrl[1] = 0x00;
            ctrl[2] = FIRMWARE_VERSION;
            ctrl[3] = PENNY_VERSION;
        }
        0x08 => {
            // Exciter power (AIN5), forward power (AIN1).
            if ptt {
                let exciter = drive * 10;
                let forward = (drive * drive) >> 4;
                ctrl[1..3].copy_from_slice(&exciter.to_be_bytes());
                ctrl[3..5].copy_from_slice(&forward.to_be_bytes());
            }
        }
        0x10 => {
            // Reverse power (AIN2), PA volts (AIN3).
            if ptt {
                let forward = (drive * drive) >> 4;
                let reverse = (forward / 50).max(1);
                ctrl[1..3].copy_from_slice(&reverse.to_be_bytes());
                ctrl[3..5].copy_from_slice(&NOMINAL_SUPPLY.to_be_bytes());
            }
        }
        0x18 => {
            // PA current (AIN4), supply volts (AIN6).
            if ptt {
                let pa_current = drive * 5;
                ctrl[1..3].copy_from_slice(&pa_current.to_be_bytes());
            }
            ctrl[3..5].copy_from_slice(&NOMINAL_SUPPLY.to_be_bytes());
        }
        _ => {}
    }
    ctrl
}

/// Write the 8-byte data packet header: magic, endpoint, sequence.
pub fn write_packet_header(packet: &mut [u8], seq: u32) {
    packet[0] = 0xEF;
    packet[1] = 0xFE;
    packet[2] = 0x01;
    packet[3] = ENDPOINT;
    packet[4..8].copy_from_slice(&seq.to_be_bytes());
}

/// Fill one 512-byte sub-frame: sync, control response, interleaved payload.
///
/// `samples` holds `nddc` contiguous runs of `spr` samples (DDC 0 first).
/// Rows of `[I Q] x nddc + mic(2)` are written `spr` times; the unused tail
/// of the payload is zeroed, and the mic channel is silence.
pub fn fill_subframe(
    subframe: &mut [u8],
    ctrl: &[u8; 5],
    samples: &[Complex64],
    nddc: usize,
    spr: usize,
) {
    debug_assert_eq!(subframe.len(), SUBFRAME_SIZE);
    debug_assert_eq!(samples.len(), nddc * spr);

    subframe[0..3].copy_from_slice(&SYNC);
    subframe[3..8].copy_from_slice(ctrl);

    let mut off = 8;
    for row in 0..spr {
        for ddc in 0..nddc {
            off = pack_iq24(subframe, off, samples[ddc * spr + row]);
        }
        off = pack_mic16(subframe, off, 0);
    }
    subframe[off..].fill(0);
}
