//! Wire codecs for IQ and mic samples.
//!
//! Both HPSDR protocols carry receive IQ as 24-bit signed big-endian
//! integers, three bytes of I followed by three bytes of Q. The packers
//! write into caller-provided buffers so the frame producers never allocate
//! per sample.

use num_complex::Complex64;

/// Full-scale value for a 24-bit signed sample (2^23 - 1).
const FULL_SCALE_24: f64 = 8_388_607.0;

/// Pack one IQ sample as 24-bit signed big-endian I then Q (6 bytes).
///
/// Values are scaled by 2^23 - 1 and clamped to [-2^23, 2^23 - 1]; overflow
/// clamps, never wraps. Returns the offset just past the written bytes.
#[inline]
pub fn pack_iq24(buf: &mut [u8], offset: usize, sample: Complex64) -> usize {
    let i = (sample.re * FULL_SCALE_24).clamp(-8_388_608.0, 8_388_607.0) as i32;
    let q = (sample.im * FULL_SCALE_24).clamp(-8_388_608.0, 8_388_607.0) as i32;
    let iu = i as u32;
    let qu = q as u32;
    buf[offset] = (iu >> 16) as u8;
    buf[offset + 1] = (iu >> 8) as u8;
    buf[offset + 2] = iu as u8;
    buf[offset + 3] = (qu >> 16) as u8;
    buf[offset + 4] = (qu >> 8) as u8;
    buf[offset + 5] = qu as u8;
    offset + 6
}

/// Unpack 24-bit big-endian IQ data (6 bytes per sample).
///
/// Sign extension places each 24-bit value in the high bits of an i32 which
/// is then divided by 2^31, so full scale maps back to just under 1.0.
/// Trailing bytes short of a full sample are ignored.
pub fn unpack_iq24(data: &[u8]) -> Vec<Complex64> {
    let n = data.len() / 6;
    let mut samples = Vec::with_capacity(n);
    for k in 0..n {
        let off = k * 6;
        let i = i32::from_be_bytes([data[off], data[off + 1], data[off + 2], 0]);
        let q = i32::from_be_bytes([data[off + 3], data[off + 4], data[off + 5], 0]);
        samples.push(Complex64::new(
            i as f64 / 2_147_483_648.0,
            q as f64 / 2_147_483_648.0,
        ));
    }
    samples
}

/// Pack one 16-bit mic sample big-endian. Returns the offset past it.
#[inline]
pub fn pack_mic16(buf: &mut [u8], offset: usize, v: i16) -> usize {
    buf[offset..offset + 2].copy_from_slice(&v.to_be_bytes());
    offset + 2
}

/// Unpack Protocol 1 host TX data into IQ samples.
///
/// Each 8-byte block is `[L(2) R(2) I(2) Q(2)]`, all big-endian signed; the
/// left/right audio halves are discarded and I/Q are scaled by 1/32768.
pub fn unpack_tx_iq16(data: &[u8]) -> Vec<Complex64> {
    let n = data.len() / 8;
    let mut samples = Vec::with_capacity(n);
    for k in 0..n {
        let off = k * 8;
        let i = i16::from_be_bytes([data[off + 4], data[off + 5]]);
        let q = i16::from_be_bytes([data[off + 6], data[off + 7]]);
        samples.push(Complex64::new(i as f64 / 32_768.0, q as f64 / 32_768.0));
    }
    samples
}
