//! 2-D wavelet transform for PIZ (spec section 4.6).
//!
//! Two distinct lifting steps, chosen by block value range: `wdec14`/
//! `wenc14` sign-extend each 16-bit word to a signed value before the
//! lift so the `hi >> 1` term is an arithmetic (sign-aware) shift, and
//! `wdec16`/`wenc16` zero-extend instead, so the same term is a logical
//! shift over the full unsigned range. These give different bit patterns
//! whenever the high bit of `hi` is set, so one cannot stand in for the
//! other — the 14-bit path is only bit-exact for blocks whose values
//! stay within the signed 14-bit range, which is exactly why the codec
//! picks between them by `max_value`.

/// One level of the reversible pairwise lift, forward direction, with
/// `hi`'s shift done as a logical (zero-extended) shift — `wenc16`.
#[inline]
fn lift_forward16(a: u16, b: u16) -> (u16, u16) {
    let hi = a.wrapping_sub(b);
    let ls = a.wrapping_sub(hi & 1).wrapping_sub(hi >> 1);
    (ls, hi)
}

/// Inverse of [`lift_forward16`] — `wdec16`.
#[inline]
fn lift_inverse16(ls: u16, hi: u16) -> (u16, u16) {
    let ai = ls.wrapping_add(hi & 1).wrapping_add(hi >> 1);
    let b = ai.wrapping_sub(hi);
    (ai, b)
}

/// Forward lift with `hi`'s shift done as an arithmetic (sign-extended)
/// shift — `wenc14`. Exact only while `a`, `b` stay within the signed
/// 14-bit range; the caller (the codec's `max_value` check) guarantees
/// that before selecting this path.
#[inline]
fn lift_forward14(a: u16, b: u16) -> (u16, u16) {
    let as_ = (a as i16) as i32;
    let bs = (b as i16) as i32;
    let ms = (as_ + bs) >> 1;
    let ds = as_ - bs;
    (ms as i16 as u16, ds as i16 as u16)
}

/// Inverse of [`lift_forward14`] — `wdec14`.
#[inline]
fn lift_inverse14(ls: u16, hi: u16) -> (u16, u16) {
    let ls = (ls as i16) as i32;
    let hs = (hi as i16) as i32;
    let ai = ls + (hs & 1) + (hs >> 1);
    let as_ = ai as i16 as u16;
    let bs = (ai - hs) as i16 as u16;
    (as_, bs)
}

/// Full multi-level 1-D wavelet decomposition: recursively pairs adjacent
/// samples, halving the transform domain each level (the "power-of-two
/// pyramid" of spec section 9), carrying an odd leftover sample through
/// unchanged at each level.
fn forward_1d_with(x: &mut [u16], lift: fn(u16, u16) -> (u16, u16)) {
    let n = x.len();
    if n < 2 {
        return;
    }
    let mut buf = x.to_vec();
    let mut len = n;
    while len > 1 {
        let half = len / 2;
        let odd = len % 2;
        let approx_len = half + odd;
        let mut tmp = vec![0u16; len];
        for i in 0..half {
            let (ls, hi) = lift(buf[2 * i], buf[2 * i + 1]);
            tmp[i] = ls;
            tmp[approx_len + i] = hi;
        }
        if odd == 1 {
            tmp[half] = buf[len - 1];
        }
        buf[..len].copy_from_slice(&tmp);
        len = approx_len;
    }
    x.copy_from_slice(&buf);
}

/// Inverse of [`forward_1d_with`].
fn inverse_1d_with(x: &mut [u16], lift_inv: fn(u16, u16) -> (u16, u16)) {
    let n = x.len();
    if n < 2 {
        return;
    }
    let mut lengths = vec![n];
    let mut len = n;
    while len > 1 {
        let half = len / 2;
        len = half + (len % 2);
        lengths.push(len);
    }

    let mut buf = x.to_vec();
    for idx in (0..lengths.len() - 1).rev() {
        let cur_len = lengths[idx];
        let half = cur_len / 2;
        let odd = cur_len % 2;
        let approx_len = half + odd;
        let mut tmp = vec![0u16; cur_len];
        for i in 0..half {
            let (a, b) = lift_inv(buf[i], buf[approx_len + i]);
            tmp[2 * i] = a;
            tmp[2 * i + 1] = b;
        }
        if odd == 1 {
            tmp[cur_len - 1] = buf[half];
        }
        buf[..cur_len].copy_from_slice(&tmp);
    }
    x.copy_from_slice(&buf[..n]);
}

pub fn forward_1d(x: &mut [u16]) {
    forward_1d_with(x, lift_forward16)
}

pub fn inverse_1d(x: &mut [u16]) {
    inverse_1d_with(x, lift_inverse16)
}

/// Separable 2-D forward transform: rows, then columns.
fn wenc_with(data: &mut [u16], width: usize, height: usize, lift: fn(u16, u16) -> (u16, u16)) {
    for row in data.chunks_exact_mut(width) {
        forward_1d_with(row, lift);
    }
    let mut col = vec![0u16; height];
    for x in 0..width {
        for y in 0..height {
            col[y] = data[y * width + x];
        }
        forward_1d_with(&mut col, lift);
        for y in 0..height {
            data[y * width + x] = col[y];
        }
    }
}

/// Inverse of [`wenc_with`]: undo columns, then rows (transforms were
/// composed rows-then-columns, so inversion undoes in the opposite order).
fn wdec_with(data: &mut [u16], width: usize, height: usize, lift_inv: fn(u16, u16) -> (u16, u16)) {
    let mut col = vec![0u16; height];
    for x in 0..width {
        for y in 0..height {
            col[y] = data[y * width + x];
        }
        inverse_1d_with(&mut col, lift_inv);
        for y in 0..height {
            data[y * width + x] = col[y];
        }
    }
    for row in data.chunks_exact_mut(width) {
        inverse_1d_with(row, lift_inv);
    }
}

/// Unsigned 16-bit modular lift, for blocks whose values can exceed the
/// signed 14-bit range.
pub fn wenc16(data: &mut [u16], width: usize, height: usize) {
    wenc_with(data, width, height, lift_forward16)
}

/// Inverse of [`wenc16`].
pub fn wdec16(data: &mut [u16], width: usize, height: usize) {
    wdec_with(data, width, height, lift_inverse16)
}

/// Signed 14-bit lift, for blocks whose `max_value < 1 << 14`.
pub fn wenc14(data: &mut [u16], width: usize, height: usize) {
    wenc_with(data, width, height, lift_forward14)
}

/// Inverse of [`wenc14`].
pub fn wdec14(data: &mut [u16], width: usize, height: usize) {
    wdec_with(data, width, height, lift_inverse14)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lift16_round_trips() {
        for a in [0u16, 1, 255, 32768, 65535] {
            for b in [0u16, 17, 4096, 65535] {
                let (ls, hi) = lift_forward16(a, b);
                let (a2, b2) = lift_inverse16(ls, hi);
                assert_eq!((a, b), (a2, b2));
            }
        }
    }

    #[test]
    fn lift14_round_trips_within_signed_range() {
        for a in [0u16, 1, 255, 8191, 16383] {
            for b in [0u16, 17, 4096, 16383] {
                let (ls, hi) = lift_forward14(a, b);
                let (a2, b2) = lift_inverse14(ls, hi);
                assert_eq!((a, b), (a2, b2));
            }
        }
    }

    #[test]
    fn lift14_and_lift16_diverge_on_high_bit_hi() {
        // `hi`'s top bit is set here, so the 14-bit path's arithmetic
        // shift and the 16-bit path's logical shift must disagree on
        // `hi >> 1`, proving the two are not aliases of one another.
        let ls = 20100u16;
        let hi = 40000u16;
        assert_ne!(
            lift_inverse14(ls, hi),
            lift_inverse16(ls, hi),
            "signed and unsigned shifts must reconstruct differently here"
        );
    }

    #[test]
    fn one_d_round_trips_various_lengths() {
        for n in [0usize, 1, 2, 3, 4, 5, 7, 16, 17, 100] {
            let original: Vec<u16> = (0..n).map(|i| (i * 4099 + 7) as u16).collect();
            let mut buf = original.clone();
            forward_1d(&mut buf);
            inverse_1d(&mut buf);
            assert_eq!(buf, original, "n={n}");
        }
    }

    #[test]
    fn two_d_round_trips() {
        let width = 13;
        let height = 9;
        let original: Vec<u16> = (0..width * height).map(|i| (i * 997 + 3) as u16).collect();
        let mut buf = original.clone();
        wenc16(&mut buf, width, height);
        wdec16(&mut buf, width, height);
        assert_eq!(buf, original);
    }

    #[test]
    fn two_d_round_trips_non_power_of_two_rectangle() {
        let width = 31;
        let height = 5;
        let original: Vec<u16> = (0..width * height)
            .map(|i| ((i * 12345) % 65536) as u16)
            .collect();
        let mut buf = original.clone();
        wenc16(&mut buf, width, height);
        wdec16(&mut buf, width, height);
        assert_eq!(buf, original);
    }

    #[test]
    fn two_d_round_trips_14_bit_range() {
        let width = 11;
        let height = 7;
        let original: Vec<u16> = (0..width * height).map(|i| ((i * 131) % (1 << 14)) as u16).collect();
        let mut buf = original.clone();
        wenc14(&mut buf, width, height);
        wdec14(&mut buf, width, height);
        assert_eq!(buf, original);
    }
}
