use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// In-place radix-2 decimation-in-time forward FFT.
///
/// Bit-reversal permutation followed by log2(n) butterfly stages; stage `l`
/// walks sub-blocks of `2^l` points, rotating the twiddle factor by
/// `cos(PI / 2^(l-1)) - i sin(PI / 2^(l-1))` after each butterfly column.
/// `data.len()` must be a power of two.
pub fn fft_in_place(data: &mut [Complex<f64>]) {
    let n = data.len();
    debug_assert!(n.is_power_of_two(), "FFT length {} is not a power of two", n);
    if n < 2 {
        return;
    }

    let stages = n.trailing_zeros();
    let shift = usize::BITS - stages;

    for i in 1..n - 1 {
        let j = i.reverse_bits() >> shift;
        if i < j {
            data.swap(i, j);
        }
    }

    for l in 1..=stages {
        let block = 1usize << l;
        let half = block / 2;
        let angle = PI / half as f64;
        let rotation = Complex::new(angle.cos(), -angle.sin());
        let mut twiddle = Complex::new(1.0, 0.0);

        for j in 0..half {
            for i in (j..n).step_by(block) {
                let ip = i + half;
                let t = data[ip] * twiddle;
                data[ip] = data[i] - t;
                data[i] += t;
            }
            twiddle *= rotation;
        }
    }
}
