/// Root-mean-square level of a block of samples, normalized to 0.0..=1.0
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();

    (sum / samples.len() as f64).sqrt() as f32
}

/// Whether a block carries audible sound at the given RMS threshold
pub fn has_activity(samples: &[i16], threshold: f32) -> bool {
    rms(samples) >= threshold
}
