use rand::Rng;
use rand::seq::index;
use tracing::instrument;

/// Draws a value uniformly from `[lo, hi)`.
pub fn uniform_between<R: Rng + ?Sized>(lo: f64, hi: f64, rng: &mut R) -> f64 {
    lo + rng.r#gen::<f64>() * (hi - lo)
}

/// Linear-interpolation quantile of `values` at `q` in `[0, 1]`; `None` for an empty slice.
///
/// Values are ordered with IEEE total ordering, so NaN inputs sort last instead of panicking.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Picks `min(amount, len)` distinct indices in `0..len`, uniformly without replacement.
#[instrument(level = "trace", skip(rng))]
pub fn sample_indices<R: Rng + ?Sized>(len: usize, amount: usize, rng: &mut R) -> Vec<usize> {
    index::sample(rng, len, amount.min(len)).into_vec()
}
