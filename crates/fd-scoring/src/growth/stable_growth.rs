//! Window-averaged compound growth rate.
//!
//! Single quarters are noisy, so both endpoints are window means:
//!
//! ```text
//! latest = mean(last 3 reported values)
//! base   = mean(5 periods centred 4*years periods before the end)
//! growth = (latest / base)^(1 / actual_years) - 1
//! ```
//!
//! When the base window is too sparse, its centre moves further back one
//! period at a time. Non-positive endpoints make the rate meaningless and are
//! flagged with the sentinel instead.

use crate::config::GrowthConfig;

/// Compound growth of `series` over `years_back` years.
///
/// `series` is ordered oldest first, one entry per reporting period; missing
/// periods are `None` and keep their position. Returns `None` when either
/// endpoint cannot be formed.
pub fn stable_growth(series: &[Option<f64>], years_back: u32, config: &GrowthConfig) -> Option<f64> {
    let latest = latest_mean(series, config.latest_window)?;

    let (base, shift) = base_window(series, years_back, config)?;

    if base > 0.0 && latest > 0.0 {
        let actual_years = elapsed_years(years_back, shift, config).max(1.0);
        Some((latest / base).powf(1.0 / actual_years) - 1.0)
    } else {
        Some(config.sentinel)
    }
}

/// Mean of the last `window` reported values, skipping gaps.
///
/// Undefined when the series holds fewer than `window` values.
fn latest_mean(series: &[Option<f64>], window: usize) -> Option<f64> {
    let present: Vec<f64> = series.iter().flatten().copied().collect();
    if window == 0 || present.len() < window {
        return None;
    }
    let recent = &present[present.len() - window..];
    Some(recent.iter().sum::<f64>() / window as f64)
}

/// First base window, scanning backwards, with enough observations.
///
/// Returns the window mean and the shift that produced it.
fn base_window(series: &[Option<f64>], years_back: u32, config: &GrowthConfig) -> Option<(f64, usize)> {
    let half = config.base_window_half_size;
    let offset = 1 + 4 * years_back as usize;

    for shift in 0..=config.max_center_shift {
        let Some(center) = series.len().checked_sub(offset + shift) else {
            break;
        };
        let Some(start) = center.checked_sub(half) else {
            break;
        };
        let end = (center + half + 1).min(series.len());
        if let Some(mean) = window_mean(&series[start..end], config.min_periods_in_window) {
            return Some((mean, shift));
        }
    }
    None
}

/// Quarters between the latest and base window centres, in years.
fn elapsed_years(years_back: u32, shift: usize, config: &GrowthConfig) -> f64 {
    let latest_center = (config.latest_window as f64 - 1.0) / 2.0;
    let base_center = (4 * years_back as usize + shift) as f64;
    (base_center - latest_center) / 4.0
}

fn window_mean(window: &[Option<f64>], min_periods: usize) -> Option<f64> {
    let present: Vec<f64> = window.iter().flatten().copied().collect();
    if present.is_empty() || present.len() < min_periods {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}
