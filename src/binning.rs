//! Histogramming events into images and spectra.

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

use crate::{events::EventList, wcs::TanProjection, EventError};

/// Events binned onto a square pixel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHistogram {
    /// Counts per pixel, indexed `[[y, x]]` (0-indexed).
    pub counts: Array2<u64>,

    /// The number of events that fell outside the grid.
    pub num_outside: usize,
}

/// Project every event to pixel coordinates.
pub(crate) fn project_events(
    events: &EventList,
    projection: &TanProjection,
) -> (Vec<f64>, Vec<f64>) {
    events
        .sky_x()
        .par_iter()
        .zip(events.sky_y().par_iter())
        .map(|(&ra, &dec)| projection.world_to_pixel(ra, dec))
        .unzip()
}

/// Is the (1-indexed) pixel coordinate `p` on an `nx`-pixel axis? NaNs are
/// not.
pub(crate) fn in_field(p: f64, nx: usize) -> bool {
    (0.5..=nx as f64 + 0.5).contains(&p)
}

/// The 0-indexed pixel containing the in-field coordinate `p`. The upper edge
/// of the grid belongs to the last pixel.
fn pixel_index(p: f64, nx: usize) -> usize {
    ((p - 0.5).floor() as usize).min(nx - 1)
}

/// Bin the events of this partition onto the `nx` × `nx` grid of
/// `projection`. Only events with `emin < energy < emax` are binned (a missing
/// bound doesn't restrict that side). Events off the grid are counted, not
/// binned.
pub fn bin_image(
    events: &EventList,
    projection: &TanProjection,
    nx: usize,
    emin: Option<f64>,
    emax: Option<f64>,
) -> ImageHistogram {
    let (xx, yy) = project_events(events, projection);
    let mask = events.energy_mask(emin, emax);

    let mut counts = Array2::zeros((nx, nx));
    let mut num_outside = 0;
    for ((&x, &y), keep) in xx.iter().zip(yy.iter()).zip(mask) {
        if !keep {
            continue;
        }
        if in_field(x, nx) && in_field(y, nx) {
            counts[[pixel_index(y, nx), pixel_index(x, nx)]] += 1;
        } else {
            num_outside += 1;
        }
    }
    debug!(
        "Binned {} events onto a {nx}x{nx} grid",
        counts.iter().sum::<u64>()
    );
    if num_outside > 0 {
        info!("Threw out {num_outside} events because they fell outside the field of view.");
    }

    ImageHistogram {
        counts,
        num_outside,
    }
}

/// Histogram `energies` into `nchan` equal-width channels spanning
/// `[emin, emax]`. Channels are half-open (`[lo, hi)`) except the last, which
/// also takes `emax`. Energies outside the band are ignored.
pub fn bin_spectrum(
    energies: &[f64],
    emin: f64,
    emax: f64,
    nchan: usize,
) -> Result<Vec<u64>, EventError> {
    check_spectral_binning(emin, emax, nchan)?;

    let mut counts = vec![0; nchan];
    let scale = nchan as f64 / (emax - emin);
    for &e in energies {
        if !(emin..=emax).contains(&e) {
            continue;
        }
        let i = (((e - emin) * scale).floor() as usize).min(nchan - 1);
        counts[i] += 1;
    }
    Ok(counts)
}

/// The centre of each channel used by [`bin_spectrum`] \[keV\].
pub fn channel_centers(emin: f64, emax: f64, nchan: usize) -> Vec<f64> {
    let width = (emax - emin) / nchan as f64;
    (0..nchan)
        .map(|i| emin + (i as f64 + 0.5) * width)
        .collect()
}

pub(crate) fn check_spectral_binning(emin: f64, emax: f64, nchan: usize) -> Result<(), EventError> {
    if nchan == 0 {
        return Err(EventError::InvalidBinning(
            "a spectrum needs at least one channel".to_string(),
        ));
    }
    if !(emin.is_finite() && emax.is_finite() && emax > emin) {
        return Err(EventError::InvalidBinning(format!(
            "the energy band {emin}..{emax} keV is empty"
        )));
    }
    Ok(())
}
