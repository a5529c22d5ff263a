//! Writing event lists and the products derived from them.
//!
//! Every writer is a collective call: all ranks must call it with the same
//! arguments. The data are combined on the root rank, which alone touches the
//! filesystem, and every rank waits at a barrier until the file is done.

mod event_file;
mod h5;
mod image;
mod simput;
mod spectrum;

pub(crate) use simput::{check_simput_targets, write_photon_list};

use std::path::{Path, PathBuf};

use hifitime::Epoch;
use log::warn;

use crate::{
    wcs::{ProjectionError, RADec, TanProjection},
    EventError,
};

/// Options for [`crate::EventList::write_fits_image`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOptions {
    /// The width of the (square) image \[arcmin\].
    pub fov_arcmin: f64,

    /// The number of pixels on a side.
    pub nx: usize,

    /// Only bin events with energies above this \[keV\].
    pub emin: Option<f64>,

    /// Only bin events with energies below this \[keV\].
    pub emax: Option<f64>,

    pub overwrite: bool,
}

impl ImageOptions {
    pub fn new(fov_arcmin: f64, nx: usize) -> ImageOptions {
        ImageOptions {
            fov_arcmin,
            nx,
            emin: None,
            emax: None,
            overwrite: false,
        }
    }
}

/// Options for [`crate::EventList::write_fits_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventFileOptions {
    /// The width of the field that events are kept in \[arcmin\].
    pub fov_arcmin: f64,

    /// The number of (virtual) pixels on a side of the field.
    pub nx: usize,

    pub overwrite: bool,

    /// The start of the observation, used for `DATE-OBS` and `DATE-END`. If
    /// this isn't given, the time of writing is used.
    pub start_time: Option<Epoch>,
}

impl EventFileOptions {
    pub fn new(fov_arcmin: f64, nx: usize) -> EventFileOptions {
        EventFileOptions {
            fov_arcmin,
            nx,
            overwrite: false,
            start_time: None,
        }
    }
}

/// Options for [`crate::EventList::write_spectrum`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumOptions {
    /// \[keV\]
    pub emin: f64,

    /// \[keV\]
    pub emax: f64,

    /// The number of channels between `emin` and `emax`.
    pub nchan: usize,

    pub overwrite: bool,
}

impl SpectrumOptions {
    pub fn new(emin: f64, emax: f64, nchan: usize) -> SpectrumOptions {
        SpectrumOptions {
            emin,
            emax,
            nchan,
            overwrite: false,
        }
    }
}

/// Options for [`crate::EventList::write_simput_file`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimputOptions {
    /// Only keep events with energies at or above this \[keV\].
    pub emin: Option<f64>,

    /// Only keep events with energies at or below this \[keV\].
    pub emax: Option<f64>,

    pub overwrite: bool,

    /// Add a source to an existing catalog instead of starting a new one.
    pub append: bool,

    /// The catalog is written to `{simput_prefix}_simput.fits`. If this isn't
    /// given, the photon list prefix is used.
    pub simput_prefix: Option<String>,
}

/// Fail if `path` exists and we aren't allowed to replace it.
pub(crate) fn check_overwrite(path: &Path, overwrite: bool) -> Result<(), EventError> {
    if path.exists() && !overwrite {
        return Err(EventError::FileExists(path.to_path_buf()));
    }
    Ok(())
}

/// The projection of an `nx` × `nx` product grid. A field of view that isn't
/// positive can't hold any events; it gives a projection with zero-sized
/// pixels, onto which nothing lands.
pub(crate) fn field_projection(
    center: RADec,
    fov_arcmin: f64,
    nx: usize,
) -> Result<TanProjection, EventError> {
    if nx == 0 {
        return Err(ProjectionError::ZeroPixels.into());
    }
    match TanProjection::for_field(center, fov_arcmin, nx) {
        Err(ProjectionError::ZeroFieldOfView(fov)) => {
            warn!("The field of view is {fov} arcmin; no events will be kept");
            let crpix = 0.5 * (nx as f64 + 1.0);
            Ok(TanProjection::new(center, [crpix, crpix], [0.0, 0.0]))
        }
        result => Ok(result?),
    }
}

/// `{prefix}{suffix}` as a path; the prefix may contain directories and dots.
pub(crate) fn with_suffix(prefix: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}{suffix}"))
}

/// FITS-style ISO-8601 timestamp (UTC, millisecond precision).
pub(crate) fn iso_timestamp(epoch: Epoch) -> String {
    let (y, mo, d, h, mi, s, ns) = epoch.to_gregorian_utc();
    format!(
        "{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}.{:03}",
        ns / 1_000_000
    )
}

pub(crate) fn now() -> Epoch {
    match Epoch::now() {
        Ok(e) => e,
        Err(e) => {
            warn!("Couldn't get the system time ({e}); dating files at the Unix epoch");
            Epoch::from_unix_seconds(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use hifitime::Duration;

    use super::*;

    #[test]
    fn timestamps_are_iso() {
        let e = Epoch::from_gregorian_utc(2023, 3, 14, 15, 9, 26, 535_000_000);
        assert_eq!(iso_timestamp(e), "2023-03-14T15:09:26.535");
        let later = e + Duration::from_seconds(3600.0);
        assert_eq!(iso_timestamp(later), "2023-03-14T16:09:26.535");
    }

    #[test]
    fn degenerate_fields_keep_nothing() {
        let center = RADec::new(10.0, -5.0);
        let projection = field_projection(center, 0.0, 4).unwrap();
        assert_eq!(projection.crpix, [2.5, 2.5]);
        let (x, y) = projection.world_to_pixel(10.0, -5.0);
        assert!(!crate::binning::in_field(x, 4) || !crate::binning::in_field(y, 4));
        let (x, _) = projection.world_to_pixel(10.001, -5.0);
        assert!(!crate::binning::in_field(x, 4));

        assert!(matches!(
            field_projection(center, 1.0, 0),
            Err(EventError::Projection(ProjectionError::ZeroPixels))
        ));
    }

    #[test]
    fn existing_files_need_overwrite() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            check_overwrite(file.path(), false),
            Err(EventError::FileExists(_))
        ));
        assert!(check_overwrite(file.path(), true).is_ok());
        assert!(check_overwrite(&file.path().with_extension("nope"), false).is_ok());
    }
}
