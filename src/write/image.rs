use std::path::Path;

use fitsio::images::{ImageDescription, ImageType};
use log::{debug, info};

use super::{check_overwrite, field_projection, ImageOptions};
use crate::{
    binning::bin_image,
    comm::{on_root, Communicator},
    events::EventList,
    fits::*,
    wcs::TanProjection,
    EventError,
};

impl EventList {
    /// Bin every partition's events into an `nx` × `nx` counts image centred on
    /// the sky centre, and write it as the primary HDU of a FITS file.
    pub fn write_fits_image<P: AsRef<Path>>(
        &self,
        path: P,
        comm: &dyn Communicator,
        options: &ImageOptions,
    ) -> Result<(), EventError> {
        let path = path.as_ref();
        check_overwrite(path, options.overwrite)?;
        let nx = options.nx;
        let projection =
            field_projection(self.parameters().sky_center, options.fov_arcmin, nx)?;

        let local = bin_image(self, &projection, nx, options.emin, options.emax);
        let local: Vec<u64> = local.counts.iter().copied().collect();
        let counts = comm.reduce_sum_u64(&local)?;

        on_root(comm, || match &counts {
            Some(counts) => {
                let image: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
                write_image(
                    path,
                    &image,
                    nx,
                    &projection,
                    self.parameters().exposure_time,
                )
            }
            None => Ok(()),
        })?;
        Ok(())
    }
}

fn write_image(
    path: &Path,
    image: &[f64],
    nx: usize,
    projection: &TanProjection,
    exposure_time: f64,
) -> Result<(), EventError> {
    debug!("Creating {}", path.display());
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[nx, nx],
    };
    let mut fptr = fits_create_image(path, &description)?;
    let hdu = fits_open_hdu(&mut fptr, 0_usize)?;
    fits_write_image(&mut fptr, &hdu, image)?;

    for (key, value) in [
        ("MTYPE1", "EQPOS"),
        ("MFORM1", "RA,DEC"),
        ("CTYPE1", "RA---TAN"),
        ("CTYPE2", "DEC--TAN"),
        ("CUNIT1", "deg"),
        ("CUNIT2", "deg"),
    ] {
        fits_write_key(&mut fptr, &hdu, key, value)?;
    }
    for (key, value) in [
        ("CRPIX1", projection.crpix[0]),
        ("CRPIX2", projection.crpix[1]),
        ("CRVAL1", projection.crval.ra),
        ("CRVAL2", projection.crval.dec),
        ("CDELT1", projection.cdelt[0]),
        ("CDELT2", projection.cdelt[1]),
        ("EXPOSURE", exposure_time),
    ] {
        fits_write_key(&mut fptr, &hdu, key, value)?;
    }

    info!(
        "Wrote a {nx}x{nx} image of {} counts to {}",
        image.iter().sum::<f64>(),
        path.display()
    );
    Ok(())
}
