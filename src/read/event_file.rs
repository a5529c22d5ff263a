use std::path::Path;

use log::{debug, trace};
use rayon::prelude::*;

use crate::{
    comm::{partition_rows, Communicator},
    events::{EventList, EventParameters},
    fits::*,
    wcs::{RADec, TanProjection},
    EventError,
};

impl EventList {
    /// Read this rank's share of the events in an `EVENTS` table. Pixel
    /// positions are turned back into RA/Dec with the table's TAN keywords, and
    /// energies are converted to keV.
    pub fn from_fits_file<P: AsRef<Path>>(
        path: P,
        comm: &dyn Communicator,
    ) -> Result<EventList, EventError> {
        let path = path.as_ref();
        debug!("Reading {}", path.display());
        let mut fptr = fits_open(path)?;
        let hdu = fits_open_hdu(&mut fptr, "EVENTS")?;

        let exposure_time: f64 = fits_get_required_key(&mut fptr, &hdu, "EXPOSURE")?;
        let area: f64 = fits_get_required_key(&mut fptr, &hdu, "AREA")?;
        let projection = TanProjection::new(
            RADec::new(
                fits_get_required_key(&mut fptr, &hdu, "TCRVL2")?,
                fits_get_required_key(&mut fptr, &hdu, "TCRVL3")?,
            ),
            [
                fits_get_required_key(&mut fptr, &hdu, "TCRPX2")?,
                fits_get_required_key(&mut fptr, &hdu, "TCRPX3")?,
            ],
            [
                fits_get_required_key(&mut fptr, &hdu, "TCDLT2")?,
                fits_get_required_key(&mut fptr, &hdu, "TCDLT3")?,
            ],
        );
        let parameters = EventParameters {
            emin: fits_get_optional_key(&mut fptr, &hdu, "EMIN")?,
            emax: fits_get_optional_key(&mut fptr, &hdu, "EMAX")?,
            ..EventParameters::new(exposure_time, area, projection.crval)
        };

        let num_rows: usize = fits_get_required_key(&mut fptr, &hdu, "NAXIS2")?;
        let rows = partition_rows(num_rows, comm.rank(), comm.size());
        trace!(
            "Rank {} reads rows {rows:?} of {num_rows} from {}",
            comm.rank(),
            path.display()
        );
        if rows.is_empty() {
            return Ok(EventList::empty(parameters));
        }

        let x: Vec<f64> = fits_get_col_rows(&mut fptr, &hdu, "X", &rows)?;
        let y: Vec<f64> = fits_get_col_rows(&mut fptr, &hdu, "Y", &rows)?;
        let energy: Vec<f32> = fits_get_col_rows(&mut fptr, &hdu, "ENERGY", &rows)?;
        if x.len() != rows.len() {
            return Err(EventError::ColumnLength {
                column: "X",
                len: x.len(),
                expected: rows.len(),
            });
        }

        let (sky_x, sky_y): (Vec<f64>, Vec<f64>) = x
            .par_iter()
            .zip(y.par_iter())
            .map(|(&px, &py)| projection.pixel_to_world(px, py))
            .unzip();
        // eV -> keV
        let energy = energy.iter().map(|&e| f64::from(e) * 1e-3).collect();
        EventList::new(parameters, sky_x, sky_y, energy)
    }
}
