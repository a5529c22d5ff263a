use std::path::Path;

use fitsio::tables::{ColumnDataType, ColumnDescription};
use hifitime::Duration;
use itertools::izip;
use log::{debug, info};

use super::{check_overwrite, field_projection, iso_timestamp, now, EventFileOptions};
use crate::{
    binning::{in_field, project_events},
    comm::{on_root, Communicator},
    events::EventList,
    fits::*,
    wcs::TanProjection,
    EventError,
};

impl EventList {
    /// Write every partition's events to an `EVENTS` table, with sky positions
    /// as pixels of a TAN projection about the sky centre. Events that land
    /// outside the `nx` × `nx` grid are dropped.
    pub fn write_fits_file<P: AsRef<Path>>(
        &self,
        path: P,
        comm: &dyn Communicator,
        options: &EventFileOptions,
    ) -> Result<(), EventError> {
        let path = path.as_ref();
        check_overwrite(path, options.overwrite)?;
        let projection =
            field_projection(self.parameters().sky_center, options.fov_arcmin, options.nx)?;

        let events = self.gather(comm)?;
        on_root(comm, || match &events {
            Some(events) => write_events(events, path, &projection, options),
            None => Ok(()),
        })?;
        Ok(())
    }
}

fn write_events(
    events: &EventList,
    path: &Path,
    projection: &TanProjection,
    options: &EventFileOptions,
) -> Result<(), EventError> {
    let nx = options.nx;
    let (xx, yy) = project_events(events, projection);

    let mut energy = Vec::with_capacity(events.len());
    let mut x = Vec::with_capacity(events.len());
    let mut y = Vec::with_capacity(events.len());
    for (&px, &py, &e) in izip!(&xx, &yy, events.energy()) {
        if in_field(px, nx) && in_field(py, nx) {
            // keV -> eV
            energy.push((e * 1e3) as f32);
            x.push(px);
            y.push(py);
        }
    }
    let num_outside = events.len() - energy.len();
    if num_outside > 0 {
        info!("Threw out {num_outside} events because they fell outside the field of view.");
    }

    let p = events.parameters();
    let start = options.start_time.unwrap_or_else(now);
    let end = start + Duration::from_seconds(p.exposure_time);

    debug!("Creating {}", path.display());
    let mut fptr = fits_create(path)?;
    let hdu = fits_create_table(
        &mut fptr,
        "EVENTS",
        vec![
            ColumnDescription::new("ENERGY").with_type(ColumnDataType::Float).clone(),
            ColumnDescription::new("X").with_type(ColumnDataType::Double).clone(),
            ColumnDescription::new("Y").with_type(ColumnDataType::Double).clone(),
        ],
    )?;
    fits_write_col(&mut fptr, &hdu, "ENERGY", &energy)?;
    fits_write_col(&mut fptr, &hdu, "X", &x)?;
    fits_write_col(&mut fptr, &hdu, "Y", &y)?;

    for (key, value) in [
        ("TUNIT1", "eV"),
        ("TUNIT2", "pixel"),
        ("TUNIT3", "pixel"),
        ("MTYPE1", "sky"),
        ("MFORM1", "x,y"),
        ("MTYPE2", "EQPOS"),
        ("MFORM2", "RA,DEC"),
        ("TCTYP2", "RA---TAN"),
        ("TCTYP3", "DEC--TAN"),
        ("HDUVERS", "1.1.0"),
        ("RADECSYS", "FK5"),
        ("HDUCLASS", "OGIP"),
        ("HDUCLAS1", "EVENTS"),
        ("HDUCLAS2", "ACCEPTED"),
    ] {
        fits_write_key(&mut fptr, &hdu, key, value)?;
    }
    for (key, value) in [
        ("TCRVL2", projection.crval.ra),
        ("TCRVL3", projection.crval.dec),
        ("TCDLT2", projection.cdelt[0]),
        ("TCDLT3", projection.cdelt[1]),
        ("TCRPX2", projection.crpix[0]),
        ("TCRPX3", projection.crpix[1]),
        ("TLMIN2", 0.5),
        ("TLMIN3", 0.5),
        ("TLMAX2", nx as f64 + 0.5),
        ("TLMAX3", nx as f64 + 0.5),
        ("EXPOSURE", p.exposure_time),
        ("TSTART", 0.0),
        ("TSTOP", p.exposure_time),
        ("AREA", p.area),
        ("EQUINOX", 2000.0),
    ] {
        fits_write_key(&mut fptr, &hdu, key, value)?;
    }
    if let Some(emin) = p.emin {
        fits_write_key(&mut fptr, &hdu, "EMIN", emin)?;
    }
    if let Some(emax) = p.emax {
        fits_write_key(&mut fptr, &hdu, "EMAX", emax)?;
    }
    fits_write_key(&mut fptr, &hdu, "DATE", iso_timestamp(now()))?;
    fits_write_key(&mut fptr, &hdu, "DATE-OBS", iso_timestamp(start))?;
    fits_write_key(&mut fptr, &hdu, "DATE-END", iso_timestamp(end))?;

    info!("Wrote {} events to {}", energy.len(), path.display());
    Ok(())
}
