use std::path::Path;

use fitsio::tables::{ColumnDataType, ColumnDescription};
use log::{debug, info};

use super::{check_overwrite, SpectrumOptions};
use crate::{
    binning::{bin_spectrum, channel_centers},
    comm::{on_root, Communicator},
    events::EventList,
    fits::*,
    EventError,
};

impl EventList {
    /// Histogram every partition's energies into `nchan` channels between
    /// `emin` and `emax`, and write an OGIP `SPECTRUM` table.
    pub fn write_spectrum<P: AsRef<Path>>(
        &self,
        path: P,
        comm: &dyn Communicator,
        options: &SpectrumOptions,
    ) -> Result<(), EventError> {
        let path = path.as_ref();
        check_overwrite(path, options.overwrite)?;
        let local = bin_spectrum(self.energy(), options.emin, options.emax, options.nchan)?;
        let counts = comm.reduce_sum_u64(&local)?;

        on_root(comm, || match &counts {
            Some(counts) => {
                write_spectrum(path, counts, options, self.parameters().exposure_time)
            }
            None => Ok(()),
        })?;
        Ok(())
    }
}

fn write_spectrum(
    path: &Path,
    counts: &[u64],
    options: &SpectrumOptions,
    exposure_time: f64,
) -> Result<(), EventError> {
    let nchan = counts.len();
    let channel: Vec<i32> = (1..=nchan).map(|c| c as i32).collect();
    let energy = channel_centers(options.emin, options.emax, nchan);
    let counts_col: Vec<i32> = counts
        .iter()
        .map(|&c| i32::try_from(c).map_err(|_| EventError::CountOverflow(c)))
        .collect::<Result<_, _>>()?;
    let count_rate: Vec<f64> = counts.iter().map(|&c| c as f64 / exposure_time).collect();
    let total: u64 = counts.iter().sum();

    debug!("Creating {}", path.display());
    let mut fptr = fits_create(path)?;
    let hdu = fits_create_table(
        &mut fptr,
        "SPECTRUM",
        vec![
            ColumnDescription::new("CHANNEL").with_type(ColumnDataType::Int).clone(),
            ColumnDescription::new("ENERGY").with_type(ColumnDataType::Double).clone(),
            ColumnDescription::new("COUNTS").with_type(ColumnDataType::Int).clone(),
            ColumnDescription::new("COUNT_RATE").with_type(ColumnDataType::Double).clone(),
        ],
    )?;
    fits_write_col(&mut fptr, &hdu, "CHANNEL", &channel)?;
    fits_write_col(&mut fptr, &hdu, "ENERGY", &energy)?;
    fits_write_col(&mut fptr, &hdu, "COUNTS", &counts_col)?;
    fits_write_col(&mut fptr, &hdu, "COUNT_RATE", &count_rate)?;

    fits_write_key(&mut fptr, &hdu, "DETCHANS", nchan as i64)?;
    fits_write_key(&mut fptr, &hdu, "TOTCTS", total as i64)?;
    for (key, value) in [
        ("EXPOSURE", exposure_time),
        ("LIVETIME", exposure_time),
        ("AREASCAL", 1.0),
        ("CORRSCAL", 0.0),
        ("BACKSCAL", 1.0),
    ] {
        fits_write_key(&mut fptr, &hdu, key, value)?;
    }
    for (key, value) in [
        ("CONTENT", "pi"),
        ("HDUCLASS", "OGIP"),
        ("HDUCLAS1", "SPECTRUM"),
        ("HDUCLAS2", "TOTAL"),
        ("HDUCLAS3", "TYPE:I"),
        ("HDUCLAS4", "COUNT"),
        ("HDUVERS", "1.1.0"),
        ("HDUVERS1", "1.1.0"),
        ("CHANTYPE", "pi"),
        ("BACKFILE", "none"),
        ("CORRFILE", "none"),
        ("RESPFILE", "none"),
        ("ANCRFILE", "none"),
        ("MISSION", "none"),
        ("TELESCOP", "none"),
        ("INSTRUME", "none"),
    ] {
        fits_write_key(&mut fptr, &hdu, key, value)?;
    }
    // The keys above leave SPECTRUM as the current HDU.
    fits_write_logical_key(&mut fptr, "POISSERR", true)?;

    info!(
        "Wrote a {nchan}-channel spectrum of {total} counts to {}",
        path.display()
    );
    Ok(())
}
