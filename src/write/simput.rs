use std::path::Path;

use fitsio::tables::{ColumnDataType, ColumnDescription};
use log::{debug, info};

use super::{check_overwrite, with_suffix, SimputOptions};
use crate::{
    comm::{on_root, Communicator},
    events::{EventList, SimputSelection},
    fits::*,
    EventError,
};

impl EventList {
    /// Write the events with energies in `[emin, emax]` to the SIMPUT photon
    /// list `{prefix}_phlist.fits`, and reference it from a new source in the
    /// catalog `{simput_prefix}_simput.fits`.
    pub fn write_simput_file(
        &self,
        prefix: &str,
        comm: &dyn Communicator,
        options: &SimputOptions,
    ) -> Result<(), EventError> {
        let simput_prefix = options.simput_prefix.as_deref().unwrap_or(prefix);
        check_simput_targets(simput_prefix, prefix, options.overwrite, options.append)?;

        let events = self.gather(comm)?;
        on_root(comm, || match &events {
            Some(events) => {
                let selection = events.select_energy_range(options.emin, options.emax);
                write_photon_list(
                    simput_prefix,
                    prefix,
                    &selection,
                    options.append,
                )
            }
            None => Ok(()),
        })?;
        Ok(())
    }
}

/// Fail early (on every rank) if the photon list or catalog would clobber a
/// file we weren't told to replace.
pub(crate) fn check_simput_targets(
    simput_prefix: &str,
    phlist_prefix: &str,
    overwrite: bool,
    append: bool,
) -> Result<(), EventError> {
    check_overwrite(&with_suffix(phlist_prefix, "_phlist.fits"), overwrite)?;
    if !append {
        check_overwrite(&with_suffix(simput_prefix, "_simput.fits"), overwrite)?;
    }
    Ok(())
}

/// One source of a SIMPUT catalog.
#[derive(Debug, Clone, PartialEq)]
struct Source {
    id: i32,
    name: String,
    ra: f64,
    dec: f64,
    e_min: f64,
    e_max: f64,
    flux: f64,
    spectrum: String,
    image: String,
    timing: String,
}

/// Write `selection` to `{phlist_prefix}_phlist.fits` and add it as a source to
/// `{simput_prefix}_simput.fits`. With `append`, the sources already in the
/// catalog are kept (a missing catalog is started afresh); otherwise the
/// catalog holds only the new source. Only one rank should call this.
pub(crate) fn write_photon_list(
    simput_prefix: &str,
    phlist_prefix: &str,
    selection: &SimputSelection,
    append: bool,
) -> Result<(), EventError> {
    let phlist = with_suffix(phlist_prefix, "_phlist.fits");
    let catalog = with_suffix(simput_prefix, "_simput.fits");

    write_phlist_table(&phlist, selection)?;

    let mut sources = if append && catalog.exists() {
        read_sources(&catalog)?
    } else {
        vec![]
    };
    let id = sources.iter().map(|s| s.id).max().unwrap_or(0) + 1;
    let (e_min, e_max) = selection.energy_range();
    let reference = format!("{}[PHLIST,1]", phlist.display());
    sources.push(Source {
        id,
        name: Path::new(phlist_prefix)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        ra: 0.0,
        dec: 0.0,
        e_min,
        e_max,
        flux: selection.flux,
        spectrum: reference.clone(),
        image: reference,
        timing: "NULL".to_string(),
    });
    write_catalog(&catalog, &sources)?;

    info!(
        "Wrote {} photons to {} (source {id} of {})",
        selection.energy.len(),
        phlist.display(),
        catalog.display()
    );
    Ok(())
}

fn write_phlist_table(path: &Path, selection: &SimputSelection) -> Result<(), EventError> {
    debug!("Creating {}", path.display());
    let energy: Vec<f32> = selection.energy.iter().map(|&e| e as f32).collect();

    let mut fptr = fits_create(path)?;
    let hdu = fits_create_table(
        &mut fptr,
        "PHLIST",
        vec![
            ColumnDescription::new("ENERGY").with_type(ColumnDataType::Float).clone(),
            ColumnDescription::new("RA").with_type(ColumnDataType::Double).clone(),
            ColumnDescription::new("DEC").with_type(ColumnDataType::Double).clone(),
        ],
    )?;
    fits_write_col(&mut fptr, &hdu, "ENERGY", &energy)?;
    fits_write_col(&mut fptr, &hdu, "RA", &selection.ra)?;
    fits_write_col(&mut fptr, &hdu, "DEC", &selection.dec)?;

    for (key, value) in [
        ("TUNIT1", "keV"),
        ("TUNIT2", "deg"),
        ("TUNIT3", "deg"),
        ("HDUCLASS", "HEASARC/SIMPUT"),
        ("HDUCLAS1", "PHOTONS"),
        ("HDUVERS", "1.1.0"),
    ] {
        fits_write_key(&mut fptr, &hdu, key, value)?;
    }
    fits_write_key(&mut fptr, &hdu, "EXTVER", 1_i64)?;
    fits_write_key(&mut fptr, &hdu, "REFRA", 0.0)?;
    fits_write_key(&mut fptr, &hdu, "REFDEC", 0.0)?;
    Ok(())
}

fn read_sources(path: &Path) -> Result<Vec<Source>, EventError> {
    debug!("Reading the sources already in {}", path.display());
    let mut fptr = fits_open(path)?;
    let hdu = fits_open_hdu(&mut fptr, "SRC_CAT")?;
    let num_rows: usize = fits_get_required_key(&mut fptr, &hdu, "NAXIS2")?;
    if num_rows == 0 {
        return Ok(vec![]);
    }

    let id: Vec<i32> = fits_get_col(&mut fptr, &hdu, "SRC_ID")?;
    let name: Vec<String> = fits_get_col(&mut fptr, &hdu, "SRC_NAME")?;
    let ra: Vec<f64> = fits_get_col(&mut fptr, &hdu, "RA")?;
    let dec: Vec<f64> = fits_get_col(&mut fptr, &hdu, "DEC")?;
    let e_min: Vec<f64> = fits_get_col(&mut fptr, &hdu, "E_MIN")?;
    let e_max: Vec<f64> = fits_get_col(&mut fptr, &hdu, "E_MAX")?;
    let flux: Vec<f64> = fits_get_col(&mut fptr, &hdu, "FLUX")?;
    let spectrum: Vec<String> = fits_get_col(&mut fptr, &hdu, "SPECTRUM")?;
    let image: Vec<String> = fits_get_col(&mut fptr, &hdu, "IMAGE")?;
    let timing: Vec<String> = fits_get_col(&mut fptr, &hdu, "TIMING")?;

    Ok((0..num_rows)
        .map(|i| Source {
            id: id[i],
            name: name[i].clone(),
            ra: ra[i],
            dec: dec[i],
            e_min: e_min[i],
            e_max: e_max[i],
            flux: flux[i],
            spectrum: spectrum[i].clone(),
            image: image[i].clone(),
            timing: timing[i].clone(),
        })
        .collect())
}

fn write_catalog(path: &Path, sources: &[Source]) -> Result<(), EventError> {
    debug!("Writing {} source(s) to {}", sources.len(), path.display());
    let mut fptr = fits_create(path)?;
    let hdu = fits_create_table(
        &mut fptr,
        "SRC_CAT",
        vec![
            ColumnDescription::new("SRC_ID").with_type(ColumnDataType::Int).clone(),
            ColumnDescription::new("SRC_NAME")
                .with_type(ColumnDataType::String)
                .that_repeats(32).clone(),
            ColumnDescription::new("RA").with_type(ColumnDataType::Double).clone(),
            ColumnDescription::new("DEC").with_type(ColumnDataType::Double).clone(),
            ColumnDescription::new("E_MIN").with_type(ColumnDataType::Double).clone(),
            ColumnDescription::new("E_MAX").with_type(ColumnDataType::Double).clone(),
            ColumnDescription::new("FLUX").with_type(ColumnDataType::Double).clone(),
            ColumnDescription::new("SPECTRUM")
                .with_type(ColumnDataType::String)
                .that_repeats(80).clone(),
            ColumnDescription::new("IMAGE")
                .with_type(ColumnDataType::String)
                .that_repeats(80).clone(),
            ColumnDescription::new("TIMING")
                .with_type(ColumnDataType::String)
                .that_repeats(80).clone(),
        ],
    )?;

    let ids: Vec<i32> = sources.iter().map(|s| s.id).collect();
    fits_write_col(&mut fptr, &hdu, "SRC_ID", &ids)?;
    for (name, col) in [
        ("SRC_NAME", sources.iter().map(|s| s.name.clone()).collect::<Vec<_>>()),
        ("SPECTRUM", sources.iter().map(|s| s.spectrum.clone()).collect()),
        ("IMAGE", sources.iter().map(|s| s.image.clone()).collect()),
        ("TIMING", sources.iter().map(|s| s.timing.clone()).collect()),
    ] {
        fits_write_col(&mut fptr, &hdu, name, &col)?;
    }
    for (name, col) in [
        ("RA", sources.iter().map(|s| s.ra).collect::<Vec<_>>()),
        ("DEC", sources.iter().map(|s| s.dec).collect()),
        ("E_MIN", sources.iter().map(|s| s.e_min).collect()),
        ("E_MAX", sources.iter().map(|s| s.e_max).collect()),
        ("FLUX", sources.iter().map(|s| s.flux).collect()),
    ] {
        fits_write_col(&mut fptr, &hdu, name, &col)?;
    }

    for (key, value) in [
        ("HDUCLASS", "HEASARC/SIMPUT"),
        ("HDUCLAS1", "SRC_CAT"),
        ("HDUVERS", "1.1.0"),
        ("RADECSYS", "FK5"),
        ("TUNIT3", "deg"),
        ("TUNIT4", "deg"),
        ("TUNIT5", "keV"),
        ("TUNIT6", "keV"),
        ("TUNIT7", "erg/s/cm**2"),
    ] {
        fits_write_key(&mut fptr, &hdu, key, value)?;
    }
    fits_write_key(&mut fptr, &hdu, "EQUINOX", 2000.0)?;
    Ok(())
}
