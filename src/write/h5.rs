use std::{path::Path, str::FromStr};

use hdf5::{
    types::{H5Type, VarLenUnicode},
    Dataset, Group,
};
use log::{debug, info};

use crate::{
    comm::{on_root, Communicator},
    events::EventList,
    EventError,
};

impl EventList {
    /// Write every partition's events to a single HDF5 file. Anything at `path`
    /// is replaced.
    pub fn write_h5_file<P: AsRef<Path>>(
        &self,
        path: P,
        comm: &dyn Communicator,
    ) -> Result<(), EventError> {
        let path = path.as_ref();
        let events = self.gather(comm)?;
        on_root(comm, || match &events {
            Some(events) => write_h5(events, path),
            None => Ok(()),
        })?;
        Ok(())
    }
}

fn write_h5(events: &EventList, path: &Path) -> Result<(), EventError> {
    debug!("Creating {}", path.display());
    let file = hdf5::File::create(path)?;

    let p = events.parameters();
    let params = file.create_group("parameters")?;
    write_scalar(&params, "exposure_time", p.exposure_time, "s")?;
    write_scalar(&params, "area", p.area, "cm**2")?;
    write_column(
        &params,
        "sky_center",
        &[p.sky_center.ra, p.sky_center.dec],
        "deg",
    )?;
    if let Some(emin) = p.emin {
        write_scalar(&params, "emin", emin, "keV")?;
    }
    if let Some(emax) = p.emax {
        write_scalar(&params, "emax", emax, "keV")?;
    }

    let data = file.create_group("data")?;
    write_column(&data, "sky_x", events.sky_x(), "deg")?;
    write_column(&data, "sky_y", events.sky_y(), "deg")?;
    write_column(&data, "observed_energy", events.energy(), "keV")?;
    if let Some(channel) = events.channel() {
        write_column(&data, "channel", channel, "")?;
    }

    info!("Wrote {} events to {}", events.len(), path.display());
    Ok(())
}

fn write_scalar(group: &Group, name: &str, value: f64, units: &str) -> Result<(), EventError> {
    let ds = group.new_dataset::<f64>().shape(()).create(name)?;
    ds.write_scalar(&value)?;
    set_dataset_units(&ds, units)
}

fn write_column<T: H5Type>(
    group: &Group,
    name: &str,
    data: &[T],
    units: &str,
) -> Result<(), EventError> {
    let ds = group.new_dataset::<T>().shape((data.len(),)).create(name)?;
    if !data.is_empty() {
        ds.write_raw(data)?;
    }
    set_dataset_units(&ds, units)
}

fn set_dataset_units(dataset: &Dataset, units: &str) -> Result<(), EventError> {
    let value = VarLenUnicode::from_str(units)
        .map_err(|e| hdf5::Error::from(format!("invalid units '{units}': {e}")))?;
    dataset
        .new_attr::<VarLenUnicode>()
        .create("units")?
        .write_scalar(&value)?;
    Ok(())
}
