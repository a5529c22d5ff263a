use std::{ops::Range, path::Path};

use hdf5::{types::H5Type, Group};
use log::{debug, trace};
use ndarray::s;

use crate::{
    comm::{partition_rows, Communicator},
    events::{EventList, EventParameters},
    wcs::RADec,
    EventError,
};

impl EventList {
    /// Read this rank's share of the events in an HDF5 event file. Rank `r` of
    /// `P` gets rows `[r·n/P, (r+1)·n/P)`; each rank reads independently.
    pub fn from_h5_file<P: AsRef<Path>>(
        path: P,
        comm: &dyn Communicator,
    ) -> Result<EventList, EventError> {
        let path = path.as_ref();
        debug!("Reading {}", path.display());
        let file = hdf5::File::open(path)?;

        let params = file.group("parameters")?;
        let exposure_time = params.dataset("exposure_time")?.read_scalar::<f64>()?;
        let area = params.dataset("area")?.read_scalar::<f64>()?;
        let sky_center = params.dataset("sky_center")?.read_raw::<f64>()?;
        let sky_center = match sky_center.as_slice() {
            [ra, dec] => RADec::new(*ra, *dec),
            _ => {
                return Err(EventError::ColumnLength {
                    column: "sky_center",
                    len: sky_center.len(),
                    expected: 2,
                })
            }
        };
        let parameters = EventParameters {
            emin: read_optional_scalar(&params, "emin")?,
            emax: read_optional_scalar(&params, "emax")?,
            ..EventParameters::new(exposure_time, area, sky_center)
        };

        let data = file.group("data")?;
        let num_rows = data.dataset("sky_x")?.size();
        let rows = partition_rows(num_rows, comm.rank(), comm.size());
        trace!(
            "Rank {} reads rows {rows:?} of {num_rows} from {}",
            comm.rank(),
            path.display()
        );

        let events = EventList::new(
            parameters,
            read_rows(&data, "sky_x", &rows)?,
            read_rows(&data, "sky_y", &rows)?,
            read_rows(&data, "observed_energy", &rows)?,
        )?;
        if data.link_exists("channel") {
            events.with_channel(read_rows(&data, "channel", &rows)?)
        } else {
            Ok(events)
        }
    }
}

fn read_optional_scalar(group: &Group, name: &str) -> Result<Option<f64>, EventError> {
    if !group.link_exists(name) {
        return Ok(None);
    }
    Ok(Some(group.dataset(name)?.read_scalar::<f64>()?))
}

fn read_rows<T: H5Type>(
    group: &Group,
    name: &str,
    rows: &Range<usize>,
) -> Result<Vec<T>, EventError> {
    let ds = group.dataset(name)?;
    if rows.is_empty() {
        return Ok(vec![]);
    }
    Ok(ds
        .read_slice_1d::<T, _>(s![rows.start..rows.end])?
        .into_raw_vec())
}
