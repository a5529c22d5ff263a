//! A set of event lists from separate exposures of the same field.

use std::path::Path;

use log::{debug, info};
use vec1::Vec1;

use crate::{
    comm::{on_root, Communicator},
    events::{EventList, SimputSelection},
    write::{check_simput_targets, write_photon_list},
    EventError,
};

/// Event lists from exposures that are stored (and written) side by side as
/// `{basename}.00`, `{basename}.01`, ...
#[derive(Debug, Clone, PartialEq)]
pub struct MultiEventList(pub Vec1<EventList>);

fn h5_name(basename: &str, i: usize) -> String {
    format!("{basename}.{i:02}.h5")
}

impl MultiEventList {
    pub fn new(event_lists: Vec1<EventList>) -> MultiEventList {
        MultiEventList(event_lists)
    }

    /// Read `{basename}.00.h5`, `{basename}.01.h5`, ... up to the first index
    /// that doesn't exist. The first file must exist.
    pub fn from_h5_files(
        basename: &str,
        comm: &dyn Communicator,
    ) -> Result<MultiEventList, EventError> {
        let mut event_lists = Vec1::new(EventList::from_h5_file(h5_name(basename, 0), comm)?);
        for i in 1.. {
            let name = h5_name(basename, i);
            if !Path::new(&name).exists() {
                break;
            }
            event_lists.push(EventList::from_h5_file(&name, comm)?);
        }
        debug!("Read {} event lists for {basename}", event_lists.len());
        Ok(MultiEventList(event_lists))
    }

    /// Write each event list to `{basename}.{i:02}.h5`.
    pub fn write_h5_files(
        &self,
        basename: &str,
        comm: &dyn Communicator,
    ) -> Result<(), EventError> {
        for (i, events) in self.0.iter().enumerate() {
            events.write_h5_file(h5_name(basename, i), comm)?;
        }
        Ok(())
    }

    /// Write each event list as a SIMPUT photon list `{prefix}.{i:02}_phlist.fits`,
    /// all referenced by the catalog `{prefix}_simput.fits`. Each list's flux is
    /// taken over the combined exposure of all the lists.
    pub fn write_simput_catalog(
        &self,
        prefix: &str,
        comm: &dyn Communicator,
        emin: Option<f64>,
        emax: Option<f64>,
        overwrite: bool,
    ) -> Result<(), EventError> {
        let num_lists = self.0.len();
        for i in 0..num_lists {
            check_simput_targets(prefix, &format!("{prefix}.{i:02}"), overwrite, i > 0)?;
        }
        if comm.is_root() {
            info!("Writing SIMPUT catalog file {prefix}_simput.fits");
        }

        for (i, events) in self.0.iter().enumerate() {
            let phlist_prefix = format!("{prefix}.{i:02}");
            let all_events = events.gather(comm)?;
            on_root(comm, || match &all_events {
                Some(all_events) => {
                    let selection = SimputSelection::new(
                        all_events,
                        num_lists as f64 * all_events.parameters().exposure_time,
                        all_events.parameters().area,
                        emin,
                        emax,
                    );
                    write_photon_list(prefix, &phlist_prefix, &selection, i > 0)
                }
                None => Ok(()),
            })?;
        }
        Ok(())
    }
}
