//! Aggregating simulated X-ray event lists that are spread over cooperating
//! workers, and writing them out as HDF5 event files, FITS event tables,
//! images, spectra and SIMPUT catalogs.

pub mod binning;
pub mod comm;
mod error;
pub mod events;
mod fits;
pub mod grid;
pub mod multi;
mod read;
pub mod wcs;
pub mod write;

pub use comm::{Communicator, SingleProcess, ThreadComm};
pub use error::EventError;
pub use events::{EventList, EventParameters, Parameter, SimputSelection};
pub use fits::FitsError;
pub use grid::{write_grid_catalog, GridCell, GridLayout};
pub use multi::MultiEventList;
pub use wcs::{RADec, TanProjection};
pub use write::{EventFileOptions, ImageOptions, SimputOptions, SpectrumOptions};
