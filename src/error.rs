use std::path::PathBuf;

use thiserror::Error;

use crate::{comm::CommError, events::Parameter, fits::FitsError, wcs::ProjectionError};

#[derive(Error, Debug)]
pub enum EventError {
    #[error("event column '{column}' has {len} values, but the event list has {expected} events")]
    ColumnLength {
        column: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("the event lists have different values for {parameter} ({left} vs. {right})")]
    Incompatible {
        parameter: Parameter,
        left: String,
        right: String,
    },

    #[error("cannot combine an event list with a '{0}' column with one without it")]
    SchemaMismatch(&'static str),

    #[error("invalid binning: {0}")]
    InvalidBinning(String),

    #[error("a bin holds {0} counts, which doesn't fit in the file's 32-bit column")]
    CountOverflow(u64),

    #[error("{} already exists; set overwrite to replace it", .0.display())]
    FileExists(PathBuf),

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}
