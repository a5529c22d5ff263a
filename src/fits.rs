//! Thin wrappers around `fitsio` that attach the file name and the calling
//! location to every error.

use std::{
    ffi::CString,
    fmt::Display,
    ops::Range,
    os::raw::c_int,
    panic::Location,
    path::{Path, PathBuf},
    ptr,
};

use fitsio::{
    errors::check_status as fits_check_status,
    hdu::{DescribesHdu, FitsHdu},
    headers::WritesKey,
    images::{ImageDescription, WriteImage},
    tables::{ColumnDescription, ReadsCol, WritesCol},
    FitsFile,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitsError {
    /// Error when opening a fits file.
    #[error("{source_file}:{source_line}\nCouldn't open {}: {fits_error}", fits_filename.display())]
    Open {
        fits_error: Box<fitsio::errors::Error>,
        fits_filename: PathBuf,
        source_file: &'static str,
        source_line: u32,
    },

    /// Error when creating a fits file.
    #[error(
        "{source_file}:{source_line}\nCouldn't create {}: {fits_error}",
        fits_filename.display()
    )]
    Create {
        fits_error: Box<fitsio::errors::Error>,
        fits_filename: PathBuf,
        source_file: &'static str,
        source_line: u32,
    },

    /// Error when opening a fits file's HDU.
    #[error("{source_file}:{source_line}\nCouldn't open HDU {hdu_description}: {fits_error}")]
    Hdu {
        fits_error: Box<fitsio::errors::Error>,
        hdu_description: String,
        source_file: &'static str,
        source_line: u32,
    },

    /// A required keyword is missing.
    #[error("{source_file}:{source_line}\nKeyword {key} doesn't exist")]
    MissingKey {
        key: String,
        source_file: &'static str,
        source_line: u32,
    },

    /// A keyword's value couldn't be parsed into the expected type.
    #[error("{source_file}:{source_line}\nCouldn't parse keyword {key} (value '{value}')")]
    Parse {
        key: String,
        value: String,
        source_file: &'static str,
        source_line: u32,
    },

    /// Any other problem reading or writing keywords, columns or images.
    #[error("{source_file}:{source_line}\nError {what}: {fits_error}")]
    Io {
        what: String,
        fits_error: Box<fitsio::errors::Error>,
        source_file: &'static str,
        source_line: u32,
    },
}

impl FitsError {
    #[track_caller]
    fn io(what: String, fits_error: fitsio::errors::Error) -> FitsError {
        let caller = Location::caller();
        FitsError::Io {
            what,
            fits_error: Box::new(fits_error),
            source_file: caller.file(),
            source_line: caller.line(),
        }
    }
}

/// Open a fits file.
#[track_caller]
pub(crate) fn fits_open<P: AsRef<Path>>(file: P) -> Result<FitsFile, FitsError> {
    FitsFile::open(file.as_ref()).map_err(|e| {
        let caller = Location::caller();
        FitsError::Open {
            fits_error: Box::new(e),
            fits_filename: file.as_ref().to_path_buf(),
            source_file: caller.file(),
            source_line: caller.line(),
        }
    })
}

/// Create a fits file with an empty primary HDU, clobbering anything already
/// at `file`.
#[track_caller]
pub(crate) fn fits_create<P: AsRef<Path>>(file: P) -> Result<FitsFile, FitsError> {
    FitsFile::create(file.as_ref())
        .overwrite()
        .open()
        .map_err(|e| {
            let caller = Location::caller();
            FitsError::Create {
                fits_error: Box::new(e),
                fits_filename: file.as_ref().to_path_buf(),
                source_file: caller.file(),
                source_line: caller.line(),
            }
        })
}

/// Create a fits file whose primary HDU is an image described by
/// `description`, clobbering anything already at `file`.
#[track_caller]
pub(crate) fn fits_create_image<P: AsRef<Path>>(
    file: P,
    description: &ImageDescription,
) -> Result<FitsFile, FitsError> {
    FitsFile::create(file.as_ref())
        .with_custom_primary(description)
        .overwrite()
        .open()
        .map_err(|e| {
            let caller = Location::caller();
            FitsError::Create {
                fits_error: Box::new(e),
                fits_filename: file.as_ref().to_path_buf(),
                source_file: caller.file(),
                source_line: caller.line(),
            }
        })
}

/// Open a fits file's HDU.
#[track_caller]
pub(crate) fn fits_open_hdu<T: DescribesHdu + Display + Copy>(
    fits_fptr: &mut FitsFile,
    hdu_description: T,
) -> Result<FitsHdu, FitsError> {
    fits_fptr.hdu(hdu_description).map_err(|e| {
        let caller = Location::caller();
        FitsError::Hdu {
            fits_error: Box::new(e),
            hdu_description: format!("{hdu_description}"),
            source_file: caller.file(),
            source_line: caller.line(),
        }
    })
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword that may
/// or may not exist, pull out the value of the keyword, parsing it into the
/// desired type.
#[track_caller]
pub(crate) fn fits_get_optional_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<T>, FitsError> {
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(key_value) => key_value,
        // 202 = KEY_NO_EXIST, 204 = VALUE_UNDEFINED
        Err(fitsio::errors::Error::Fits(fe)) if matches!(fe.status, 202 | 204) => return Ok(None),
        Err(e) => return Err(FitsError::io(format!("reading keyword {keyword}"), e)),
    };

    match unparsed_value.trim().parse() {
        Ok(parsed_value) => Ok(Some(parsed_value)),
        Err(_) => {
            let caller = Location::caller();
            Err(FitsError::Parse {
                key: keyword.to_string(),
                value: unparsed_value,
                source_file: caller.file(),
                source_line: caller.line(),
            })
        }
    }
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword, pull out
/// the value of the keyword, parsing it into the desired type.
#[track_caller]
pub(crate) fn fits_get_required_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<T, FitsError> {
    match fits_get_optional_key(fits_fptr, hdu, keyword)? {
        Some(value) => Ok(value),
        None => {
            let caller = Location::caller();
            Err(FitsError::MissingKey {
                key: keyword.to_string(),
                source_file: caller.file(),
                source_line: caller.line(),
            })
        }
    }
}

/// Get a column from a fits file's HDU.
#[track_caller]
pub(crate) fn fits_get_col<T: ReadsCol>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Vec<T>, FitsError> {
    hdu.read_col(fits_fptr, keyword)
        .map_err(|e| FitsError::io(format!("reading column {keyword}"), e))
}

/// Get the rows `rows` (half-open) of a column. `fitsio` treats the end of a
/// range as inclusive, so it's shifted here.
#[track_caller]
pub(crate) fn fits_get_col_rows<T: ReadsCol>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
    rows: &Range<usize>,
) -> Result<Vec<T>, FitsError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }
    let inclusive = rows.start..rows.end - 1;
    hdu.read_col_range(fits_fptr, keyword, &inclusive)
        .map_err(|e| FitsError::io(format!("reading rows {rows:?} of column {keyword}"), e))
}

/// Create a binary table extension called `extname`.
#[track_caller]
pub(crate) fn fits_create_table(
    fits_fptr: &mut FitsFile,
    extname: &str,
    columns: Vec<ColumnDescription>,
) -> Result<FitsHdu, FitsError> {
    let columns = columns
        .into_iter()
        .map(|c| c.create())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| FitsError::io(format!("describing the columns of {extname}"), e))?;
    fits_fptr
        .create_table(extname, &columns)
        .map_err(|e| FitsError::io(format!("creating table {extname}"), e))
}

/// Write a whole column.
#[track_caller]
pub(crate) fn fits_write_col<T: WritesCol>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    name: &str,
    data: &[T],
) -> Result<(), FitsError> {
    if data.is_empty() {
        return Ok(());
    }
    hdu.write_col(fits_fptr, name, data)
        .map(|_| ())
        .map_err(|e| FitsError::io(format!("writing column {name}"), e))
}

/// Write a keyword.
#[track_caller]
pub(crate) fn fits_write_key<T: WritesKey>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
    value: T,
) -> Result<(), FitsError> {
    hdu.write_key(fits_fptr, keyword, value)
        .map_err(|e| FitsError::io(format!("writing keyword {keyword}"), e))
}

/// Write a logical (T/F) keyword into the current HDU. `fitsio` has no
/// boolean keyword support, so this goes to cfitsio directly.
#[track_caller]
pub(crate) fn fits_write_logical_key(
    fits_fptr: &mut FitsFile,
    keyword: &str,
    value: bool,
) -> Result<(), FitsError> {
    let keyword_ffi = CString::new(keyword).map_err(|e| {
        FitsError::io(
            format!("writing keyword {keyword}"),
            fitsio::errors::Error::Message(e.to_string()),
        )
    })?;
    let mut status = 0;
    unsafe {
        // ffpkyl = fits_write_key_log
        fitsio_sys::ffpkyl(
            fits_fptr.as_raw(),
            keyword_ffi.as_ptr(),
            c_int::from(value),
            ptr::null(),
            &mut status,
        );
    }
    fits_check_status(status)
        .map_err(|e| FitsError::io(format!("writing keyword {keyword}"), e))
}

/// Write an image into `hdu`.
#[track_caller]
pub(crate) fn fits_write_image<T: WriteImage>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    data: &[T],
) -> Result<(), FitsError> {
    hdu.write_image(fits_fptr, data)
        .map_err(|e| FitsError::io("writing image".to_string(), e))
}
