//! Tiling a large field into a grid of smaller fields, each of which becomes
//! its own SIMPUT source.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::PathBuf,
};

use log::{debug, info};

use crate::{
    comm::{on_root, Communicator},
    events::EventList,
    wcs::{offset_to_sky, RADec},
    write::{check_overwrite, with_suffix, SimputOptions},
    EventError,
};

/// An `nx` × `ny` grid of square cells, each `cell_fov_arcmin` wide, centred on
/// `sky_center`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub nx: usize,
    pub ny: usize,
    pub cell_fov_arcmin: f64,
    pub sky_center: RADec,
}

/// One cell of a [`GridLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    /// The position of the cell in the order cells are visited.
    pub index: usize,
    pub i: usize,
    pub j: usize,

    /// Tangent-plane offset of the cell centre from the grid centre
    /// \[radians\].
    pub offset: (f64, f64),

    /// Where the cell centre is on the sky.
    pub center: RADec,
}

impl GridLayout {
    /// Every cell, `i` (along RA) in the outer loop and `j` (along Dec) in the
    /// inner one.
    pub fn cells(&self) -> Vec<GridCell> {
        let fov = (self.cell_fov_arcmin / 60.0).to_radians();
        let mut cells = Vec::with_capacity(self.nx * self.ny);
        for i in 0..self.nx {
            for j in 0..self.ny {
                let xi = (i as f64 - 0.5 * (self.nx as f64 - 1.0)) * fov;
                let eta = (j as f64 - 0.5 * (self.ny as f64 - 1.0)) * fov;
                cells.push(GridCell {
                    index: cells.len(),
                    i,
                    j,
                    offset: (xi, eta),
                    center: offset_to_sky(xi, eta, self.sky_center),
                });
            }
        }
        cells
    }
}

/// Write one SIMPUT source per grid cell into the catalog
/// `{simput_prefix}_simput.fits`, along with the index `{simput_prefix}_grid.txt`
/// that lists each cell's photon list and sky centre. `producer` is called on
/// every rank for every cell, and gives that rank's share of the cell's
/// events. Returns the path of the index.
pub fn write_grid_catalog<F>(
    layout: &GridLayout,
    simput_prefix: &str,
    comm: &dyn Communicator,
    overwrite: bool,
    mut producer: F,
) -> Result<PathBuf, EventError>
where
    F: FnMut(&GridCell) -> Result<EventList, EventError>,
{
    let index_path = with_suffix(simput_prefix, "_grid.txt");
    check_overwrite(&index_path, overwrite)?;
    check_overwrite(&with_suffix(simput_prefix, "_simput.fits"), overwrite)?;

    on_root(comm, || {
        let mut f = File::create(&index_path)?;
        writeln!(f, "# {simput_prefix}_simput.fits")?;
        Ok::<_, EventError>(())
    })?;

    let cells = layout.cells();
    for cell in &cells {
        debug!(
            "Grid cell {} ({}, {}) is centred on {}",
            cell.index, cell.i, cell.j, cell.center
        );
        let events = producer(cell)?;
        let phlist_prefix = format!("{simput_prefix}_{}_{}", cell.i, cell.j);
        events.write_simput_file(
            &phlist_prefix,
            comm,
            &SimputOptions {
                overwrite,
                // The first cell starts a fresh catalog.
                append: cell.index > 0,
                simput_prefix: Some(simput_prefix.to_string()),
                ..Default::default()
            },
        )?;

        on_root(comm, || {
            let mut f = OpenOptions::new().append(true).open(&index_path)?;
            writeln!(
                f,
                "{}\t{phlist_prefix}_phlist.fits\t{:.2}\t{:.2}",
                cell.index, cell.center.ra, cell.center.dec
            )?;
            Ok::<_, EventError>(())
        })?;
    }

    info!(
        "Wrote {} grid cells to {}_simput.fits",
        cells.len(),
        simput_prefix
    );
    Ok(index_path)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::wcs::sky_to_offset;

    #[test]
    fn cells_are_centred_on_the_field() {
        let layout = GridLayout {
            nx: 3,
            ny: 2,
            cell_fov_arcmin: 30.0,
            sky_center: RADec::new(30.0, 45.0),
        };
        let cells = layout.cells();
        assert_eq!(cells.len(), 6);
        assert_eq!(
            cells.iter().map(|c| (c.i, c.j)).collect::<Vec<_>>(),
            vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1)]
        );
        assert!(cells.iter().enumerate().all(|(k, c)| c.index == k));

        let fov = 0.5_f64.to_radians();
        assert_abs_diff_eq!(cells[0].offset.0, -fov, epsilon = 1e-15);
        assert_abs_diff_eq!(cells[0].offset.1, -0.5 * fov, epsilon = 1e-15);
        // The middle column sits on the central meridian.
        assert_abs_diff_eq!(cells[2].center.ra, 30.0, epsilon = 1e-10);
        assert!(cells[4].center.ra > 30.0);
        assert!(cells[1].center.dec > cells[0].center.dec);

        for c in &cells {
            let (xi, eta) = sky_to_offset(c.center, layout.sky_center);
            assert_abs_diff_eq!(xi, c.offset.0, epsilon = 1e-12);
            assert_abs_diff_eq!(eta, c.offset.1, epsilon = 1e-12);
        }
    }

    #[test]
    fn one_cell_grid_is_the_centre() {
        let layout = GridLayout {
            nx: 1,
            ny: 1,
            cell_fov_arcmin: 10.0,
            sky_center: RADec::new(180.0, -20.0),
        };
        let cells = layout.cells();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].center, layout.sky_center);
    }
}
