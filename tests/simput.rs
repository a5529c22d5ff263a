mod common;

use std::fs;

use approx::assert_relative_eq;
use common::*;
use fitsio::FitsFile;
use tempfile::tempdir;
use vec1::vec1;
use xevents::{
    events::KEV_TO_ERG, write_grid_catalog, Communicator, EventError, EventList, GridLayout,
    MultiEventList, RADec, SimputOptions, SingleProcess,
};

fn catalog_ids(path: &std::path::Path) -> Vec<i32> {
    let mut f = FitsFile::open(path).unwrap();
    let hdu = f.hdu("SRC_CAT").unwrap();
    hdu.read_col(&mut f, "SRC_ID").unwrap()
}

#[test]
fn photon_list_and_catalog() {
    init_logger();
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("src");
    let prefix = prefix.to_str().unwrap();

    let events = EventList::new(
        params(),
        vec![30.0, 30.001, 29.999, 30.002],
        vec![45.0, 45.001, 44.999, 45.0],
        vec![0.5, 1.0, 4.0, 9.0],
    )
    .unwrap();
    let options = SimputOptions {
        emin: Some(1.0),
        emax: Some(4.0),
        ..Default::default()
    };
    events.write_simput_file(prefix, &SingleProcess, &options).unwrap();

    let mut f = FitsFile::open(format!("{prefix}_phlist.fits")).unwrap();
    let hdu = f.hdu("PHLIST").unwrap();
    let energy: Vec<f32> = hdu.read_col(&mut f, "ENERGY").unwrap();
    assert_eq!(energy, vec![1.0, 4.0]);
    let ra: Vec<f64> = hdu.read_col(&mut f, "RA").unwrap();
    assert_eq!(ra, vec![30.001, 29.999]);
    let class: String = hdu.read_key(&mut f, "HDUCLAS1").unwrap();
    assert_eq!(class, "PHOTONS");

    let mut f = FitsFile::open(format!("{prefix}_simput.fits")).unwrap();
    let hdu = f.hdu("SRC_CAT").unwrap();
    let flux: Vec<f64> = hdu.read_col(&mut f, "FLUX").unwrap();
    let p = params();
    assert_relative_eq!(flux[0], 5.0 * KEV_TO_ERG / p.exposure_time / p.area, max_relative = 1e-12);
    let e_min: Vec<f64> = hdu.read_col(&mut f, "E_MIN").unwrap();
    let e_max: Vec<f64> = hdu.read_col(&mut f, "E_MAX").unwrap();
    assert_eq!((e_min[0], e_max[0]), (1.0, 4.0));
    let spectrum: Vec<String> = hdu.read_col(&mut f, "SPECTRUM").unwrap();
    assert_eq!(spectrum[0], format!("{prefix}_phlist.fits[PHLIST,1]"));
    let timing: Vec<String> = hdu.read_col(&mut f, "TIMING").unwrap();
    assert_eq!(timing[0], "NULL");
}

#[test]
fn appending_sources_numbers_them_in_order() {
    let dir = tempdir().unwrap();
    let catalog = dir.path().join("cat");
    let catalog = catalog.to_str().unwrap().to_string();

    for (k, seed) in [3, 7, 11].into_iter().enumerate() {
        let prefix = dir.path().join(format!("src{k}"));
        let options = SimputOptions {
            append: k > 0,
            simput_prefix: Some(catalog.clone()),
            ..Default::default()
        };
        scattered_events(10, seed)
            .write_simput_file(prefix.to_str().unwrap(), &SingleProcess, &options)
            .unwrap();
    }
    assert_eq!(catalog_ids(&dir.path().join("cat_simput.fits")), vec![1, 2, 3]);

    let mut f = FitsFile::open(dir.path().join("cat_simput.fits")).unwrap();
    let hdu = f.hdu("SRC_CAT").unwrap();
    let names: Vec<String> = hdu.read_col(&mut f, "SRC_NAME").unwrap();
    assert!(names[2].ends_with("src2"));
}

#[test]
fn appending_to_a_missing_catalog_starts_one() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("lonely");
    let options = SimputOptions {
        append: true,
        ..Default::default()
    };
    scattered_events(4, 0)
        .write_simput_file(prefix.to_str().unwrap(), &SingleProcess, &options)
        .unwrap();
    assert_eq!(catalog_ids(&dir.path().join("lonely_simput.fits")), vec![1]);
}

#[test]
fn simput_files_are_not_clobbered() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("src");
    let prefix = prefix.to_str().unwrap();
    let events = scattered_events(4, 0);
    events
        .write_simput_file(prefix, &SingleProcess, &SimputOptions::default())
        .unwrap();
    let result = events.write_simput_file(prefix, &SingleProcess, &SimputOptions::default());
    assert!(matches!(result, Err(EventError::FileExists(_))));
}

#[test]
fn multi_rank_simput_gathers_every_partition() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("ranked");
    let prefix = prefix.to_str().unwrap();

    run_group(3, |comm| {
        scattered_events(4, comm.rank())
            .write_simput_file(prefix, &comm, &SimputOptions::default())
            .unwrap();
    });
    let mut f = FitsFile::open(format!("{prefix}_phlist.fits")).unwrap();
    let hdu = f.hdu("PHLIST").unwrap();
    let energy: Vec<f32> = hdu.read_col(&mut f, "ENERGY").unwrap();
    assert_eq!(energy.len(), 12);
}

#[test]
fn multi_event_list_catalog() {
    init_logger();
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("multi");
    let prefix = prefix.to_str().unwrap();

    let lists = MultiEventList::new(vec1![scattered_events(6, 0), scattered_events(9, 5)]);
    lists
        .write_simput_catalog(prefix, &SingleProcess, None, None, false)
        .unwrap();

    assert!(dir.path().join("multi.00_phlist.fits").exists());
    assert!(dir.path().join("multi.01_phlist.fits").exists());
    let catalog = dir.path().join("multi_simput.fits");
    assert_eq!(catalog_ids(&catalog), vec![1, 2]);

    let mut f = FitsFile::open(&catalog).unwrap();
    let hdu = f.hdu("SRC_CAT").unwrap();
    let flux: Vec<f64> = hdu.read_col(&mut f, "FLUX").unwrap();
    let p = params();
    let expected = lists.0[1].energy().iter().sum::<f64>() * KEV_TO_ERG
        / (2.0 * p.exposure_time)
        / p.area;
    assert_relative_eq!(flux[1], expected, max_relative = 1e-12);
}

#[test]
fn multi_event_list_catalog_across_ranks() {
    init_logger();
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("ranked_multi");
    let prefix = prefix.to_str().unwrap();

    // Each rank holds its share of both exposures; the second rank's share of
    // the first exposure is empty.
    let results = run_group(2, |comm| {
        let first = if comm.is_root() {
            scattered_events(3, 0)
        } else {
            EventList::empty(params())
        };
        let lists = MultiEventList::new(vec1![first, scattered_events(2, comm.rank())]);
        lists.write_simput_catalog(prefix, &comm, None, None, false)
    });
    assert!(results.iter().all(|r| r.is_ok()));

    assert_eq!(catalog_ids(&dir.path().join("ranked_multi_simput.fits")), vec![1, 2]);
    for (phlist, n) in [("ranked_multi.00_phlist.fits", 3), ("ranked_multi.01_phlist.fits", 4)] {
        let mut f = FitsFile::open(dir.path().join(phlist)).unwrap();
        let hdu = f.hdu("PHLIST").unwrap();
        let energy: Vec<f32> = hdu.read_col(&mut f, "ENERGY").unwrap();
        assert_eq!(energy.len(), n);
    }
}

#[test]
fn grid_catalog_covers_every_cell() {
    init_logger();
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("grid");
    let prefix = prefix.to_str().unwrap();
    let layout = GridLayout {
        nx: 2,
        ny: 3,
        cell_fov_arcmin: 15.0,
        sky_center: RADec::new(30.0, 45.0),
    };

    let indices = run_group(2, |comm| {
        let mut visited = vec![];
        let index = write_grid_catalog(&layout, prefix, &comm, false, |cell| {
            visited.push(cell.index);
            // Each rank contributes one event at the cell centre.
            EventList::new(
                params(),
                vec![cell.center.ra],
                vec![cell.center.dec],
                vec![1.0 + comm.rank() as f64],
            )
        })
        .unwrap();
        assert_eq!(visited, (0..6).collect::<Vec<_>>());
        index
    });
    assert_eq!(indices[0], dir.path().join("grid_grid.txt"));

    assert_eq!(
        catalog_ids(&dir.path().join("grid_simput.fits")),
        vec![1, 2, 3, 4, 5, 6]
    );
    let index = fs::read_to_string(&indices[0]).unwrap();
    let lines: Vec<&str> = index.lines().collect();
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[0], format!("# {prefix}_simput.fits"));
    let cells = layout.cells();
    for (k, line) in lines[1..].iter().enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        let cell = &cells[k];
        assert_eq!(fields[0], k.to_string());
        assert_eq!(
            fields[1],
            format!("{prefix}_{}_{}_phlist.fits", cell.i, cell.j)
        );
        assert_eq!(fields[2], format!("{:.2}", cell.center.ra));
        assert_eq!(fields[3], format!("{:.2}", cell.center.dec));
    }

    // Both ranks' events made it into every photon list.
    let mut f = FitsFile::open(format!("{prefix}_1_2_phlist.fits")).unwrap();
    let hdu = f.hdu("PHLIST").unwrap();
    let energy: Vec<f32> = hdu.read_col(&mut f, "ENERGY").unwrap();
    assert_eq!(energy, vec![1.0, 2.0]);
}
