#![allow(dead_code)]

use std::thread::scope;

use xevents::{EventList, EventParameters, RADec, TanProjection, ThreadComm};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Run `f` on every rank of a `size`-rank [`ThreadComm`] group, one thread per
/// rank, and collect the results in rank order.
pub fn run_group<T: Send, F>(size: usize, f: F) -> Vec<T>
where
    F: Fn(ThreadComm) -> T + Sync,
{
    let group = ThreadComm::group(size).unwrap();
    scope(|s| {
        let handles: Vec<_> = group
            .into_iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

pub fn params() -> EventParameters {
    EventParameters::new(5.0e4, 3.0e3, RADec::new(30.0, 45.0))
}

/// Events `energies` \[keV\] placed at (1-indexed) `pixels` of `projection`.
pub fn events_at_pixels(
    projection: &TanProjection,
    pixels: &[(f64, f64)],
    energies: &[f64],
) -> EventList {
    let (ra, dec): (Vec<f64>, Vec<f64>) = pixels
        .iter()
        .map(|&(x, y)| projection.pixel_to_world(x, y))
        .unzip();
    EventList::new(params(), ra, dec, energies.to_vec()).unwrap()
}

/// A deterministic scatter of `n` events around the sky centre.
pub fn scattered_events(n: usize, seed: usize) -> EventList {
    let center = params().sky_center;
    let ra = (0..n)
        .map(|i| center.ra + 0.01 * (((i + seed) * 37 % 101) as f64 / 101.0 - 0.5))
        .collect();
    let dec = (0..n)
        .map(|i| center.dec + 0.01 * (((i + seed) * 53 % 97) as f64 / 97.0 - 0.5))
        .collect();
    let energy = (0..n)
        .map(|i| 0.5 + ((i + seed) % 19) as f64 * 0.5)
        .collect();
    EventList::new(params(), ra, dec, energy).unwrap()
}
