//! Lists of detected events, and combining them across partitions.

use itertools::{izip, Itertools};
use log::{debug, warn};

use crate::{comm::Communicator, wcs::RADec, EventError};

/// keV to erg.
pub const KEV_TO_ERG: f64 = 1.602_176_634e-9;

/// Parameters that must agree (to this absolute tolerance) before two event
/// lists can be combined.
const PARAMETER_ATOL: f64 = 1e-10;

/// The physical parameters attached to an [`EventList`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventParameters {
    /// The exposure time \[seconds\].
    pub exposure_time: f64,

    /// The collecting area \[cm^2\].
    pub area: f64,

    /// The centre of the observation on the sky.
    pub sky_center: RADec,

    /// The lower bound of the simulated energy band \[keV\], if there is one.
    pub emin: Option<f64>,

    /// The upper bound of the simulated energy band \[keV\], if there is one.
    pub emax: Option<f64>,
}

/// The parameters compared by [`EventParameters::check_compatible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    ExposureTime,
    Area,
    SkyCenter,
    EnergyBounds,
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Parameter::ExposureTime => "exposure_time",
            Parameter::Area => "area",
            Parameter::SkyCenter => "sky_center",
            Parameter::EnergyBounds => "energy bounds",
        };
        f.write_str(name)
    }
}

impl EventParameters {
    pub fn new(exposure_time: f64, area: f64, sky_center: RADec) -> EventParameters {
        EventParameters {
            exposure_time,
            area,
            sky_center,
            emin: None,
            emax: None,
        }
    }

    pub fn with_energy_bounds(self, emin: f64, emax: f64) -> EventParameters {
        EventParameters {
            emin: Some(emin),
            emax: Some(emax),
            ..self
        }
    }

    /// Check that `self` and `other` describe the same observation. Anything
    /// in `skip` is not compared.
    pub fn check_compatible(
        &self,
        other: &EventParameters,
        skip: &[Parameter],
    ) -> Result<(), EventError> {
        fn close(a: f64, b: f64) -> bool {
            (a - b).abs() <= PARAMETER_ATOL
        }
        fn close_opt(a: Option<f64>, b: Option<f64>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => close(a, b),
                (None, None) => true,
                _ => false,
            }
        }

        let checks = [
            (
                Parameter::ExposureTime,
                close(self.exposure_time, other.exposure_time),
                format!("{} s", self.exposure_time),
                format!("{} s", other.exposure_time),
            ),
            (
                Parameter::Area,
                close(self.area, other.area),
                format!("{} cm^2", self.area),
                format!("{} cm^2", other.area),
            ),
            (
                Parameter::SkyCenter,
                close(self.sky_center.ra, other.sky_center.ra)
                    && close(self.sky_center.dec, other.sky_center.dec),
                self.sky_center.to_string(),
                other.sky_center.to_string(),
            ),
            (
                Parameter::EnergyBounds,
                close_opt(self.emin, other.emin) && close_opt(self.emax, other.emax),
                format!("{:?}..{:?}", self.emin, self.emax),
                format!("{:?}..{:?}", other.emin, other.emax),
            ),
        ];

        for (parameter, ok, left, right) in checks {
            if !ok && !skip.contains(&parameter) {
                return Err(EventError::Incompatible {
                    parameter,
                    left,
                    right,
                });
            }
        }
        Ok(())
    }
}

/// Events held by this partition: a column per event property, all of the
/// same length.
#[derive(Debug, Clone, PartialEq)]
pub struct EventList {
    /// Fixed once the list is built.
    parameters: EventParameters,

    /// Right ascension of each event \[degrees\].
    sky_x: Vec<f64>,

    /// Declination of each event \[degrees\].
    sky_y: Vec<f64>,

    /// Observed energy of each event \[keV\].
    energy: Vec<f64>,

    /// Instrument channel (PI/PHA) of each event. Only present for events that
    /// went through an instrument model.
    channel: Option<Vec<i32>>,
}

impl EventList {
    pub fn new(
        parameters: EventParameters,
        sky_x: Vec<f64>,
        sky_y: Vec<f64>,
        energy: Vec<f64>,
    ) -> Result<EventList, EventError> {
        let expected = sky_x.len();
        for (column, len) in [("sky_y", sky_y.len()), ("observed_energy", energy.len())] {
            if len != expected {
                return Err(EventError::ColumnLength {
                    column,
                    len,
                    expected,
                });
            }
        }
        Ok(EventList {
            parameters,
            sky_x,
            sky_y,
            energy,
            channel: None,
        })
    }

    pub fn empty(parameters: EventParameters) -> EventList {
        EventList {
            parameters,
            sky_x: vec![],
            sky_y: vec![],
            energy: vec![],
            channel: None,
        }
    }

    /// Attach instrument channels to the events.
    pub fn with_channel(self, channel: Vec<i32>) -> Result<EventList, EventError> {
        if channel.len() != self.len() {
            return Err(EventError::ColumnLength {
                column: "channel",
                len: channel.len(),
                expected: self.len(),
            });
        }
        Ok(EventList {
            channel: Some(channel),
            ..self
        })
    }

    pub fn parameters(&self) -> &EventParameters {
        &self.parameters
    }

    /// The number of events held by this partition.
    pub fn len(&self) -> usize {
        self.sky_x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sky_x.is_empty()
    }

    /// The number of events across all partitions.
    pub fn num_events(&self, comm: &dyn Communicator) -> Result<u64, EventError> {
        Ok(comm.all_reduce_sum(self.len() as u64)?)
    }

    pub fn sky_x(&self) -> &[f64] {
        &self.sky_x
    }

    pub fn sky_y(&self) -> &[f64] {
        &self.sky_y
    }

    pub fn energy(&self) -> &[f64] {
        &self.energy
    }

    pub fn channel(&self) -> Option<&[i32]> {
        self.channel.as_deref()
    }

    /// Collect every partition's events on the root, in rank order. The root
    /// gets the whole event list (with its own parameters), the other ranks get
    /// `None`. This is a collective call.
    pub fn gather(&self, comm: &dyn Communicator) -> Result<Option<EventList>, EventError> {
        let sky_x = comm.gather_f64(&self.sky_x)?;
        let sky_y = comm.gather_f64(&self.sky_y)?;
        let energy = comm.gather_f64(&self.energy)?;

        // Every rank has to take part in the channel gather, or none. Empty
        // partitions fit either schema.
        let with_channel = comm.all_reduce_sum(u64::from(self.channel.is_some()))?;
        let without_channel =
            comm.all_reduce_sum(u64::from(self.channel.is_none() && !self.is_empty()))?;
        if with_channel > 0 && without_channel > 0 {
            return Err(EventError::SchemaMismatch("channel"));
        }
        let channel = if with_channel > 0 {
            comm.gather_i32(self.channel.as_deref().unwrap_or(&[]))?
        } else {
            None
        };

        let (sky_x, sky_y, energy) = match (sky_x, sky_y, energy) {
            (Some(x), Some(y), Some(e)) => (x, y, e),
            _ => return Ok(None),
        };
        debug!(
            "Gathered {} events from {} partition(s)",
            sky_x.len(),
            comm.size()
        );
        let events = EventList::new(self.parameters.clone(), sky_x, sky_y, energy)?;
        Ok(Some(match channel {
            Some(c) => events.with_channel(c)?,
            None => events,
        }))
    }

    /// Concatenate `self` and `other` (in that order) after checking that they
    /// describe the same observation; parameters in `skip` may differ. The
    /// result carries `self`'s parameters.
    pub fn merge(&self, other: &EventList, skip: &[Parameter]) -> Result<EventList, EventError> {
        self.parameters.check_compatible(&other.parameters, skip)?;

        let channel = match (&self.channel, &other.channel) {
            (Some(a), Some(b)) => Some([a.as_slice(), b.as_slice()].concat()),
            (None, None) => None,
            _ => return Err(EventError::SchemaMismatch("channel")),
        };
        Ok(EventList {
            parameters: self.parameters.clone(),
            sky_x: [self.sky_x.as_slice(), other.sky_x.as_slice()].concat(),
            sky_y: [self.sky_y.as_slice(), other.sky_y.as_slice()].concat(),
            energy: [self.energy.as_slice(), other.energy.as_slice()].concat(),
            channel,
        })
    }

    /// Which events have `emin < energy < emax`? A missing bound doesn't
    /// restrict that side.
    pub fn energy_mask(&self, emin: Option<f64>, emax: Option<f64>) -> Vec<bool> {
        self.energy
            .iter()
            .map(|&e| emin.map_or(true, |lo| e > lo) && emax.map_or(true, |hi| e < hi))
            .collect()
    }

    /// The events with `emin <= energy <= emax` and their energy flux. With
    /// neither bound, every event is selected.
    pub fn select_energy_range(&self, emin: Option<f64>, emax: Option<f64>) -> SimputSelection {
        SimputSelection::new(
            self,
            self.parameters.exposure_time,
            self.parameters.area,
            emin,
            emax,
        )
    }
}

/// Events chosen for a SIMPUT photon list.
#[derive(Debug, Clone, PartialEq)]
pub struct SimputSelection {
    /// Energy flux of the selected events \[erg/s/cm^2\].
    pub flux: f64,

    /// \[degrees\]
    pub ra: Vec<f64>,

    /// \[degrees\]
    pub dec: Vec<f64>,

    /// \[keV\]
    pub energy: Vec<f64>,
}

impl SimputSelection {
    /// Select the events of `events` in the inclusive band `[emin, emax]`, and
    /// turn their summed energy into a flux over `exposure_time` \[s\] and `area`
    /// \[cm^2\].
    pub(crate) fn new(
        events: &EventList,
        exposure_time: f64,
        area: f64,
        emin: Option<f64>,
        emax: Option<f64>,
    ) -> SimputSelection {
        let mut ra = Vec::with_capacity(events.len());
        let mut dec = Vec::with_capacity(events.len());
        let mut energy = Vec::with_capacity(events.len());
        for (&x, &y, &e) in izip!(&events.sky_x, &events.sky_y, &events.energy) {
            if emin.map_or(true, |lo| e >= lo) && emax.map_or(true, |hi| e <= hi) {
                ra.push(x);
                dec.push(y);
                energy.push(e);
            }
        }
        if energy.is_empty() && !events.is_empty() {
            warn!("No events fall in the energy band {emin:?}..{emax:?} keV");
        }

        let flux = energy.iter().sum::<f64>() * KEV_TO_ERG / exposure_time / area;
        SimputSelection {
            flux,
            ra,
            dec,
            energy,
        }
    }

    /// The lowest and highest selected energies \[keV\]; zeros when nothing was
    /// selected.
    pub fn energy_range(&self) -> (f64, f64) {
        self.energy
            .iter()
            .copied()
            .minmax()
            .into_option()
            .unwrap_or((0.0, 0.0))
    }
}
