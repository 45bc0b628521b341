// Calibrated target speeds per track and direction (percent)
//
// The live table is edited in place while calibrating; it is never swapped for
// a new one, so everything reading it through the system context sees edits.

use serde::{Deserialize, Serialize};

use crate::motor::Mode;

/// Incline track, one motor each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    A,
    B,
}

impl Track {
    pub fn label(self) -> char {
        match self {
            Track::A => 'A',
            Track::B => 'B',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackSpeeds {
    #[serde(rename = "F")]
    pub forward: u8,
    #[serde(rename = "R")]
    pub reverse: u8,
}

impl TrackSpeeds {
    pub fn new(forward: u8, reverse: u8) -> Self {
        Self { forward, reverse }
    }

    /// Target percentage for a channel mode; 0 when stopped
    pub fn for_mode(&self, mode: Mode) -> u8 {
        match mode {
            Mode::Forward => self.forward,
            Mode::Reverse => self.reverse,
            Mode::Stop => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalibrationTable {
    #[serde(rename = "a_speed")]
    pub track_a: TrackSpeeds,
    #[serde(rename = "b_speed")]
    pub track_b: TrackSpeeds,
}

impl CalibrationTable {
    pub fn new(track_a: TrackSpeeds, track_b: TrackSpeeds) -> Self {
        Self { track_a, track_b }
    }

    pub fn track(&self, track: Track) -> &TrackSpeeds {
        match track {
            Track::A => &self.track_a,
            Track::B => &self.track_b,
        }
    }

    pub fn track_mut(&mut self, track: Track) -> &mut TrackSpeeds {
        match track {
            Track::A => &mut self.track_a,
            Track::B => &mut self.track_b,
        }
    }

    /// Copy every forward/reverse value from `source` into this table
    pub fn load_from(&mut self, source: &CalibrationTable) {
        for track in [Track::A, Track::B] {
            let src = source.track(track);
            let dst = self.track_mut(track);
            dst.forward = src.forward;
            dst.reverse = src.reverse;
        }
    }

    /// First value above 100 %, as `(field, value)`
    pub fn out_of_range(&self) -> Option<(&'static str, u8)> {
        [
            ("a_speed.F", self.track_a.forward),
            ("a_speed.R", self.track_a.reverse),
            ("b_speed.F", self.track_b.forward),
            ("b_speed.R", self.track_b.reverse),
        ]
        .into_iter()
        .find(|&(_, pc)| pc > 100)
    }
}
