//! Scene identification: satellite, sector, band, coarsening and time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::time::{TimeOfDay, TimePoint};

/// Geostationary satellite position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Satellite {
    East,
    West,
}

impl Satellite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Satellite::East => "east",
            Satellite::West => "west",
        }
    }

    /// Longitude of the sub-satellite point in degrees (negative west).
    pub fn nadir_longitude(&self) -> f64 {
        match self {
            Satellite::East => -75.2,
            Satellite::West => -137.2,
        }
    }

    /// UTC hour closest to local solar noon at the nadir longitude.
    ///
    /// East (75.2°W) gives 17 UTC, West (137.2°W) gives 21 UTC.
    pub fn local_noon_utc(&self) -> TimeOfDay {
        let hour = (12.0 - self.nadir_longitude() / 15.0).round() as i64;
        TimeOfDay {
            hour: hour.rem_euclid(24) as u32,
            minute: 0,
        }
    }
}

impl fmt::Display for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Satellite {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "east" | "goes-east" | "goes16" | "goes19" => Ok(Satellite::East),
            "west" | "goes-west" | "goes17" | "goes18" => Ok(Satellite::West),
            other => Err(PipelineError::invalid_spec(format!(
                "satellite must be 'east' or 'west', got '{}'",
                other
            ))),
        }
    }
}

/// Imaged sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    FullDisk,
    Conus,
    Mesoscale1,
    Mesoscale2,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::FullDisk => "full-disk",
            Domain::Conus => "conus",
            Domain::Mesoscale1 => "mesoscale-1",
            Domain::Mesoscale2 => "mesoscale-2",
        }
    }

    /// ABI L2 CMI product name for this sector.
    pub fn product(&self) -> &'static str {
        match self {
            Domain::FullDisk => "ABI-L2-CMIPF",
            Domain::Conus => "ABI-L2-CMIPC",
            Domain::Mesoscale1 | Domain::Mesoscale2 => "ABI-L2-CMIPM",
        }
    }

    /// Token that identifies the sector inside an archive file name.
    pub fn file_token(&self) -> &'static str {
        match self {
            Domain::FullDisk => "CMIPF-",
            Domain::Conus => "CMIPC-",
            Domain::Mesoscale1 => "CMIPM1-",
            Domain::Mesoscale2 => "CMIPM2-",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f" | "full-disk" | "fulldisk" => Ok(Domain::FullDisk),
            "c" | "conus" => Ok(Domain::Conus),
            "m1" | "mesoscale-1" => Ok(Domain::Mesoscale1),
            "m2" | "mesoscale-2" => Ok(Domain::Mesoscale2),
            other => Err(PipelineError::invalid_spec(format!("unknown domain '{}'", other))),
        }
    }
}

/// ABI band number (1-16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
    pub fn new(band: u8) -> PipelineResult<Self> {
        if (1..=16).contains(&band) {
            Ok(Self(band))
        } else {
            Err(PipelineError::invalid_spec(format!(
                "channel must be 1-16, got {}",
                band
            )))
        }
    }

    pub fn band(&self) -> u8 {
        self.0
    }

    /// Native pixels per 2 km pixel along each axis.
    ///
    /// C02 is 0.5 km, C01/C03/C05 are 1 km, everything else is 2 km.
    pub fn resolution_multiplier(&self) -> usize {
        match self.0 {
            2 => 4,
            1 | 3 | 5 => 2,
            _ => 1,
        }
    }
}

impl TryFrom<u8> for Channel {
    type Error = PipelineError;

    fn try_from(band: u8) -> Result<Self, Self::Error> {
        Channel::new(band)
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{:02}", self.0)
    }
}

/// Integer spatial coarsening factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum CoarsenFactor {
    X1,
    X2,
    X4,
    X8,
}

impl CoarsenFactor {
    pub fn get(&self) -> usize {
        match self {
            CoarsenFactor::X1 => 1,
            CoarsenFactor::X2 => 2,
            CoarsenFactor::X4 => 4,
            CoarsenFactor::X8 => 8,
        }
    }
}

impl TryFrom<u32> for CoarsenFactor {
    type Error = PipelineError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CoarsenFactor::X1),
            2 => Ok(CoarsenFactor::X2),
            4 => Ok(CoarsenFactor::X4),
            8 => Ok(CoarsenFactor::X8),
            other => Err(PipelineError::invalid_spec(format!(
                "coarsening factor must be 1, 2, 4 or 8, got {}",
                other
            ))),
        }
    }
}

impl From<CoarsenFactor> for u32 {
    fn from(factor: CoarsenFactor) -> Self {
        factor.get() as u32
    }
}

/// Everything needed to identify one cached scene.
///
/// Two requests with identical fields always resolve to the same cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SceneRequest {
    pub satellite: Satellite,
    pub domain: Domain,
    pub channel: Channel,
    pub coarsen: CoarsenFactor,
    pub time: TimePoint,
}

impl SceneRequest {
    /// Deterministic cache key, laid out as a path hierarchy:
    /// `east/full-disk/C13/x2/2019/03/01/1700.grst`
    pub fn cache_key(&self) -> String {
        format!(
            "{}/{}/{}/x{}/{}.grst",
            self.satellite,
            self.domain,
            self.channel,
            self.coarsen.get(),
            self.time.storage_path()
        )
    }

    /// The same request at native resolution.
    pub fn native(&self) -> Self {
        Self {
            coarsen: CoarsenFactor::X1,
            ..*self
        }
    }
}

impl fmt::Display for SceneRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} x{} @ {}",
            self.satellite,
            self.domain,
            self.channel,
            self.coarsen.get(),
            self.time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SceneRequest {
        SceneRequest {
            satellite: Satellite::East,
            domain: Domain::FullDisk,
            channel: Channel::new(13).unwrap(),
            coarsen: CoarsenFactor::X2,
            time: TimePoint::new(2019, 3, 1, 17, 0).unwrap(),
        }
    }

    #[test]
    fn test_cache_key_layout() {
        assert_eq!(request().cache_key(), "east/full-disk/C13/x2/2019/03/01/1700.grst");
    }

    #[test]
    fn test_coarsen_factor_is_part_of_key() {
        let coarse = request();
        let native = coarse.native();
        assert_ne!(coarse.cache_key(), native.cache_key());
    }

    #[test]
    fn test_local_noon() {
        assert_eq!(Satellite::East.local_noon_utc().hour, 17);
        assert_eq!(Satellite::West.local_noon_utc().hour, 21);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("F".parse::<Domain>().unwrap(), Domain::FullDisk);
        assert_eq!("M2".parse::<Domain>().unwrap(), Domain::Mesoscale2);
        assert_eq!("East".parse::<Satellite>().unwrap(), Satellite::East);
        assert!("north".parse::<Satellite>().is_err());
    }

    #[test]
    fn test_coarsen_factor_validation() {
        assert!(CoarsenFactor::try_from(3).is_err());
        assert_eq!(CoarsenFactor::try_from(8).unwrap().get(), 8);
    }

    #[test]
    fn test_request_serde_roundtrip_keeps_key() {
        let json = serde_json::to_string(&request()).unwrap();
        let back: SceneRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cache_key(), request().cache_key());
    }
}
