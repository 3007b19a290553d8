//! Expected raster shapes per scene request.

use serde::{Deserialize, Serialize};

use crate::raster::RasterShape;
use crate::scene::{Domain, SceneRequest};

/// Maps a scene request to the raster shape it must have.
///
/// Every raster for the same (domain, channel, coarsening) shares one shape;
/// decoders and the cache both check against this table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeometryTable {
    /// ABI fixed grids: 2 km base shapes scaled by band resolution.
    #[default]
    Abi,
    /// One native shape for every domain and channel.
    Fixed { height: usize, width: usize },
}

impl GeometryTable {
    pub fn fixed(height: usize, width: usize) -> Self {
        GeometryTable::Fixed { height, width }
    }

    /// Native (uncoarsened) shape for a request.
    pub fn native_shape(&self, request: &SceneRequest) -> RasterShape {
        match self {
            GeometryTable::Abi => {
                let base = abi_base_shape(request.domain);
                let m = request.channel.resolution_multiplier();
                RasterShape::new(base.height * m, base.width * m)
            }
            GeometryTable::Fixed { height, width } => RasterShape::new(*height, *width),
        }
    }

    /// Shape of the (possibly coarsened) raster stored for a request.
    pub fn expected_shape(&self, request: &SceneRequest) -> RasterShape {
        self.native_shape(request).coarsened(request.coarsen.get())
    }
}

/// 2 km shapes of the ABI sectors.
fn abi_base_shape(domain: Domain) -> RasterShape {
    match domain {
        Domain::FullDisk => RasterShape::new(5424, 5424),
        Domain::Conus => RasterShape::new(1500, 2500),
        Domain::Mesoscale1 | Domain::Mesoscale2 => RasterShape::new(500, 500),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Channel, CoarsenFactor, Satellite};
    use crate::time::TimePoint;

    fn request(domain: Domain, band: u8, coarsen: CoarsenFactor) -> SceneRequest {
        SceneRequest {
            satellite: Satellite::East,
            domain,
            channel: Channel::new(band).unwrap(),
            coarsen,
            time: TimePoint::new(2020, 3, 1, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_abi_shapes() {
        let table = GeometryTable::Abi;
        assert_eq!(
            table.expected_shape(&request(Domain::FullDisk, 13, CoarsenFactor::X1)),
            RasterShape::new(5424, 5424)
        );
        assert_eq!(
            table.expected_shape(&request(Domain::FullDisk, 13, CoarsenFactor::X2)),
            RasterShape::new(2712, 2712)
        );
        assert_eq!(
            table.expected_shape(&request(Domain::Conus, 2, CoarsenFactor::X1)),
            RasterShape::new(6000, 10000)
        );
        assert_eq!(
            table.expected_shape(&request(Domain::Mesoscale1, 1, CoarsenFactor::X8)),
            RasterShape::new(125, 125)
        );
    }

    #[test]
    fn test_fixed_geometry_coarsens() {
        let table = GeometryTable::fixed(5, 5);
        assert_eq!(
            table.expected_shape(&request(Domain::Conus, 13, CoarsenFactor::X2)),
            RasterShape::new(3, 3)
        );
    }
}
