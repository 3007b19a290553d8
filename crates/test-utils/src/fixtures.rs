//! Common scene fixtures.

use goes_common::{Channel, CoarsenFactor, Domain, GeometryTable, Satellite, SceneRequest, TimePoint};

/// Native shape used by fixture geometries in place of the real ABI grids.
pub const SMALL_NATIVE: (usize, usize) = (8, 8);

/// A fixed 8x8 geometry so tests do not allocate full-disk rasters.
pub fn small_geometry() -> GeometryTable {
    GeometryTable::fixed(SMALL_NATIVE.0, SMALL_NATIVE.1)
}

/// GOES-East full-disk clean-IR request at the given time.
pub fn scene_request(year: i32, month: u32, day: u32, hour: u32, coarsen: CoarsenFactor) -> SceneRequest {
    SceneRequest {
        satellite: Satellite::East,
        domain: Domain::FullDisk,
        channel: Channel::try_from(13u8).unwrap_or_else(|e| panic!("{}", e)),
        coarsen,
        time: TimePoint::new(year, month, day, hour, 0).unwrap_or_else(|e| panic!("{}", e)),
    }
}

/// The request used by most single-scene tests: 2019-03-01 17:00Z, x2.
pub fn sample_request() -> SceneRequest {
    scene_request(2019, 3, 1, 17, CoarsenFactor::X2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_request_key() {
        assert_eq!(
            sample_request().cache_key(),
            "east/full-disk/C13/x2/2019/03/01/1700.grst"
        );
    }

    #[test]
    fn test_small_geometry_coarsens() {
        let shape = small_geometry().expected_shape(&sample_request());
        assert_eq!((shape.height, shape.width), (4, 4));
    }
}
