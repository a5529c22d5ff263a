//! Gnomonic (`RA---TAN`/`DEC--TAN`) projection between the sky and a square
//! pixel grid, following the FITS WCS conventions: pixels are 1-indexed, and
//! the reference pixel sits in the middle of the grid.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("the field of view must be positive and finite, but got {0} arcmin")]
    ZeroFieldOfView(f64),

    #[error("a pixel grid needs at least one pixel on a side")]
    ZeroPixels,
}

/// A position on the sky. Both coordinates are in \[degrees\].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RADec {
    pub ra: f64,
    pub dec: f64,
}

impl RADec {
    pub fn new(ra: f64, dec: f64) -> RADec {
        RADec { ra, dec }
    }
}

impl std::fmt::Display for RADec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.ra, self.dec)
    }
}

/// Tangent-plane offsets (ξ, η) \[radians\] of `pos` relative to `center`. ξ
/// increases toward increasing RA, η toward increasing Dec. Positions on the
/// far side of the sky from `center` give NaNs.
pub fn sky_to_offset(pos: RADec, center: RADec) -> (f64, f64) {
    let (s_dec0, c_dec0) = center.dec.to_radians().sin_cos();
    let (s_dec, c_dec) = pos.dec.to_radians().sin_cos();
    let (s_dra, c_dra) = (pos.ra - center.ra).to_radians().sin_cos();

    let cos_c = s_dec0 * s_dec + c_dec0 * c_dec * c_dra;
    if cos_c <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let xi = c_dec * s_dra / cos_c;
    let eta = (c_dec0 * s_dec - s_dec0 * c_dec * c_dra) / cos_c;
    (xi, eta)
}

/// The inverse of [`sky_to_offset`]: where on the sky do the tangent-plane
/// offsets (ξ, η) \[radians\] about `center` land? RA is wrapped into [0, 360).
pub fn offset_to_sky(xi: f64, eta: f64, center: RADec) -> RADec {
    let rho = xi.hypot(eta);
    if rho == 0.0 {
        return center;
    }
    let c = rho.atan();
    let (s_c, c_c) = c.sin_cos();
    let (s_dec0, c_dec0) = center.dec.to_radians().sin_cos();

    let dec = (c_c * s_dec0 + eta * s_c * c_dec0 / rho).asin();
    let dra = (xi * s_c).atan2(rho * c_dec0 * c_c - eta * s_dec0 * s_c);
    RADec {
        ra: (center.ra + dra.to_degrees()).rem_euclid(360.0),
        dec: dec.to_degrees(),
    }
}

/// A 2D TAN world coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct TanProjection {
    /// The sky position of the reference pixel.
    pub crval: RADec,

    /// The (1-indexed) reference pixel on each axis.
    pub crpix: [f64; 2],

    /// The size of a pixel on each axis \[degrees\]. The first is negative
    /// for the usual "RA increases to the left" orientation.
    pub cdelt: [f64; 2],
}

impl TanProjection {
    pub fn new(crval: RADec, crpix: [f64; 2], cdelt: [f64; 2]) -> TanProjection {
        TanProjection {
            crval,
            crpix,
            cdelt,
        }
    }

    /// The projection of an `nx` × `nx` grid spanning `fov_arcmin` on a side,
    /// centred on `center`.
    pub fn for_field(
        center: RADec,
        fov_arcmin: f64,
        nx: usize,
    ) -> Result<TanProjection, ProjectionError> {
        if !(fov_arcmin.is_finite() && fov_arcmin > 0.0) {
            return Err(ProjectionError::ZeroFieldOfView(fov_arcmin));
        }
        if nx == 0 {
            return Err(ProjectionError::ZeroPixels);
        }
        let dtheta = fov_arcmin / 60.0 / nx as f64;
        let crpix = 0.5 * (nx as f64 + 1.0);
        Ok(TanProjection {
            crval: center,
            crpix: [crpix, crpix],
            cdelt: [-dtheta, dtheta],
        })
    }

    /// The size of a pixel \[degrees\].
    pub fn pixel_scale(&self) -> f64 {
        self.cdelt[1].abs()
    }

    /// Sky to pixel. Positions that can't be projected give NaNs.
    pub fn world_to_pixel(&self, ra: f64, dec: f64) -> (f64, f64) {
        let (xi, eta) = sky_to_offset(RADec { ra, dec }, self.crval);
        (
            self.crpix[0] + xi.to_degrees() / self.cdelt[0],
            self.crpix[1] + eta.to_degrees() / self.cdelt[1],
        )
    }

    /// Pixel to sky.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> (f64, f64) {
        let xi = ((x - self.crpix[0]) * self.cdelt[0]).to_radians();
        let eta = ((y - self.crpix[1]) * self.cdelt[1]).to_radians();
        let pos = offset_to_sky(xi, eta, self.crval);
        (pos.ra, pos.dec)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn reference_pixel_is_sky_center() {
        let proj = TanProjection::for_field(RADec::new(30.0, 45.0), 20.0, 256).unwrap();
        let (x, y) = proj.world_to_pixel(30.0, 45.0);
        assert_abs_diff_eq!(x, 128.5, epsilon = 1e-10);
        assert_abs_diff_eq!(y, 128.5, epsilon = 1e-10);
        assert_abs_diff_eq!(proj.pixel_scale(), 20.0 / 60.0 / 256.0, epsilon = 1e-15);
    }

    #[test]
    fn first_axis_decreases_with_ra() {
        let proj = TanProjection::for_field(RADec::new(30.0, 45.0), 20.0, 256).unwrap();
        let (x_east, _) = proj.world_to_pixel(30.05, 45.0);
        let (x_west, _) = proj.world_to_pixel(29.95, 45.0);
        assert!(x_east < 128.5);
        assert!(x_west > 128.5);
        let (_, y_north) = proj.world_to_pixel(30.0, 45.05);
        assert!(y_north > 128.5);
    }

    #[test]
    fn pixel_world_round_trip() {
        let proj = TanProjection::for_field(RADec::new(359.9, -30.0), 60.0, 100).unwrap();
        for &(x, y) in &[(1.0, 1.0), (50.5, 50.5), (100.0, 3.25), (0.5, 100.5)] {
            let (ra, dec) = proj.pixel_to_world(x, y);
            let (x2, y2) = proj.world_to_pixel(ra, dec);
            assert_abs_diff_eq!(x, x2, epsilon = 1e-8);
            assert_abs_diff_eq!(y, y2, epsilon = 1e-8);
        }
    }

    #[test]
    fn offsets_round_trip() {
        let center = RADec::new(0.1, 60.0);
        let zero = offset_to_sky(0.0, 0.0, center);
        assert_eq!(zero, center);

        let pos = offset_to_sky(-0.01, 0.02, center);
        // Negative ξ is west of the centre, which wraps through RA = 0.
        assert!(pos.ra > 358.0 && pos.ra < 360.0);
        let (xi, eta) = sky_to_offset(pos, center);
        assert_abs_diff_eq!(xi, -0.01, epsilon = 1e-12);
        assert_abs_diff_eq!(eta, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn far_side_of_the_sky_is_nan() {
        let proj = TanProjection::for_field(RADec::new(0.0, 0.0), 10.0, 10).unwrap();
        let (x, y) = proj.world_to_pixel(180.0, 0.0);
        assert!(x.is_nan() && y.is_nan());
    }

    #[test]
    fn degenerate_fields_fail_fast() {
        let c = RADec::default();
        assert!(matches!(
            TanProjection::for_field(c, 0.0, 10),
            Err(ProjectionError::ZeroFieldOfView(_))
        ));
        assert!(matches!(
            TanProjection::for_field(c, f64::NAN, 10),
            Err(ProjectionError::ZeroFieldOfView(_))
        ));
        assert!(matches!(
            TanProjection::for_field(c, 1.0, 0),
            Err(ProjectionError::ZeroPixels)
        ));
    }
}
