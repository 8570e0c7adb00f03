use crate::data::Eye;
use log::info;

/// Tangents of the half-angles of an eye frustum, as reported by the VR runtime.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RawProjection {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

/// Normalized on-screen position of an eye's optical axis.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ProjectionCenter {
    pub x: f32,
    pub y: f32,
}

impl Default for ProjectionCenter {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

// Queries the host forwards to the VR runtime
pub trait VrSystem {
    fn projection_raw(&self, eye: Eye) -> RawProjection;

    // Row-major 3x4 eye-to-head matrix
    fn eye_to_head_transform(&self, eye: Eye) -> [[f32; 4]; 3];
}

// Half of the angle between the two eye forward axes (third matrix row)
pub fn canted_angle(left_eye_to_head: &[[f32; 4]; 3], right_eye_to_head: &[[f32; 4]; 3]) -> f32 {
    let l = &left_eye_to_head[2];
    let r = &right_eye_to_head[2];
    let dot_forward = l[0] * r[0] + l[1] * r[1] + l[2] * r[2];

    (dot_forward.max(-1.).min(1.).acos() / 2.).abs()
}

pub fn projection_center(eye: Eye, raw: &RawProjection, canted_angle: f32) -> ProjectionCenter {
    let signed_angle = if eye == Eye::Right {
        -canted_angle
    } else {
        canted_angle
    };
    let canted = signed_angle.tan();

    ProjectionCenter {
        x: 0.5 * (1. + (raw.right + raw.left - 2. * canted) / (raw.left - raw.right)),
        y: 0.5 * (1. + (raw.bottom + raw.top) / (raw.top - raw.bottom)),
    }
}

// Computed once per resource generation
pub fn compute_projection_centers(system: &dyn VrSystem) -> [ProjectionCenter; 2] {
    let angle = canted_angle(
        &system.eye_to_head_transform(Eye::Left),
        &system.eye_to_head_transform(Eye::Right),
    );
    info!("Display is canted by {} RAD", angle);

    let mut centers = [ProjectionCenter::default(); 2];
    for &eye in [Eye::Left, Eye::Right].iter() {
        let raw = system.projection_raw(eye);
        info!(
            "Raw projection for eye {:?}: l {}, r {}, t {}, b {}",
            eye, raw.left, raw.right, raw.top, raw.bottom
        );

        let center = projection_center(eye, &raw, angle);
        info!("Projection center for eye {:?}: {}, {}", eye, center.x, center.y);
        centers[eye.index()] = center;
    }

    centers
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const IDENTITY: [[f32; 4]; 3] = [[1., 0., 0., -0.032], [0., 1., 0., 0.], [0., 0., 1., 0.]];

    pub struct FixedVrSystem {
        pub projections: [RawProjection; 2],
        pub eye_to_head: [[[f32; 4]; 3]; 2],
    }

    impl FixedVrSystem {
        pub fn symmetric() -> Self {
            Self {
                projections: [
                    RawProjection {
                        left: -1.39,
                        right: 1.24,
                        top: -1.47,
                        bottom: 1.46,
                    },
                    RawProjection {
                        left: -1.24,
                        right: 1.39,
                        top: -1.47,
                        bottom: 1.46,
                    },
                ],
                eye_to_head: [IDENTITY, IDENTITY],
            }
        }
    }

    impl VrSystem for FixedVrSystem {
        fn projection_raw(&self, eye: Eye) -> RawProjection {
            self.projections[eye.index()]
        }

        fn eye_to_head_transform(&self, eye: Eye) -> [[f32; 4]; 3] {
            self.eye_to_head[eye.index()]
        }
    }

    fn rotation_y(angle: f32) -> [[f32; 4]; 3] {
        let (s, c) = angle.sin_cos();
        [[c, 0., s, 0.], [0., 1., 0., 0.], [-s, 0., c, 0.]]
    }

    #[test]
    fn uncanted_centers_are_mirrored() {
        let centers = compute_projection_centers(&FixedVrSystem::symmetric());
        assert!((centers[0].x + centers[1].x - 1.).abs() < 1e-5);
        assert!((centers[0].y - centers[1].y).abs() < 1e-6);
        assert!(centers[0].x > 0.5);
    }

    #[test]
    fn symmetric_frustum_is_centered() {
        let raw = RawProjection {
            left: -1.,
            right: 1.,
            top: -1.,
            bottom: 1.,
        };
        assert_eq!(projection_center(Eye::Left, &raw, 0.), ProjectionCenter { x: 0.5, y: 0.5 });
    }

    #[test]
    fn canting_moves_centers_apart() {
        let angle = 0.1;
        assert!((canted_angle(&rotation_y(angle), &rotation_y(-angle)) - angle).abs() < 1e-5);

        let mut system = FixedVrSystem::symmetric();
        system.eye_to_head = [rotation_y(angle), rotation_y(-angle)];
        let canted = compute_projection_centers(&system);
        let straight = compute_projection_centers(&FixedVrSystem::symmetric());
        assert!((canted[0].x + canted[1].x - 1.).abs() < 1e-5);
        assert!(canted[0].x > straight[0].x);
        assert!(canted[1].x < straight[1].x);
    }

    #[test]
    fn near_parallel_axes_do_not_produce_nan() {
        let mut forward = IDENTITY;
        forward[2][2] = 1.000_001;
        assert_eq!(canted_angle(&forward, &forward), 0.);
    }
}
