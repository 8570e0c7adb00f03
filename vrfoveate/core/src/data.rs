use bitflags::bitflags;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            Eye::Left
        } else {
            Eye::Right
        }
    }
}

// Normalized sub-rectangle of a submitted texture. The min and max values can be swapped to
// express a flipped image.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct TextureBounds {
    pub u_min: f32,
    pub v_min: f32,
    pub u_max: f32,
    pub v_max: f32,
}

impl Default for TextureBounds {
    fn default() -> Self {
        Self {
            u_min: 0.,
            v_min: 0.,
            u_max: 1.,
            v_max: 1.,
        }
    }
}

impl TextureBounds {
    pub fn width(&self) -> f32 {
        (self.u_max - self.u_min).abs()
    }

    pub fn height(&self) -> f32 {
        (self.v_max - self.v_min).abs()
    }

    // Pixel rectangle (x, y, width, height) inside a texture of the given size
    pub fn to_pixels(&self, texture_width: u32, texture_height: u32) -> PixelRect {
        PixelRect {
            x: (texture_width as f32 * self.u_min.min(self.u_max)) as u32,
            y: (texture_height as f32 * self.v_min.min(self.v_max)) as u32,
            width: (texture_width as f32 * self.width()) as u32,
            height: (texture_height as f32 * self.height()) as u32,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ColorSpace {
    Auto,
    Gamma,
    Linear,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TextureType {
    DirectX,
    DirectX12,
    OpenGL,
    Vulkan,
    Other(i32),
}

bitflags! {
    pub struct SubmitFlags: u32 {
        const LENS_DISTORTION_ALREADY_APPLIED = 0x01;
        const GL_RENDER_BUFFER = 0x02;
        const TEXTURE_WITH_POSE = 0x08;
        const TEXTURE_WITH_DEPTH = 0x10;
        const FRAME_DISCONTINUITY = 0x20;
    }
}

// Submission record owned by the host. The post-processor rewrites `handle` and `color_space`
// in place before the host forwards it to the VR runtime.
#[derive(Clone, Debug)]
pub struct SubmittedTexture<T> {
    pub handle: Option<T>,
    pub texture_type: TextureType,
    pub color_space: ColorSpace,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct FoveationRadii {
    pub inner: f32,
    pub mid: f32,
    pub outer: f32,
}

impl FoveationRadii {
    // Radii are forced to 0 <= inner <= mid <= outer
    pub fn new(inner: f32, mid: f32, outer: f32) -> Self {
        let inner = inner.max(0.);
        let mid = mid.max(inner);
        let outer = outer.max(mid);
        Self { inner, mid, outer }
    }

    pub fn as_array(&self) -> [f32; 3] {
        [self.inner, self.mid, self.outer]
    }
}

/// Foveation tier for a normalized distance from the projection center: 0 is full rate, 3 is the
/// coarsest level beyond the outer radius.
pub fn distance_to_tier(distance: f32, radii: &FoveationRadii) -> u8 {
    if distance < radii.inner {
        0
    } else if distance < radii.mid {
        1
    } else if distance < radii.outer {
        2
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_is_monotonic() {
        let radii_sets = [
            FoveationRadii::new(0., 0., 0.),
            FoveationRadii::new(0.3, 0.75, 0.85),
            FoveationRadii::new(0.5, 0.5, 1.),
            FoveationRadii::new(0.2, 0.6, std::f32::INFINITY),
            FoveationRadii::new(std::f32::INFINITY, std::f32::INFINITY, std::f32::INFINITY),
        ];
        for radii in radii_sets.iter() {
            let mut last = 0;
            for step in 0..=400 {
                let tier = distance_to_tier(step as f32 * 0.01, radii);
                assert!(tier <= 3);
                assert!(tier >= last, "{:?} at {}", radii, step);
                last = tier;
            }
        }
    }

    #[test]
    fn tier_boundaries() {
        let radii = FoveationRadii::new(0.3, 0.75, 0.85);
        assert_eq!(distance_to_tier(0., &radii), 0);
        assert_eq!(distance_to_tier(0.3, &radii), 1);
        assert_eq!(distance_to_tier(0.8, &radii), 2);
        assert_eq!(distance_to_tier(0.85, &radii), 3);
        assert_eq!(distance_to_tier(std::f32::NAN, &radii), 3);
    }

    #[test]
    fn bounds_to_pixels() {
        let left = TextureBounds {
            u_min: 0.,
            v_min: 0.,
            u_max: 0.5,
            v_max: 1.,
        };
        assert_eq!(
            left.to_pixels(4000, 2000),
            PixelRect {
                x: 0,
                y: 0,
                width: 2000,
                height: 2000
            }
        );

        let flipped_right = TextureBounds {
            u_min: 0.5,
            v_min: 1.,
            u_max: 1.,
            v_max: 0.,
        };
        assert_eq!(
            flipped_right.to_pixels(4000, 2000),
            PixelRect {
                x: 2000,
                y: 0,
                width: 2000,
                height: 2000
            }
        );
    }

    #[test]
    fn eye_indices() {
        assert_eq!(Eye::from_index(Eye::Right.index()), Eye::Right);
        assert_eq!(Eye::from_index(Eye::Left.index()), Eye::Left);
    }
}
