// Storage format of a GPU texture. The wrapped value is the DXGI format number, so formats
// coming from the host can be carried through without loss.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Format(pub u32);

impl Format {
    pub const UNKNOWN: Format = Format(0);
    pub const R32G32B32A32_TYPELESS: Format = Format(1);
    pub const R32G32B32A32_FLOAT: Format = Format(2);
    pub const R32G32B32_TYPELESS: Format = Format(5);
    pub const R32G32B32_FLOAT: Format = Format(6);
    pub const R16G16B16A16_TYPELESS: Format = Format(9);
    pub const R16G16B16A16_FLOAT: Format = Format(10);
    pub const R32G8X24_TYPELESS: Format = Format(19);
    pub const D32_FLOAT_S8X24_UINT: Format = Format(20);
    pub const R32_FLOAT_X8X24_TYPELESS: Format = Format(21);
    pub const R10G10B10A2_TYPELESS: Format = Format(23);
    pub const R10G10B10A2_UNORM: Format = Format(24);
    pub const R10G10B10A2_UINT: Format = Format(25);
    pub const R8G8B8A8_TYPELESS: Format = Format(27);
    pub const R8G8B8A8_UNORM: Format = Format(28);
    pub const R8G8B8A8_UNORM_SRGB: Format = Format(29);
    pub const R32_TYPELESS: Format = Format(39);
    pub const D32_FLOAT: Format = Format(40);
    pub const R24G8_TYPELESS: Format = Format(44);
    pub const D24_UNORM_S8_UINT: Format = Format(45);
    pub const R24_UNORM_X8_TYPELESS: Format = Format(46);
    pub const R16_TYPELESS: Format = Format(53);
    pub const D16_UNORM: Format = Format(55);
    pub const R8_UINT: Format = Format(62);
    pub const B8G8R8A8_UNORM: Format = Format(87);
    pub const B8G8R8A8_TYPELESS: Format = Format(90);
    pub const B8G8R8A8_UNORM_SRGB: Format = Format(91);
    pub const B8G8R8X8_TYPELESS: Format = Format(92);
    pub const B8G8R8X8_UNORM_SRGB: Format = Format(93);
}

/// Typed variant of a typeless color format, usable for shader resource views.
pub fn typed_format(format: Format) -> Format {
    match format {
        Format::R32G32B32A32_TYPELESS => Format::R32G32B32A32_FLOAT,
        Format::R32G32B32_TYPELESS => Format::R32G32B32_FLOAT,
        Format::R16G16B16A16_TYPELESS => Format::R16G16B16A16_FLOAT,
        Format::R10G10B10A2_TYPELESS => Format::R10G10B10A2_UINT,
        Format::R8G8B8A8_TYPELESS => Format::R8G8B8A8_UNORM,
        Format::B8G8R8A8_TYPELESS => Format::B8G8R8A8_UNORM,
        other => other,
    }
}

/// Depth-stencil view format for a typeless depth texture.
pub fn depth_format(format: Format) -> Format {
    match format {
        Format::R16_TYPELESS => Format::D16_UNORM,
        Format::R24G8_TYPELESS | Format::R24_UNORM_X8_TYPELESS => Format::D24_UNORM_S8_UINT,
        Format::R32_TYPELESS => Format::D32_FLOAT,
        Format::R32G8X24_TYPELESS | Format::R32_FLOAT_X8X24_TYPELESS => {
            Format::D32_FLOAT_S8X24_UINT
        }
        other => other,
    }
}

/// Strips the SRGB interpretation so the copy texture can be viewed as linear data.
pub fn srgb_to_typeless(format: Format) -> Format {
    match format {
        Format::B8G8R8A8_UNORM_SRGB => Format::B8G8R8A8_TYPELESS,
        Format::B8G8R8X8_UNORM_SRGB => Format::B8G8R8X8_TYPELESS,
        Format::R8G8B8A8_UNORM_SRGB => Format::R8G8B8A8_TYPELESS,
        other => other,
    }
}

// The VR runtime applies a different color conversion to 10 bit formats that cannot be matched
// with 8 bit outputs, so those keep their own format.
pub fn output_format(input: Format) -> Format {
    match input {
        Format::R10G10B10A2_UNORM | Format::R10G10B10A2_TYPELESS => Format::R10G10B10A2_UNORM,
        _ => Format::R8G8B8A8_UNORM,
    }
}

pub fn is_srgb(format: Format) -> bool {
    matches!(
        format,
        Format::B8G8R8A8_UNORM_SRGB | Format::B8G8R8X8_UNORM_SRGB | Format::R8G8B8A8_UNORM_SRGB
    )
}

// Submitted typeless textures are treated as SRGB by the runtime when the color space is auto.
pub fn is_considered_srgb_by_runtime(format: Format) -> bool {
    is_srgb(format)
        || matches!(
            format,
            Format::B8G8R8A8_TYPELESS
                | Format::R8G8B8A8_TYPELESS
                | Format::B8G8R8X8_TYPELESS
                | Format::R10G10B10A2_TYPELESS
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typeless_color_formats() {
        assert_eq!(typed_format(Format::R8G8B8A8_TYPELESS), Format::R8G8B8A8_UNORM);
        assert_eq!(typed_format(Format::R10G10B10A2_TYPELESS), Format::R10G10B10A2_UINT);
        assert_eq!(typed_format(Format::B8G8R8A8_UNORM), Format::B8G8R8A8_UNORM);
        assert_eq!(typed_format(Format(1234)), Format(1234));
    }

    #[test]
    fn depth_formats() {
        assert_eq!(depth_format(Format::R24G8_TYPELESS), Format::D24_UNORM_S8_UINT);
        assert_eq!(depth_format(Format::R24_UNORM_X8_TYPELESS), Format::D24_UNORM_S8_UINT);
        assert_eq!(depth_format(Format::R32_TYPELESS), Format::D32_FLOAT);
        assert_eq!(depth_format(Format::R32G8X24_TYPELESS), Format::D32_FLOAT_S8X24_UINT);
        assert_eq!(depth_format(Format::D16_UNORM), Format::D16_UNORM);
    }

    #[test]
    fn srgb_copy_then_view_is_linear() {
        let copy = srgb_to_typeless(Format::R8G8B8A8_UNORM_SRGB);
        assert_eq!(copy, Format::R8G8B8A8_TYPELESS);
        assert_eq!(typed_format(copy), Format::R8G8B8A8_UNORM);
        assert_eq!(srgb_to_typeless(Format::B8G8R8A8_UNORM), Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn output_formats() {
        assert_eq!(output_format(Format::R10G10B10A2_TYPELESS), Format::R10G10B10A2_UNORM);
        assert_eq!(output_format(Format::B8G8R8A8_UNORM_SRGB), Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn srgb_classification() {
        assert!(is_srgb(Format::B8G8R8X8_UNORM_SRGB));
        assert!(!is_srgb(Format::R8G8B8A8_TYPELESS));
        assert!(is_considered_srgb_by_runtime(Format::R8G8B8A8_TYPELESS));
        assert!(is_considered_srgb_by_runtime(Format::R10G10B10A2_TYPELESS));
        assert!(!is_considered_srgb_by_runtime(Format::R10G10B10A2_UNORM));
    }
}
