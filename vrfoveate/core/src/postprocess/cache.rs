use crate::{
    data::Eye,
    format::*,
    graphics::{Backend, BindFlags, TextureDesc, TextureKey, ViewDesc, ViewDimension},
    StrResult,
};
use log::{error, info};
use std::collections::HashMap;

const TRACE_CONTEXT: &str = "Resource cache";

// Inputs that cannot be sampled directly are copied or resolved into a private texture first
pub fn requires_copy(desc: &TextureDesc) -> bool {
    !desc.bind_flags.contains(BindFlags::SHADER_RESOURCE)
        || desc.is_multisampled()
        || is_srgb(desc.format)
}

struct CopyTarget<B: Backend> {
    texture: B::Texture,
    view: B::ShaderResourceView,
}

// Views derived from textures owned by the host. The textures are only referenced by identity
// and the cache never detects a reused identity, so it must be cleared on resize.
pub struct ResourceCache<B: Backend> {
    copy_target: Option<CopyTarget<B>>,
    input_views: HashMap<TextureKey, [B::ShaderResourceView; 2]>,
    depth_stencil_views: HashMap<TextureKey, [B::DepthStencilView; 2]>,
}

impl<B: Backend> ResourceCache<B> {
    pub fn new(backend: &B, input_desc: &TextureDesc) -> StrResult<Self> {
        let copy_target = if requires_copy(input_desc) {
            info!("Input texture can't be bound directly, need to copy");
            Some(create_copy_target(backend, input_desc)?)
        } else {
            None
        };

        Ok(Self {
            copy_target,
            input_views: HashMap::new(),
            depth_stencil_views: HashMap::new(),
        })
    }

    pub fn requires_copy(&self) -> bool {
        self.copy_target.is_some()
    }

    /// Shader resource view of the submitted texture for one eye. `None` means the frame must be
    /// skipped.
    pub fn input_view(
        &mut self,
        backend: &B,
        texture: &B::Texture,
        eye: Eye,
    ) -> Option<B::ShaderResourceView> {
        if let Some(copy) = &self.copy_target {
            let desc = backend.texture_desc(texture);
            if desc.is_multisampled() {
                backend.resolve_texture(&copy.texture, texture, desc.format);
            } else {
                backend.copy_texture(&copy.texture, texture, desc.width, desc.height);
            }
            return Some(copy.view.clone());
        }

        let key = B::texture_key(texture);
        if !self.input_views.contains_key(&key) {
            match create_input_views(backend, texture) {
                Ok(views) => {
                    self.input_views.insert(key, views);
                }
                Err(e) => {
                    error!("{}", e);
                    return None;
                }
            }
        }

        self.input_views
            .get(&key)
            .map(|views| views[eye.index()].clone())
    }

    pub fn depth_stencil_view(
        &mut self,
        backend: &B,
        texture: &B::Texture,
        eye: Eye,
    ) -> Option<B::DepthStencilView> {
        let key = B::texture_key(texture);
        if !self.depth_stencil_views.contains_key(&key) {
            match create_depth_stencil_views(backend, texture) {
                Ok(views) => {
                    self.depth_stencil_views.insert(key, views);
                }
                Err(e) => {
                    error!("{}", e);
                    return None;
                }
            }
        }

        self.depth_stencil_views
            .get(&key)
            .map(|views| views[eye.index()].clone())
    }

    pub fn input_view_count(&self) -> usize {
        self.input_views.len()
    }

    pub fn depth_stencil_view_count(&self) -> usize {
        self.depth_stencil_views.len()
    }
}

fn create_copy_target<B: Backend>(backend: &B, input: &TextureDesc) -> StrResult<CopyTarget<B>> {
    info!("Creating copy texture of size {}x{}", input.width, input.height);
    let desc = TextureDesc::new_2d(
        input.width,
        input.height,
        srgb_to_typeless(input.format),
        BindFlags::SHADER_RESOURCE,
    );
    let texture = trace_err!(backend.create_texture(&desc, None), "Creating copy texture")?;
    let view = trace_err!(
        backend.create_shader_resource_view(
            &texture,
            &ViewDesc {
                format: typed_format(desc.format),
                dimension: ViewDimension::Texture2D,
            },
        ),
        "Creating copy SRV"
    )?;

    Ok(CopyTarget { texture, view })
}

fn create_input_views<B: Backend>(
    backend: &B,
    texture: &B::Texture,
) -> StrResult<[B::ShaderResourceView; 2]> {
    let desc = backend.texture_desc(texture);
    info!(
        "Creating shader resource view for input texture of size {}x{} and format {:?}",
        desc.width, desc.height, desc.format
    );
    let format = typed_format(desc.format);

    if desc.array_size > 1 {
        // The right eye lives in the second array slice
        info!("Texture is an array texture, using separate subview for right eye");
        let slice_view = |slice| {
            backend.create_shader_resource_view(
                texture,
                &ViewDesc {
                    format,
                    dimension: ViewDimension::ArraySlice(slice),
                },
            )
        };
        let left = trace_err!(slice_view(0), "Creating resource view")?;
        let right = trace_err!(slice_view(1), "Creating secondary resource view")?;

        Ok([left, right])
    } else {
        let view = trace_err!(
            backend.create_shader_resource_view(
                texture,
                &ViewDesc {
                    format,
                    dimension: ViewDimension::Texture2D,
                },
            ),
            "Creating resource view"
        )?;

        Ok([view.clone(), view])
    }
}

fn create_depth_stencil_views<B: Backend>(
    backend: &B,
    texture: &B::Texture,
) -> StrResult<[B::DepthStencilView; 2]> {
    let desc = backend.texture_desc(texture);
    info!(
        "Creating depth stencil views: format {:?}, array size {}, sample count {}",
        desc.format, desc.array_size, desc.sample_count
    );
    let format = depth_format(desc.format);
    let multisampled = desc.is_multisampled();

    let create = |dimension| {
        backend.create_depth_stencil_view(texture, &ViewDesc { format, dimension })
    };

    if desc.array_size == 2 {
        info!("Depth stencil texture is an array, using separate slice per eye");
        let slice = |slice| {
            if multisampled {
                ViewDimension::MultisampledArraySlice(slice)
            } else {
                ViewDimension::ArraySlice(slice)
            }
        };
        let left = trace_err!(create(slice(0)), "Creating depth stencil view")?;
        let right = trace_err!(create(slice(1)), "Creating depth stencil view array slice")?;

        Ok([left, right])
    } else {
        let dimension = if multisampled {
            ViewDimension::Texture2DMultisampled
        } else {
            ViewDimension::Texture2D
        };
        let view = trace_err!(create(dimension), "Creating depth stencil view")?;

        Ok([view.clone(), view])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::mock::*;

    fn color_desc(format: Format) -> TextureDesc {
        TextureDesc::new_2d(
            1000,
            800,
            format,
            BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
        )
    }

    fn view_desc(backend: &MockBackend, view: &MockHandle) -> ViewDesc {
        match backend.object_kind(view.id()) {
            Some(MockObjectKind::ShaderResourceView { desc, .. })
            | Some(MockObjectKind::DepthStencilView { desc, .. }) => desc,
            other => panic!("not a view: {:?}", other),
        }
    }

    #[test]
    fn copy_detection() {
        assert!(!requires_copy(&color_desc(Format::R8G8B8A8_UNORM)));
        assert!(requires_copy(&color_desc(Format::R8G8B8A8_UNORM_SRGB)));

        let mut multisampled = color_desc(Format::R8G8B8A8_UNORM);
        multisampled.sample_count = 4;
        assert!(requires_copy(&multisampled));

        let render_only =
            TextureDesc::new_2d(8, 8, Format::R8G8B8A8_UNORM, BindFlags::RENDER_TARGET);
        assert!(requires_copy(&render_only));
    }

    #[test]
    fn input_views_are_cached_per_texture() {
        let backend = MockBackend::new();
        let desc = color_desc(Format::R8G8B8A8_TYPELESS);
        let texture = backend.host_texture(desc);
        let mut cache = ResourceCache::new(&backend, &desc).unwrap();

        let left = cache.input_view(&backend, &texture, Eye::Left).unwrap();
        let again = cache.input_view(&backend, &texture, Eye::Left).unwrap();
        let right = cache.input_view(&backend, &texture, Eye::Right).unwrap();
        assert_eq!(left.id(), again.id());
        assert_eq!(left.id(), right.id());
        assert_eq!(backend.call_count(MockCall::CreateShaderResourceView), 1);
        assert_eq!(
            view_desc(&backend, &left),
            ViewDesc {
                format: Format::R8G8B8A8_UNORM,
                dimension: ViewDimension::Texture2D,
            }
        );

        let other = backend.host_texture(desc);
        cache.input_view(&backend, &other, Eye::Left).unwrap();
        assert_eq!(cache.input_view_count(), 2);
    }

    #[test]
    fn array_input_uses_second_slice_for_right_eye() {
        let backend = MockBackend::new();
        let mut desc = color_desc(Format::R8G8B8A8_UNORM);
        desc.array_size = 2;
        let texture = backend.host_texture(desc);
        let mut cache = ResourceCache::new(&backend, &desc).unwrap();

        let left = cache.input_view(&backend, &texture, Eye::Left).unwrap();
        let right = cache.input_view(&backend, &texture, Eye::Right).unwrap();
        assert_ne!(left.id(), right.id());
        assert_eq!(
            view_desc(&backend, &right).dimension,
            ViewDimension::ArraySlice(1)
        );
    }

    #[test]
    fn failed_view_is_not_cached() {
        let backend = MockBackend::new();
        let desc = color_desc(Format::R8G8B8A8_UNORM);
        let texture = backend.host_texture(desc);
        let mut cache = ResourceCache::new(&backend, &desc).unwrap();

        backend.fail_next(MockCall::CreateShaderResourceView);
        assert!(cache.input_view(&backend, &texture, Eye::Left).is_none());
        assert_eq!(cache.input_view_count(), 0);
        assert!(cache.input_view(&backend, &texture, Eye::Left).is_some());
    }

    #[test]
    fn srgb_input_goes_through_copy() {
        let backend = MockBackend::new();
        let desc = color_desc(Format::R8G8B8A8_UNORM_SRGB);
        let texture = backend.host_texture(desc);
        let mut cache = ResourceCache::new(&backend, &desc).unwrap();
        assert!(cache.requires_copy());
        assert_eq!(backend.live_objects(), 2);

        let left = cache.input_view(&backend, &texture, Eye::Left).unwrap();
        let right = cache.input_view(&backend, &texture, Eye::Right).unwrap();
        assert_eq!(left.id(), right.id());
        assert_eq!(cache.input_view_count(), 0);
        assert_eq!(
            view_desc(&backend, &left).format,
            Format::R8G8B8A8_UNORM
        );
        let copies = backend
            .events()
            .into_iter()
            .filter(|e| match e {
                MockEvent::Copy { source, width, height, .. } => {
                    *source == texture.id() && (*width, *height) == (1000, 800)
                }
                _ => false,
            })
            .count();
        assert_eq!(copies, 2);
    }

    #[test]
    fn multisampled_input_is_resolved() {
        let backend = MockBackend::new();
        let mut desc = color_desc(Format::R8G8B8A8_UNORM);
        desc.sample_count = 4;
        let texture = backend.host_texture(desc);
        let mut cache = ResourceCache::new(&backend, &desc).unwrap();

        cache.input_view(&backend, &texture, Eye::Left).unwrap();
        match backend.events().last() {
            Some(MockEvent::Resolve { source, .. }) => assert_eq!(*source, texture.id()),
            other => panic!("expected resolve, got {:?}", other),
        }
    }

    #[test]
    fn depth_views_follow_layout() {
        let backend = MockBackend::new();
        let color = color_desc(Format::R8G8B8A8_UNORM);
        let mut cache = ResourceCache::new(&backend, &color).unwrap();

        let mut array_desc = TextureDesc::new_2d(
            1000,
            800,
            Format::R24G8_TYPELESS,
            BindFlags::DEPTH_STENCIL,
        );
        array_desc.array_size = 2;
        array_desc.sample_count = 4;
        let array = backend.host_texture(array_desc);
        let left = cache.depth_stencil_view(&backend, &array, Eye::Left).unwrap();
        let right = cache.depth_stencil_view(&backend, &array, Eye::Right).unwrap();
        assert_eq!(
            view_desc(&backend, &right),
            ViewDesc {
                format: Format::D24_UNORM_S8_UINT,
                dimension: ViewDimension::MultisampledArraySlice(1),
            }
        );
        assert_ne!(left.id(), right.id());

        let plain = backend.host_texture(TextureDesc::new_2d(
            1000,
            800,
            Format::R32_TYPELESS,
            BindFlags::DEPTH_STENCIL,
        ));
        let left = cache.depth_stencil_view(&backend, &plain, Eye::Left).unwrap();
        let right = cache.depth_stencil_view(&backend, &plain, Eye::Right).unwrap();
        assert_eq!(left.id(), right.id());
        assert_eq!(
            view_desc(&backend, &left),
            ViewDesc {
                format: Format::D32_FLOAT,
                dimension: ViewDimension::Texture2D,
            }
        );
        assert_eq!(cache.depth_stencil_view_count(), 2);
        assert_eq!(backend.call_count(MockCall::CreateDepthStencilView), 3);
    }
}
