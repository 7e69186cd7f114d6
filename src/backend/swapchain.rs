// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen, their
// views and the framebuffers built on them. Negotiation of format, present
// mode and extent is kept free of driver calls so it can be unit tested.

use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;

use super::destruction::{DestructionQueue, Retire};
use super::device::Device;
use super::handle::{Creatable, Destroyable, ResourceHandle, ResourceKind};
use super::instance::Surface;
use super::pipeline::{Framebuffer, FramebufferDescription, RenderPass};
use crate::error::{EngineError, EngineResult};

// =============================================================================
// NEGOTIATION
// =============================================================================

/// Everything the surface reports about what it can present.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// # Safety
    /// `physical_device` must belong to the instance the surface was created from.
    pub unsafe fn query(
        surface: &ResourceHandle<Surface>,
        physical_device: vk::PhysicalDevice,
    ) -> EngineResult<Self> {
        let loader = surface.loader();
        let handle = surface.raw();
        Ok(Self {
            capabilities: loader
                .get_physical_device_surface_capabilities(physical_device, handle)
                .map_err(|e| EngineError::vulkan("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?,
            formats: loader
                .get_physical_device_surface_formats(physical_device, handle)
                .map_err(|e| EngineError::vulkan("vkGetPhysicalDeviceSurfaceFormatsKHR", e))?,
            present_modes: loader
                .get_physical_device_surface_present_modes(physical_device, handle)
                .map_err(|e| {
                    EngineError::vulkan("vkGetPhysicalDeviceSurfacePresentModesKHR", e)
                })?,
        })
    }
}

/// What the application would like, if the surface allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPreferences {
    pub surface_format: vk::SurfaceFormatKHR,
    /// Low-latency mode to use when available; FIFO otherwise.
    pub present_mode: vk::PresentModeKHR,
}

impl Default for SwapchainPreferences {
    fn default() -> Self {
        Self {
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::MAILBOX,
        }
    }
}

/// The negotiated parameters a swapchain is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

/// Prefer the requested sRGB format, otherwise whatever the surface lists first.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> EngineResult<vk::SurfaceFormatKHR> {
    match formats {
        [] => Err(EngineError::EmptySurfaceSupport("surface formats")),
        // A lone UNDEFINED entry means the surface has no preference at all.
        [only] if only.format == vk::Format::UNDEFINED => Ok(preferred),
        _ => Ok(formats
            .iter()
            .copied()
            .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
            .unwrap_or(formats[0])),
    }
}

/// FIFO is the only mode every implementation must support.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or the framebuffer size clamped to the
/// surface limits when the surface leaves it to us.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: framebuffer.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: framebuffer.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum so the driver never makes us wait on it, capped
/// by the maximum when the surface has one (zero means unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        wanted.min(capabilities.max_image_count)
    } else {
        wanted
    }
}

pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&mode| supported.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub fn negotiate(
    support: &SurfaceSupport,
    framebuffer: vk::Extent2D,
    preferences: &SwapchainPreferences,
) -> EngineResult<SwapchainConfig> {
    if support.present_modes.is_empty() {
        return Err(EngineError::EmptySurfaceSupport("present modes"));
    }
    let caps = &support.capabilities;
    Ok(SwapchainConfig {
        surface_format: choose_surface_format(&support.formats, preferences.surface_format)?,
        present_mode: choose_present_mode(&support.present_modes, preferences.present_mode),
        extent: choose_extent(caps, framebuffer),
        image_count: choose_image_count(caps),
        pre_transform: caps.current_transform,
        composite_alpha: choose_composite_alpha(caps.supported_composite_alpha),
    })
}

// =============================================================================
// SWAPCHAIN AND IMAGE VIEWS
// =============================================================================

pub struct Swapchain;

pub struct SwapchainDescription {
    pub device: Arc<ResourceHandle<Device>>,
    pub surface: Arc<ResourceHandle<Surface>>,
    pub loader: khr::Swapchain,
    pub config: SwapchainConfig,
    /// Handed to the driver for resource reuse; destroyed separately.
    pub old_swapchain: vk::SwapchainKHR,
    /// Families the images are shared between. More than one means CONCURRENT.
    pub queue_family_indices: Vec<u32>,
}

impl Creatable for Swapchain {
    const KIND: ResourceKind = ResourceKind::Swapchain;
    type Handle = vk::SwapchainKHR;
    type Description = SwapchainDescription;

    unsafe fn create(description: &SwapchainDescription) -> EngineResult<vk::SwapchainKHR> {
        let config = &description.config;
        let sharing_mode = if description.queue_family_indices.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(description.surface.raw())
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(sharing_mode)
            .pre_transform(config.pre_transform)
            .composite_alpha(config.composite_alpha)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(description.old_swapchain);
        if sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&description.queue_family_indices);
        }

        description
            .loader
            .create_swapchain(&create_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for Swapchain {
    unsafe fn destroy(handle: &vk::SwapchainKHR, description: &SwapchainDescription) {
        description.loader.destroy_swapchain(*handle, None);
    }
}

impl ResourceHandle<Swapchain> {
    pub fn images(&self) -> EngineResult<Vec<vk::Image>> {
        unsafe { self.description().loader.get_swapchain_images(self.raw()) }
            .map_err(|e| EngineError::vulkan("vkGetSwapchainImagesKHR", e))
    }
}

pub struct ImageView;

pub struct ImageViewDescription {
    pub device: Arc<ResourceHandle<Device>>,
    pub image: vk::Image,
    pub format: vk::Format,
}

impl Creatable for ImageView {
    const KIND: ResourceKind = ResourceKind::ImageView;
    type Handle = vk::ImageView;
    type Description = ImageViewDescription;

    unsafe fn create(description: &ImageViewDescription) -> EngineResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(description.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(description.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        description
            .device
            .handle()
            .create_image_view(&create_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for ImageView {
    unsafe fn destroy(handle: &vk::ImageView, description: &ImageViewDescription) {
        description.device.handle().destroy_image_view(*handle, None);
    }
}

// =============================================================================
// SWAPCHAIN STATE
// =============================================================================

/// A live swapchain with its image views and framebuffers.
pub struct SwapchainState {
    pub swapchain: Arc<ResourceHandle<Swapchain>>,
    pub config: SwapchainConfig,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<Arc<ResourceHandle<ImageView>>>,
    pub framebuffers: Vec<Arc<ResourceHandle<Framebuffer>>>,
}

impl SwapchainState {
    /// Build a swapchain and everything that hangs off it.
    ///
    /// On failure, whatever was already built for the new state is destroyed
    /// before returning; `previous` is never touched.
    pub fn build(
        device: &Arc<ResourceHandle<Device>>,
        surface: &Arc<ResourceHandle<Surface>>,
        render_pass: &Arc<ResourceHandle<RenderPass>>,
        config: &SwapchainConfig,
        previous: Option<&SwapchainState>,
    ) -> EngineResult<Self> {
        let mut built = DestructionQueue::new();
        match Self::build_into(device, surface, render_pass, config, previous, &mut built) {
            Ok(state) => Ok(state),
            Err(e) => {
                // SAFETY: nothing built here has been submitted to the GPU.
                unsafe { built.flush() };
                Err(e)
            }
        }
    }

    fn build_into(
        device: &Arc<ResourceHandle<Device>>,
        surface: &Arc<ResourceHandle<Surface>>,
        render_pass: &Arc<ResourceHandle<RenderPass>>,
        config: &SwapchainConfig,
        previous: Option<&SwapchainState>,
        built: &mut DestructionQueue,
    ) -> EngineResult<Self> {
        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.present_mode
        );

        let swapchain = Arc::new(ResourceHandle::<Swapchain>::init(SwapchainDescription {
            device: Arc::clone(device),
            surface: Arc::clone(surface),
            loader: device.swapchain_loader(),
            config: *config,
            old_swapchain: previous.map_or(vk::SwapchainKHR::null(), |p| p.swapchain.raw()),
            queue_family_indices: device.queue_assignment().presentation_families(),
        })?);
        built.push(Arc::clone(&swapchain));

        let images = swapchain.images()?;
        log::info!("Created swapchain with {} images", images.len());

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = Arc::new(ResourceHandle::<ImageView>::init(ImageViewDescription {
                device: Arc::clone(device),
                image,
                format: config.surface_format.format,
            })?);
            built.push(Arc::clone(&view));
            image_views.push(view);
        }

        let mut framebuffers = Vec::with_capacity(image_views.len());
        for view in &image_views {
            let framebuffer = Arc::new(ResourceHandle::<Framebuffer>::init(
                FramebufferDescription {
                    render_pass: Arc::clone(render_pass),
                    attachments: vec![Arc::clone(view)],
                    extent: config.extent,
                },
            )?);
            built.push(Arc::clone(&framebuffer));
            framebuffers.push(framebuffer);
        }

        Ok(Self {
            swapchain,
            config: *config,
            images,
            image_views,
            framebuffers,
        })
    }

    /// Destroy framebuffers, then image views, then the swapchain.
    ///
    /// # Safety
    /// The device must be idle with respect to every image of this swapchain.
    pub unsafe fn destroy(self) {
        let mut queue: DestructionQueue = DestructionQueue::new();
        queue_teardown(&mut queue, self.swapchain, self.image_views, self.framebuffers);
        queue.flush();
    }
}

/// Push a swapchain's objects in creation order, so a flush releases the
/// framebuffers first and the swapchain last.
fn queue_teardown<R, S, V, F>(
    queue: &mut DestructionQueue<R>,
    swapchain: S,
    image_views: Vec<V>,
    framebuffers: Vec<F>,
) where
    R: Retire + From<S> + From<V> + From<F>,
{
    queue.reserve(1 + image_views.len() + framebuffers.len());
    queue.push(swapchain);
    for view in image_views {
        queue.push(view);
    }
    for framebuffer in framebuffers {
        queue.push(framebuffer);
    }
}
