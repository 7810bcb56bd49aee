use anyhow::{Context, bail};
use ash::vk;
use log::*;
use sdl3::video::Window;

mod buffer;
mod config;
mod debug;
mod descriptors;
mod device;
mod frame_sync;
mod gpu_write;
mod instance;
mod pipeline;
mod swapchain;
mod texture;
mod uniform_buffer;
mod vertex_description;

pub use config::RendererConfig;
pub use frame_sync::{FrameCursor, ImagesInFlight, MAX_FRAMES_IN_FLIGHT};
pub use gpu_write::GPUWrite;
pub use pipeline::ShaderPaths;
pub use vertex_description::VertexDescription;

use buffer::{AllocatedBuffer, UploadContext, create_device_local_buffer};
use debug::DebugMessenger;
use descriptors::Descriptors;
use device::{ChosenDevice, CompleteQueueFamilies, LogicalDevice, SwapchainSupport};
use frame_sync::{Acquired, FrameSync, classify_acquire, needs_recreate_after_present};
use pipeline::{GraphicsPipeline, PipelineRequest};
use swapchain::{Swapchain, SwapchainRequest};
use texture::Texture;
use uniform_buffer::UniformBuffers;
use vertex_description::VertexLayout;

pub struct Renderer {
    #[expect(unused)]
    entry: ash::Entry,
    instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,

    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,

    physical_device: vk::PhysicalDevice,
    queue_families: CompleteQueueFamilies,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: LogicalDevice,
    swapchain_loader: ash::khr::swapchain::Device,

    command_pool: vk::CommandPool,
    descriptor_set_layout: vk::DescriptorSetLayout,
    vertex_buffer: AllocatedBuffer,
    index_buffer: AllocatedBuffer,
    index_count: u32,
    texture: Texture,

    /// None only after a failed rebuild
    resources: Option<SwapchainResources>,
    settings: PipelineSettings,

    frames: Vec<FrameSync>,
    current_frame: FrameCursor,
    images_in_flight: ImagesInFlight,

    /// set by the app on window resize; checked after present
    framebuffer_resized: bool,
    /// recreation was deferred because the window had no pixels
    swapchain_stale: bool,

    // dropped last, after the surface created from it
    window: Window,
}

/// What the renderer needs to rebuild everything tied to the swapchain
struct PipelineSettings {
    uniform_buffer_size: vk::DeviceSize,
    vertex_layout: VertexLayout,
    shaders: ShaderPaths,
    clear_color: [f32; 4],
    prefer_mailbox: bool,
}

/// Everything whose lifetime is tied to one swapchain
struct SwapchainResources {
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    pipeline: GraphicsPipeline,
    framebuffers: Vec<vk::Framebuffer>,
    uniform_buffers: UniformBuffers,
    descriptors: Descriptors,
    /// pre-recorded, one per swapchain image
    command_buffers: Vec<vk::CommandBuffer>,
}

impl SwapchainResources {
    fn image_count(&self) -> usize {
        self.swapchain.images.len()
    }

    fn command_buffer(&self, image_slot: usize) -> anyhow::Result<vk::CommandBuffer> {
        self.command_buffers
            .get(image_slot)
            .copied()
            .with_context(|| format!("no command buffer recorded for swapchain image {image_slot}"))
    }

    /// Safe to call on partially built resources; null handles are skipped by Vulkan.
    unsafe fn destroy(
        &mut self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        command_pool: vk::CommandPool,
    ) {
        unsafe {
            if !self.command_buffers.is_empty() {
                device.free_command_buffers(command_pool, &self.command_buffers);
                self.command_buffers.clear();
            }
            self.descriptors.destroy(device);
            self.uniform_buffers.destroy(device);
            for framebuffer in self.framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer, None);
            }
            self.pipeline.destroy(device);
            device.destroy_render_pass(self.render_pass, None);
            self.swapchain.destroy(device, swapchain_loader);
        }
    }
}

impl Renderer {
    pub fn init<V: VertexDescription>(
        window: Window,
        config: RendererConfig<V>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let entry = ash::Entry::linked();
        let (instance, debug_messenger) =
            instance::create_instance(&entry, &window, config.validation)?;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let (surface, chosen, device) =
            match create_surface_and_device(&window, &instance, &surface_loader) {
                Ok(created) => created,
                Err(err) => {
                    // the renderer doesn't exist yet, so Drop can't clean up
                    unsafe { destroy_instance(&instance, debug_messenger.as_ref()) };
                    return Err(err);
                }
            };

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(chosen.physical_device) };
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device.device);

        // from here on, Drop cleans up after a failure; null handles are skipped
        let mut renderer = Self {
            entry,
            instance,
            debug_messenger,
            surface_loader,
            surface,
            physical_device: chosen.physical_device,
            queue_families: chosen.queue_families,
            memory_properties,
            device,
            swapchain_loader,
            command_pool: vk::CommandPool::null(),
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            vertex_buffer: AllocatedBuffer::default(),
            index_buffer: AllocatedBuffer::default(),
            index_count: config.indices.len() as u32,
            texture: Texture::default(),
            resources: None,
            settings: PipelineSettings {
                uniform_buffer_size: config.uniform_buffer_size,
                vertex_layout: VertexLayout::of::<V>(),
                shaders: config.shaders,
                clear_color: config.clear_color,
                prefer_mailbox: config.prefer_mailbox,
            },
            frames: vec![],
            current_frame: FrameCursor::default(),
            images_in_flight: ImagesInFlight::new(0),
            framebuffer_resized: false,
            swapchain_stale: false,
            window,
        };

        renderer.command_pool =
            create_command_pool(&renderer.device.device, renderer.queue_families.graphics)?;
        renderer.descriptor_set_layout = descriptors::create_set_layout(&renderer.device.device)?;

        renderer.vertex_buffer = create_device_local_buffer(
            &renderer.upload_context(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &config.vertices,
        )?;
        renderer.index_buffer = create_device_local_buffer(
            &renderer.upload_context(),
            vk::BufferUsageFlags::INDEX_BUFFER,
            &config.indices,
        )?;
        renderer.texture = Texture::create(
            &renderer.upload_context(),
            &config.texture,
            renderer.device.sampler_anisotropy,
        )?;

        renderer.frames = FrameSync::create_all(&renderer.device.device)?;

        let support = renderer.query_swapchain_support()?;
        let resources = renderer.build_swapchain_resources(&support)?;
        renderer.images_in_flight.reset(resources.image_count());
        renderer.resources = Some(resources);

        info!("renderer initialized");

        Ok(renderer)
    }

    /// Draws one frame, writing `uniform` into the acquired image's uniform buffer.
    pub fn draw_frame<T: GPUWrite>(&mut self, uniform: &T) -> anyhow::Result<()> {
        let frame = &self.frames[self.current_frame.current()];
        let in_flight = frame.in_flight;
        let image_available = frame.image_available;
        let render_finished = frame.render_finished;

        unsafe {
            self.device
                .device
                .wait_for_fences(&[in_flight], true, u64::MAX)?
        };

        if self.swapchain_stale {
            self.recreate_swapchain()?;
            if self.swapchain_stale {
                return Ok(());
            }
        }

        let swapchain_handle = self.resources()?.swapchain.handle;
        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain_handle,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };
        let image_index = match classify_acquire(acquired)? {
            Acquired::Image(image_index) => image_index,
            Acquired::OutOfDate => {
                // the slot fence was never reset, so the next wait on it returns
                debug!("swapchain out of date on acquire");
                return self.recreate_swapchain();
            }
        };
        let image_slot = image_index as usize;

        if let Some(previous) = self.images_in_flight.claim(image_slot, in_flight) {
            unsafe {
                self.device
                    .device
                    .wait_for_fences(&[previous], true, u64::MAX)?
            };
        }

        let resources = self
            .resources
            .as_mut()
            .context("swapchain resources are missing")?;
        debug_assert_eq!(self.images_in_flight.len(), resources.image_count());
        resources.uniform_buffers.write(image_slot, uniform)?;

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [resources.command_buffer(image_slot)?];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let device = &self.device.device;
        unsafe {
            device.reset_fences(&[in_flight])?;
            device
                .queue_submit(self.device.graphics_queue, &[submit_info], in_flight)
                .context("failed to submit draw command buffer")?;
        }

        let swapchains = [swapchain_handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue, &present_info)
        };

        if needs_recreate_after_present(presented, self.framebuffer_resized)? {
            self.framebuffer_resized = false;
            self.recreate_swapchain()?;
        }

        self.current_frame.advance();

        Ok(())
    }

    /// Rebuilds the swapchain and everything sized by it.
    ///
    /// While the window has no pixels this only marks the swapchain stale;
    /// the next `draw_frame` tries again.
    pub fn recreate_swapchain(&mut self) -> anyhow::Result<()> {
        let support = self.query_swapchain_support()?;
        let window_size = self.window.size_in_pixels();
        let Some(extent) = swapchain::drawable_extent(&support.capabilities, window_size) else {
            if !self.swapchain_stale {
                debug!("window has no pixels, deferring swapchain recreation");
            }
            self.swapchain_stale = true;
            return Ok(());
        };

        self.drain_gpu()?;

        if let Some(mut old) = self.resources.take() {
            unsafe {
                old.destroy(
                    &self.device.device,
                    &self.swapchain_loader,
                    self.command_pool,
                )
            };
        }

        let resources = self.build_swapchain_resources(&support)?;
        self.images_in_flight.reset(resources.image_count());
        self.resources = Some(resources);
        self.swapchain_stale = false;

        info!("recreated swapchain at {}x{}", extent.width, extent.height);

        Ok(())
    }

    pub fn on_resize(&mut self) {
        self.framebuffer_resized = true;
    }

    pub fn aspect_ratio(&self) -> f32 {
        match &self.resources {
            Some(resources) => resources.swapchain.aspect_ratio(),
            None => 1.0,
        }
    }

    /// Blocks until the GPU has finished all submitted work
    pub fn drain_gpu(&self) -> anyhow::Result<()> {
        unsafe { self.device.device.device_wait_idle()? };
        Ok(())
    }

    /// Rebuilds the pipeline from the SPIR-V on disk and re-records command buffers.
    ///
    /// If the new shaders fail to load, the old pipeline stays in use.
    pub fn reload_shaders(&mut self) -> anyhow::Result<()> {
        self.drain_gpu()?;

        let Some(mut resources) = self.resources.take() else {
            bail!("no swapchain to reload shaders for");
        };

        let result = self.swap_pipeline(&mut resources);
        self.resources = Some(resources);
        result?;

        info!("reloaded shaders");

        Ok(())
    }

    /// The old pipeline and command buffers are only released once the new ones are recorded.
    fn swap_pipeline(&self, resources: &mut SwapchainResources) -> anyhow::Result<()> {
        let device = &self.device.device;
        let pipeline = GraphicsPipeline::create(device, self.pipeline_request(resources))?;

        let old_pipeline = std::mem::replace(&mut resources.pipeline, pipeline);
        let old_command_buffers = std::mem::take(&mut resources.command_buffers);

        let recorded = self.record_command_buffers(resources);
        let (stale_pipeline, stale_command_buffers) = match recorded {
            Ok(()) => (old_pipeline, old_command_buffers),
            Err(_) => (
                std::mem::replace(&mut resources.pipeline, old_pipeline),
                std::mem::replace(&mut resources.command_buffers, old_command_buffers),
            ),
        };

        unsafe {
            stale_pipeline.destroy(device);
            if !stale_command_buffers.is_empty() {
                device.free_command_buffers(self.command_pool, &stale_command_buffers);
            }
        }

        recorded
    }

    fn resources(&self) -> anyhow::Result<&SwapchainResources> {
        self.resources
            .as_ref()
            .context("swapchain resources are missing")
    }

    fn query_swapchain_support(&self) -> anyhow::Result<SwapchainSupport> {
        SwapchainSupport::query(&self.surface_loader, self.surface, self.physical_device)
    }

    fn upload_context(&self) -> UploadContext<'_> {
        UploadContext {
            device: &self.device.device,
            memory_properties: &self.memory_properties,
            command_pool: self.command_pool,
            queue: self.device.graphics_queue,
        }
    }

    fn pipeline_request<'a>(&'a self, resources: &SwapchainResources) -> PipelineRequest<'a> {
        PipelineRequest {
            shaders: &self.settings.shaders,
            vertex_layout: &self.settings.vertex_layout,
            descriptor_set_layout: self.descriptor_set_layout,
            render_pass: resources.render_pass,
            extent: resources.swapchain.extent,
        }
    }

    fn build_swapchain_resources(
        &self,
        support: &SwapchainSupport,
    ) -> anyhow::Result<SwapchainResources> {
        let swapchain = Swapchain::create(
            &self.device.device,
            &self.swapchain_loader,
            SwapchainRequest {
                surface: self.surface,
                support,
                queue_families: self.queue_families,
                window_pixel_size: self.window.size_in_pixels(),
                prefer_mailbox: self.settings.prefer_mailbox,
            },
        )?;

        let mut resources = SwapchainResources {
            swapchain,
            render_pass: vk::RenderPass::null(),
            pipeline: GraphicsPipeline::default(),
            framebuffers: vec![],
            uniform_buffers: UniformBuffers::default(),
            descriptors: Descriptors::default(),
            command_buffers: vec![],
        };

        if let Err(err) = self.fill_swapchain_resources(&mut resources) {
            unsafe {
                resources.destroy(
                    &self.device.device,
                    &self.swapchain_loader,
                    self.command_pool,
                )
            };
            return Err(err);
        }

        Ok(resources)
    }

    fn fill_swapchain_resources(&self, resources: &mut SwapchainResources) -> anyhow::Result<()> {
        let device = &self.device.device;
        let image_count = resources.image_count();

        resources.render_pass = pipeline::create_render_pass(device, resources.swapchain.format)?;
        resources.pipeline = GraphicsPipeline::create(device, self.pipeline_request(resources))?;
        resources.framebuffers = pipeline::create_framebuffers(
            device,
            resources.render_pass,
            &resources.swapchain.image_views,
            resources.swapchain.extent,
        )?;
        resources.uniform_buffers = UniformBuffers::create(
            &self.upload_context(),
            self.settings.uniform_buffer_size,
            image_count,
        )?;
        resources.descriptors = Descriptors::create(
            device,
            self.descriptor_set_layout,
            &resources.uniform_buffers,
            &self.texture,
            image_count,
        )?;

        self.record_command_buffers(resources)
    }

    fn record_command_buffers(&self, resources: &mut SwapchainResources) -> anyhow::Result<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(resources.framebuffers.len() as u32);
        resources.command_buffers =
            unsafe { self.device.device.allocate_command_buffers(&alloc_info)? };

        for image_index in 0..resources.command_buffers.len() {
            self.record_draw(resources, image_index)?;
        }

        Ok(())
    }

    fn record_draw(&self, resources: &SwapchainResources, image_index: usize) -> anyhow::Result<()> {
        let device = &self.device.device;
        let command_buffer = resources.command_buffers[image_index];

        let begin_info = vk::CommandBufferBeginInfo::default();
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.settings.clear_color,
            },
        }];
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(resources.render_pass)
            .framebuffer(resources.framebuffers[image_index])
            .render_area(vk::Rect2D::default().extent(resources.swapchain.extent))
            .clear_values(&clear_values);

        unsafe {
            device.begin_command_buffer(command_buffer, &begin_info)?;
            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                resources.pipeline.pipeline,
            );
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(
                command_buffer,
                self.index_buffer.buffer,
                0,
                vk::IndexType::UINT16,
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                resources.pipeline.layout,
                0,
                &[resources.descriptors.sets[image_index]],
                &[],
            );
            device.cmd_draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0);
            device.cmd_end_render_pass(command_buffer);
            device.end_command_buffer(command_buffer)?;
        }

        Ok(())
    }
}

fn create_command_pool(device: &ash::Device, graphics_family: u32) -> anyhow::Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::default().queue_family_index(graphics_family);
    let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

    Ok(command_pool)
}

fn create_surface_and_device(
    window: &Window,
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
) -> anyhow::Result<(vk::SurfaceKHR, ChosenDevice, LogicalDevice)> {
    let surface = window
        .vulkan_create_surface(instance.handle())
        .context("failed to create window surface")?;

    let created = device::choose_physical_device(instance, surface_loader, surface).and_then(
        |chosen| {
            let device = device::create_logical_device(instance, &chosen)?;
            Ok((chosen, device))
        },
    );

    match created {
        Ok((chosen, device)) => Ok((surface, chosen, device)),
        Err(err) => {
            unsafe { surface_loader.destroy_surface(surface, None) };
            Err(err)
        }
    }
}

unsafe fn destroy_instance(instance: &ash::Instance, debug_messenger: Option<&DebugMessenger>) {
    unsafe {
        if let Some(debug_messenger) = debug_messenger {
            debug_messenger.destroy();
        }
        instance.destroy_instance(None);
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let device = &self.device.device;

        if let Err(err) = unsafe { device.device_wait_idle() } {
            error!("failed to wait for device idle during shutdown: {err}");
        }

        unsafe {
            if let Some(mut resources) = self.resources.take() {
                resources.destroy(device, &self.swapchain_loader, self.command_pool);
            }

            for frame in &self.frames {
                frame.destroy(device);
            }

            self.texture.destroy(device);
            self.index_buffer.destroy(device);
            self.vertex_buffer.destroy(device);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            device.destroy_command_pool(self.command_pool, None);
            device.destroy_device(None);

            self.surface_loader.destroy_surface(self.surface, None);
            destroy_instance(&self.instance, self.debug_messenger.as_ref());
        }

        debug!("renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn resources_with(command_buffers: Vec<vk::CommandBuffer>) -> SwapchainResources {
        SwapchainResources {
            swapchain: Swapchain {
                handle: vk::SwapchainKHR::null(),
                images: vec![vk::Image::null(); 2],
                image_views: vec![],
                format: vk::Format::B8G8R8A8_SRGB,
                extent: vk::Extent2D::default(),
            },
            render_pass: vk::RenderPass::null(),
            pipeline: GraphicsPipeline::default(),
            framebuffers: vec![],
            uniform_buffers: UniformBuffers::default(),
            descriptors: Descriptors::default(),
            command_buffers,
        }
    }

    #[test]
    fn missing_command_buffers_are_an_error() {
        let resources = resources_with(vec![]);

        assert_eq!(resources.image_count(), 2);
        assert!(resources.command_buffer(0).is_err());
    }

    #[test]
    fn command_buffer_is_looked_up_by_image() {
        let buffers = vec![
            vk::CommandBuffer::from_raw(7),
            vk::CommandBuffer::from_raw(8),
        ];
        let resources = resources_with(buffers);

        assert_eq!(resources.command_buffer(1).unwrap().as_raw(), 8);
        assert!(resources.command_buffer(2).is_err());
    }

    // init relies on these being safe to destroy before anything is created
    #[test]
    fn placeholders_hold_null_handles() {
        let buffer = AllocatedBuffer::default();
        assert!(buffer.buffer.is_null());
        assert!(buffer.memory.is_null());

        let texture = Texture::default();
        assert!(texture.image.is_null());
        assert!(texture.image_memory.is_null());
        assert!(texture.image_view.is_null());
        assert!(texture.sampler.is_null());

        let frame = FrameSync::default();
        assert!(frame.image_available.is_null());
        assert!(frame.render_finished.is_null());
        assert!(frame.in_flight.is_null());
    }
}
