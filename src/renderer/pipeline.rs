use std::path::{Path, PathBuf};

use anyhow::Context;
use ash::vk;
use log::*;

use super::vertex_description::VertexLayout;

pub const VERTEX_SHADER_FILE: &str = "quad.vert.spv";
pub const FRAGMENT_SHADER_FILE: &str = "quad.frag.spv";

/// Where the compiled SPIR-V for both stages lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            vertex: dir.join(VERTEX_SHADER_FILE),
            fragment: dir.join(FRAGMENT_SHADER_FILE),
        }
    }
}

pub(super) fn create_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
) -> anyhow::Result<vk::RenderPass> {
    let color_attachments = [color_attachment(color_format)];
    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];
    let dependencies = [external_dependency()];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&color_attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.create_render_pass(&create_info, None)? };
    Ok(render_pass)
}

fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// the subpass may not write color until the acquired image is actually available
fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
}

pub(super) fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> anyhow::Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());
    for image_view in image_views {
        let attachments = [*image_view];
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.create_framebuffer(&create_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(err) => {
                for framebuffer in framebuffers {
                    unsafe { device.destroy_framebuffer(framebuffer, None) };
                }
                return Err(err.into());
            }
        }
    }

    Ok(framebuffers)
}

#[derive(Default)]
pub(super) struct GraphicsPipeline {
    pub(super) layout: vk::PipelineLayout,
    pub(super) pipeline: vk::Pipeline,
}

pub(super) struct PipelineRequest<'a> {
    pub(super) shaders: &'a ShaderPaths,
    pub(super) vertex_layout: &'a VertexLayout,
    pub(super) descriptor_set_layout: vk::DescriptorSetLayout,
    pub(super) render_pass: vk::RenderPass,
    pub(super) extent: vk::Extent2D,
}

impl GraphicsPipeline {
    pub(super) fn create(device: &ash::Device, request: PipelineRequest) -> anyhow::Result<Self> {
        let vert_module = create_shader_module(device, &request.shaders.vertex)?;
        let frag_module = match create_shader_module(device, &request.shaders.fragment) {
            Ok(module) => module,
            Err(err) => {
                unsafe { device.destroy_shader_module(vert_module, None) };
                return Err(err);
            }
        };

        let result = create_pipeline(device, &request, vert_module, frag_module);

        // modules are only needed until the pipeline is built
        unsafe {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        }

        result
    }

    pub(super) unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

fn create_pipeline(
    device: &ash::Device,
    request: &PipelineRequest,
    vert_module: vk::ShaderModule,
    frag_module: vk::ShaderModule,
) -> anyhow::Result<GraphicsPipeline> {
    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(c"main"),
    ];

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&request.vertex_layout.bindings)
        .vertex_attribute_descriptions(&request.vertex_layout.attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewports = [full_viewport(request.extent)];
    let scissors = [vk::Rect2D::default().extent(request.extent)];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterization_state = rasterization_state();

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)];
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(&color_blend_attachments);

    let set_layouts = [request.descriptor_set_layout];
    let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    let layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .layout(layout)
        .render_pass(request.render_pass)
        .subpass(0);

    let created = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
    };
    let pipeline = match created {
        Ok(pipelines) => pipelines[0],
        Err((_, err)) => {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(err).context("failed to create graphics pipeline");
        }
    };

    debug!(
        "created pipeline for {}x{}",
        request.extent.width, request.extent.height
    );

    Ok(GraphicsPipeline { layout, pipeline })
}

pub(super) fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport::default()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
}

fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        // the projection's Y flip turns clockwise winding into counter-clockwise
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false)
}

fn create_shader_module(device: &ash::Device, path: &Path) -> anyhow::Result<vk::ShaderModule> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open shader: {path:?}"))?;
    let code = ash::util::read_spv(&mut file)
        .with_context(|| format!("failed to read SPIR-V: {path:?}"))?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    let module = unsafe {
        device
            .create_shader_module(&create_info, None)
            .with_context(|| format!("failed to create shader module: {path:?}"))?
    };

    Ok(module)
}
