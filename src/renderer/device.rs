use std::collections::BTreeSet;
use std::ffi::{CStr, c_char};

use anyhow::{Context, bail};
use ash::vk::{self, PhysicalDeviceType};
use log::*;

use super::instance::{join_names, missing_names, vk_str_bytes};

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub(super) const DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub(super) const DEVICE_EXTENSIONS: [&CStr; 2] = [
    ash::khr::swapchain::NAME,
    ash::khr::portability_subset::NAME,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// the index of the first queue family that supports graphics
    pub graphics_family: Option<u32>,
    /// the index of the first queue family that can present to the surface
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Stops at the first family index where both are known.
    pub fn from_families(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> anyhow::Result<bool>,
    ) -> anyhow::Result<Self> {
        let mut indices = Self::default();

        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            if indices.graphics_family.is_none()
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics_family = Some(i);
            }
            if indices.present_family.is_none() && supports_present(i)? {
                indices.present_family = Some(i);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn find(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> anyhow::Result<Self> {
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        Self::from_families(&families, |i| {
            let supported = unsafe {
                surface_loader.get_physical_device_surface_support(physical_device, i, surface)?
            };
            Ok(supported)
        })
    }

    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    pub fn complete(&self) -> Option<CompleteQueueFamilies> {
        Some(CompleteQueueFamilies {
            graphics: self.graphics_family?,
            present: self.present_family?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompleteQueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl CompleteQueueFamilies {
    /// one entry per distinct family, so each gets exactly one queue create info
    pub fn unique(&self) -> BTreeSet<u32> {
        BTreeSet::from([self.graphics, self.present])
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> anyhow::Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// lower is better
pub fn device_type_rank(device_type: PhysicalDeviceType) -> u8 {
    match device_type {
        PhysicalDeviceType::DISCRETE_GPU => 0,
        PhysicalDeviceType::INTEGRATED_GPU => 1,
        PhysicalDeviceType::VIRTUAL_GPU => 2,
        PhysicalDeviceType::CPU => 3,
        PhysicalDeviceType::OTHER => 4,
        _ => 5,
    }
}

pub(super) struct ChosenDevice {
    pub(super) physical_device: vk::PhysicalDevice,
    pub(super) queue_families: CompleteQueueFamilies,
}

pub(super) fn choose_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> anyhow::Result<ChosenDevice> {
    let physical_devices = unsafe { instance.enumerate_physical_devices()? };
    if physical_devices.is_empty() {
        bail!("failed to find GPUs with Vulkan support");
    }

    let mut candidates = vec![];
    for physical_device in physical_devices {
        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = String::from_utf8_lossy(&vk_str_bytes(&props.device_name)).into_owned();

        match check_suitability(instance, surface_loader, surface, physical_device)? {
            Ok(queue_families) => {
                debug!("suitable device: {name} ({:?})", props.device_type);
                candidates.push((
                    device_type_rank(props.device_type),
                    name,
                    ChosenDevice {
                        physical_device,
                        queue_families,
                    },
                ));
            }
            Err(reason) => debug!("skipping device {name}: {reason}"),
        }
    }

    candidates.sort_by_key(|(rank, _, _)| *rank);

    let Some((_, name, chosen)) = candidates.into_iter().next() else {
        bail!("failed to find a suitable GPU");
    };
    info!("using device: {name}");

    Ok(chosen)
}

/// outer error: a Vulkan query failed; inner error: why this device doesn't fit
fn check_suitability(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> anyhow::Result<Result<CompleteQueueFamilies, String>> {
    let indices = QueueFamilyIndices::find(instance, surface_loader, surface, physical_device)?;
    let Some(queue_families) = indices.complete() else {
        return Ok(Err(format!("incomplete queue families: {indices:?}")));
    };

    let available = unsafe { instance.enumerate_device_extension_properties(physical_device)? };
    let missing = missing_device_extensions(available.iter().map(|e| &e.extension_name[..]));
    if !missing.is_empty() {
        return Ok(Err(format!("missing extensions: {}", join_names(&missing))));
    }

    let support = SwapchainSupport::query(surface_loader, surface, physical_device)?;
    if !support.is_adequate() {
        return Ok(Err("no surface formats or present modes".to_string()));
    }

    Ok(Ok(queue_families))
}

fn missing_device_extensions<'a>(
    available: impl Iterator<Item = &'a [c_char]>,
) -> Vec<&'static CStr> {
    missing_names(&DEVICE_EXTENSIONS, available)
}

pub(super) struct LogicalDevice {
    pub(super) device: ash::Device,
    pub(super) graphics_queue: vk::Queue,
    pub(super) present_queue: vk::Queue,
    pub(super) sampler_anisotropy: Option<f32>,
}

pub(super) fn create_logical_device(
    instance: &ash::Instance,
    chosen: &ChosenDevice,
) -> anyhow::Result<LogicalDevice> {
    let queue_priorities = [1.0];
    let queue_create_infos: Vec<_> = chosen
        .queue_families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    let supported_features = unsafe { instance.get_physical_device_features(chosen.physical_device) };
    let anisotropy_supported = supported_features.sampler_anisotropy == vk::TRUE;
    let enabled_features =
        vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy_supported);

    let extension_ptrs: Vec<*const c_char> = DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();

    // device layers are deprecated; instance layers apply to the device too
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_ptrs)
        .enabled_features(&enabled_features);

    let device = unsafe {
        instance
            .create_device(chosen.physical_device, &create_info, None)
            .context("failed to create logical device")?
    };

    let graphics_queue = unsafe { device.get_device_queue(chosen.queue_families.graphics, 0) };
    let present_queue = unsafe { device.get_device_queue(chosen.queue_families.present, 0) };

    let sampler_anisotropy = if anisotropy_supported {
        let props = unsafe { instance.get_physical_device_properties(chosen.physical_device) };
        Some(props.limits.max_sampler_anisotropy)
    } else {
        None
    };

    Ok(LogicalDevice {
        device,
        graphics_queue,
        present_queue,
        sampler_anisotropy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::renderer::instance::tests::vk_name;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn same_family_for_graphics_and_present() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)];
        let indices = QueueFamilyIndices::from_families(&families, |_| Ok(true)).unwrap();

        let complete = indices.complete().unwrap();
        assert_eq!(complete.graphics, 0);
        assert!(complete.is_shared());
        assert_eq!(complete.unique().len(), 1);
    }

    #[test]
    fn separate_present_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::from_families(&families, |i| Ok(i == 1)).unwrap();

        let complete = indices.complete().unwrap();
        assert_eq!((complete.graphics, complete.present), (0, 1));
        assert!(!complete.is_shared());
        assert_eq!(complete.unique().into_iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn first_matching_family_wins() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let indices = QueueFamilyIndices::from_families(&families, |_| Ok(true)).unwrap();

        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(0));
    }

    #[test]
    fn stops_querying_once_complete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = vec![];
        QueueFamilyIndices::from_families(&families, |i| {
            queried.push(i);
            Ok(true)
        })
        .unwrap();

        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn no_graphics_is_incomplete() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::from_families(&families, |_| Ok(true)).unwrap();

        assert!(!indices.is_complete());
        assert_eq!(indices.complete(), None);
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyIndices::from_families(&families, |_| {
            Err(vk::Result::ERROR_SURFACE_LOST_KHR.into())
        });
        assert!(result.is_err());
    }

    #[test]
    fn discrete_gpus_rank_first() {
        let mut types = [
            PhysicalDeviceType::CPU,
            PhysicalDeviceType::INTEGRATED_GPU,
            PhysicalDeviceType::DISCRETE_GPU,
            PhysicalDeviceType::VIRTUAL_GPU,
        ];
        types.sort_by_key(|t| device_type_rank(*t));

        assert_eq!(
            types,
            [
                PhysicalDeviceType::DISCRETE_GPU,
                PhysicalDeviceType::INTEGRATED_GPU,
                PhysicalDeviceType::VIRTUAL_GPU,
                PhysicalDeviceType::CPU,
            ]
        );
    }

    #[test]
    fn swapchain_extension_is_required() {
        let none: [[c_char; vk::MAX_EXTENSION_NAME_SIZE]; 0] = [];
        let missing = missing_device_extensions(none.iter().map(|n| &n[..]));
        assert!(missing.contains(&ash::khr::swapchain::NAME));

        let available: Vec<_> = DEVICE_EXTENSIONS
            .iter()
            .map(|name| vk_name(&name.to_string_lossy()))
            .collect();
        assert!(missing_device_extensions(available.iter().map(|n| &n[..])).is_empty());
    }

    #[test]
    fn adequate_support_needs_formats_and_modes() {
        let mut support = SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!support.is_adequate());

        support.formats.push(vk::SurfaceFormatKHR::default());
        assert!(support.is_adequate());

        support.present_modes.clear();
        assert!(!support.is_adequate());
    }
}
