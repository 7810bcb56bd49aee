use std::ffi::{CStr, CString, c_char};

use anyhow::{Context, bail};
use ash::vk;
use log::*;
use sdl3::video::Window;

use super::debug::{self, DebugMessenger};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
const PORTABILITY_INSTANCE_EXTENSIONS: [&CStr; 0] = [];
#[cfg(any(target_os = "macos", target_os = "ios"))]
const PORTABILITY_INSTANCE_EXTENSIONS: [&CStr; 2] = [
    ash::khr::portability_enumeration::NAME,
    ash::khr::get_physical_device_properties2::NAME,
];

fn instance_create_flags() -> vk::InstanceCreateFlags {
    if cfg!(any(target_os = "macos", target_os = "ios")) {
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    } else {
        vk::InstanceCreateFlags::default()
    }
}

pub(super) fn required_layers(validation: bool) -> Vec<&'static CStr> {
    if validation {
        vec![VALIDATION_LAYER]
    } else {
        vec![]
    }
}

pub(super) fn create_instance(
    entry: &ash::Entry,
    window: &Window,
    validation: bool,
) -> anyhow::Result<(ash::Instance, Option<DebugMessenger>)> {
    let app_info = vk::ApplicationInfo::default()
        .application_name(c"Vulkan Tutorial")
        .engine_name(c"No Engine")
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    let window_extensions: Vec<CString> = window
        .vulkan_instance_extensions()?
        .into_iter()
        .map(CString::new)
        .collect::<Result<_, _>>()
        .context("SDL returned an extension name with an interior nul")?;

    let mut extensions: Vec<&CStr> = window_extensions.iter().map(CString::as_c_str).collect();
    extensions.extend(PORTABILITY_INSTANCE_EXTENSIONS);
    if validation {
        extensions.push(ash::ext::debug_utils::NAME);
    }

    let layers = required_layers(validation);

    let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
    let missing = missing_names(&layers, available_layers.iter().map(|l| &l.layer_name[..]));
    if !missing.is_empty() {
        bail!("missing required layers: {}", join_names(&missing));
    }

    let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None)? };
    let missing = missing_names(
        &extensions,
        available_extensions.iter().map(|e| &e.extension_name[..]),
    );
    if !missing.is_empty() {
        bail!("missing required instance extensions: {}", join_names(&missing));
    }

    debug!("instance extensions: {}", join_names(&extensions));

    let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
    let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    let mut debug_create_info = debug::build_messenger_create_info();
    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_ptrs)
        .enabled_extension_names(&extension_ptrs)
        .flags(instance_create_flags());
    if validation {
        create_info = create_info.push_next(&mut debug_create_info);
    }

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    let debug_messenger = if validation {
        let debug_create_info = debug::build_messenger_create_info();
        Some(DebugMessenger::create(entry, &instance, &debug_create_info)?)
    } else {
        None
    };

    Ok((instance, debug_messenger))
}

/// names from `required` that don't appear in `available`
pub(super) fn missing_names<'a, 'r>(
    required: &[&'r CStr],
    available: impl Iterator<Item = &'a [c_char]>,
) -> Vec<&'r CStr> {
    let available: Vec<Vec<u8>> = available.map(vk_str_bytes).collect();

    required
        .iter()
        .filter(|name| !available.iter().any(|a| a.as_slice() == name.to_bytes()))
        .copied()
        .collect()
}

pub(super) fn vk_str_bytes(vk_str: &[c_char]) -> Vec<u8> {
    vk_str
        .iter()
        .map(|byte| *byte as u8)
        .take_while(|byte| *byte != b'\0')
        .collect()
}

pub(super) fn join_names(names: &[&CStr]) -> String {
    names
        .iter()
        .map(|name| name.to_string_lossy())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;

    /// a fixed-size, nul-padded name like the ones in vk property structs
    pub(crate) fn vk_name(name: &str) -> [c_char; vk::MAX_EXTENSION_NAME_SIZE] {
        let mut buf = [0 as c_char; vk::MAX_EXTENSION_NAME_SIZE];
        for (dst, src) in buf.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        buf
    }

    #[test]
    fn vk_str_stops_at_nul() {
        assert_eq!(vk_str_bytes(&vk_name("VK_KHR_surface")), b"VK_KHR_surface");
    }

    #[test]
    fn all_present_means_nothing_missing() {
        let available = [vk_name("VK_KHR_surface"), vk_name("VK_EXT_debug_utils")];
        let required = [ash::khr::surface::NAME, ash::ext::debug_utils::NAME];

        let missing = missing_names(&required, available.iter().map(|n| &n[..]));
        assert!(missing.is_empty());
    }

    #[test]
    fn reports_only_missing_names() {
        let available = [vk_name("VK_KHR_surface")];
        let required = [ash::khr::surface::NAME, VALIDATION_LAYER];

        let missing = missing_names(&required, available.iter().map(|n| &n[..]));
        assert_eq!(missing, vec![VALIDATION_LAYER]);
        assert_eq!(join_names(&missing), "VK_LAYER_KHRONOS_validation");
    }

    #[test]
    fn prefix_is_not_a_match() {
        let available = [vk_name("VK_KHR_surface_extra")];
        let missing = missing_names(&[ash::khr::surface::NAME], available.iter().map(|n| &n[..]));
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn validation_layer_only_when_enabled() {
        assert!(required_layers(false).is_empty());
        assert_eq!(required_layers(true), vec![VALIDATION_LAYER]);
    }
}
