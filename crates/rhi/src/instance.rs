//! Vulkan instance management.
//!
//! This module handles VkInstance creation, the validation layer and the
//! debug messenger that forwards validation output to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use stimply_rhi::instance::Instance;
//!
//! // Headless instance (no surface extensions) with validation in debug builds
//! let instance = Instance::new(&[], cfg!(debug_assertions)).expect("Failed to create Vulkan instance");
//! let vk_instance = instance.handle();
//! ```

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};

use crate::error::RhiError;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with optional validation layer support.
///
/// When dropped, the debug messenger is destroyed before the instance.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Debug utils extension loader (only present when validation is enabled)
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle (only present when validation is enabled)
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `window_extensions` - Instance extensions the window system requires
    /// * `enable_validation` - Require `VK_LAYER_KHRONOS_validation` and attach a debug messenger
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - A requested extension or the validation layer is not available
    /// - Instance creation fails
    pub fn new(window_extensions: &[*const c_char], enable_validation: bool) -> Result<Self, RhiError> {
        // SAFETY: Loading the system Vulkan library has no preconditions beyond
        // keeping `entry` alive as long as anything created from it.
        let entry = unsafe { Entry::load()? };

        if enable_validation && !Self::is_validation_layer_available(&entry)? {
            return Err(RhiError::MissingLayer(
                VALIDATION_LAYER_NAME.to_string_lossy().into_owned(),
            ));
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"Stimply Engine")
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"Stimply")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions: Vec<*const c_char> = window_extensions.to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        // SAFETY: Enumerating instance extensions only requires a loaded entry.
        let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
        let available_names: Vec<&CStr> = available
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .collect();
        let requested: Vec<&CStr> = extensions
            .iter()
            // SAFETY: Every pointer is a static, null-terminated extension name.
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect();
        if let Some(missing) = first_missing(&available_names, &requested) {
            return Err(RhiError::MissingExtension(missing));
        }

        let layers = if enable_validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        // SAFETY: Every pointer in `create_info` outlives this call.
        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(RhiError::from)?
        };

        info!("Vulkan instance created (API version 1.2)");

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            info!("Validation layer enabled, debug messenger attached");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Checks if the Khronos validation layer is available.
    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        // SAFETY: Enumerating layers only requires a loaded entry.
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER_NAME)))
    }

    /// Sets up the debug messenger for validation layer callbacks.
    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        // SAFETY: The loader was created from a live instance.
        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(RhiError::from)?
        };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: All child objects are destroyed by their owners before the instance.
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Name of the first entry of `required` that is absent from `available`.
pub(crate) fn first_missing(available: &[&CStr], required: &[&CStr]) -> Option<String> {
    required
        .iter()
        .find(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
}

/// Forwards validation layer messages to `tracing` at a matching level.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid (or null) callback data pointer.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan {}] {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[Vulkan {}] {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!("[Vulkan {}] {}", type_str, message),
        _ => trace!("[Vulkan {}] {}", type_str, message),
    }

    vk::FALSE
}
