/// GpuContext - Shared Vulkan objects for every backend resource
///
/// Contains everything needed for GPU operations:
/// - Instance and device for Vulkan API calls
/// - Allocator for memory management
/// - Graphics queue and its family
/// - Submission serials used to retire command buffers
///
/// Owned through `Arc` by the device and by every resource (images, buffers,
/// render passes, pipeline states). The device and instance are destroyed when
/// the last reference goes away, after every resource built on them.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Shared GPU context for all Vulkan resources
pub struct GpuContext {
    /// Vulkan library entry (must outlive the instance)
    _entry: ash::Entry,

    /// Vulkan instance
    pub instance: ash::Instance,

    /// Physical device the logical device was created on
    pub physical_device: vk::PhysicalDevice,

    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue for command submission
    pub graphics_queue: vk::Queue,

    /// Graphics queue family index
    pub graphics_queue_family: u32,

    /// Serial of the most recent queue submission
    submitted_serial: AtomicU64,

    /// Serial of the most recent submission known to have completed
    completed_serial: AtomicU64,

    /// Debug utils loader (for validation layers)
    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    /// Debug messenger handle
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    /// Create a new GPU context
    ///
    /// # Arguments
    ///
    /// * `entry` - Loaded Vulkan library
    /// * `instance` - Vulkan instance
    /// * `physical_device` - Selected physical device
    /// * `device` - Vulkan logical device
    /// * `allocator` - GPU memory allocator
    /// * `graphics_queue` - Graphics queue for command submission
    /// * `graphics_queue_family` - Graphics queue family index
    /// * `debug_utils_loader` - Debug utils loader (if validation enabled)
    /// * `debug_messenger` - Debug messenger handle (if validation enabled)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
        debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) -> Self {
        Self {
            _entry: entry,
            instance,
            physical_device,
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            graphics_queue_family,
            submitted_serial: AtomicU64::new(0),
            completed_serial: AtomicU64::new(0),
            debug_utils_loader,
            debug_messenger,
        }
    }

    /// Serial the next queue submission will carry
    pub fn pending_serial(&self) -> u64 {
        self.submitted_serial.load(Ordering::Acquire) + 1
    }

    /// Record a queue submission, returning its serial
    pub fn advance_submitted_serial(&self) -> u64 {
        self.submitted_serial.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Mark every submission up to `serial` as completed
    pub fn mark_completed(&self, serial: u64) {
        self.completed_serial.fetch_max(serial, Ordering::AcqRel);
    }

    pub fn completed_serial(&self) -> u64 {
        self.completed_serial.load(Ordering::Acquire)
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // 1. Drop allocator: free VkDeviceMemory pages BEFORE destroying device
            ManuallyDrop::drop(&mut self.allocator);

            // 2. Stop forwarding validation messages during destruction
            #[cfg(feature = "vulkan-validation")]
            crate::debug::cleanup_debug_config();

            // 3. Destroy debug messenger BEFORE device and instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 4. Destroy device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
