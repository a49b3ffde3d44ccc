/// Vulkan Debug Messenger - routes validation layer messages to the engine logger
///
/// Messages are counted per severity and identical messages are grouped, the
/// repeat count is appended to the logged line.

use ash::vk;
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use strata_gpu::strata::log::LogSeverity;
use strata_gpu::strata::Engine;

pub(crate) const LOG_SOURCE: &str = "strata::vulkan::validation";

/// Global debug configuration (shared across callbacks)
static DEBUG_CONFIG: Mutex<Option<DebugConfig>> = Mutex::new(None);

/// Global validation statistics
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrence count per message text
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Validation callback configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugConfig {
    /// Least severe validation message forwarded to the logger
    pub min_severity: LogSeverity,
    /// Count messages per severity
    pub enable_stats: bool,
    /// Panic on any validation error (strict test runs)
    pub panic_on_error: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            min_severity: LogSeverity::Debug,
            enable_stats: true,
            panic_on_error: false,
        }
    }
}

/// Validation message counts since the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn increment(&self, severity: LogSeverity) {
        let counter = match severity {
            LogSeverity::Error => &self.errors,
            LogSeverity::Warn => &self.warnings,
            LogSeverity::Info | LogSeverity::Debug => &self.info,
            LogSeverity::Trace => &self.verbose,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Install `config` and reset statistics
pub fn init_debug_config(config: DebugConfig) {
    reset_validation_stats();
    *DEBUG_CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = Some(config);
}

/// Remove the configuration, later callbacks are ignored
pub fn cleanup_debug_config() {
    *DEBUG_CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = None;
    *MESSAGE_TRACKER.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Get current validation statistics
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Zero the counters and forget grouped messages
pub fn reset_validation_stats() {
    VALIDATION_STATS.reset();
    *MESSAGE_TRACKER.lock().unwrap_or_else(PoisonError::into_inner) = Some(FxHashMap::default());
}

/// Engine severity of a validation message
pub(crate) fn severity_to_log(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogSeverity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        LogSeverity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        LogSeverity::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        LogSeverity::Debug
    } else {
        LogSeverity::Trace
    }
}

pub(crate) fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

/// Count `message` and return how often it has been seen
fn track_message(message: &str) -> u32 {
    let mut tracker = MESSAGE_TRACKER.lock().unwrap_or_else(PoisonError::into_inner);
    let messages = tracker.get_or_insert_with(FxHashMap::default);
    let count = messages.entry(message.to_string()).or_insert(0);
    *count += 1;
    *count
}

/// Handle one validation message, returns the severity it was logged at
pub(crate) fn handle_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    message_id: &str,
    message: &str,
) -> Option<LogSeverity> {
    let config = (*DEBUG_CONFIG.lock().unwrap_or_else(PoisonError::into_inner))?;

    let log_severity = severity_to_log(severity);
    if log_severity < config.min_severity {
        return None;
    }

    let occurrences = if config.enable_stats {
        VALIDATION_STATS.increment(log_severity);
        track_message(message)
    } else {
        1
    };
    let repeat = if occurrences > 1 { format!(" [x{}]", occurrences) } else { String::new() };

    Engine::log(
        log_severity,
        LOG_SOURCE,
        format!("[{}]{} {}: {}", message_type_label(message_type), repeat, message_id, message),
    );

    if config.panic_on_error && log_severity == LogSeverity::Error {
        panic!("Vulkan validation error {}: {}", message_id, message);
    }
    Some(log_severity)
}

/// Vulkan debug messenger callback
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let message_id = if callback_data.p_message_id_name.is_null() {
        "Unknown".into()
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };
    let message = if callback_data.p_message.is_null() {
        "No message".into()
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    handle_message(message_severity, message_type, &message_id, &message);

    vk::FALSE // Don't abort Vulkan execution
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
