/// Validation layer messenger
///
/// Messages from VK_LAYER_KHRONOS_validation are filtered by the configured
/// severity and category, counted in `ValidationStats`, logged through the
/// engine logger and optionally appended to a file.

use ash::vk;
use colored::*;
use nebula_engine::config::{DebugOutput, DebugSettings, DebugSeverity, ValidationStats};
use nebula_engine::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

const SOURCE: &str = "nebula::vulkan::Validation";

/// Settings read by the callback (None while no messenger is alive)
static DEBUG_SETTINGS: Mutex<Option<DebugSettings>> = Mutex::new(None);

/// Occurrences per message ID, used to tag repeats
static MESSAGE_COUNTS: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

static ERRORS: AtomicU32 = AtomicU32::new(0);
static WARNINGS: AtomicU32 = AtomicU32::new(0);
static INFOS: AtomicU32 = AtomicU32::new(0);
static VERBOSES: AtomicU32 = AtomicU32::new(0);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the settings used by `vulkan_debug_callback`
pub(crate) fn init_debug_settings(settings: DebugSettings) {
    *lock(&DEBUG_SETTINGS) = Some(settings);
}

/// Stop handling messages (called before the messenger is destroyed)
pub(crate) fn clear_debug_settings() {
    *lock(&DEBUG_SETTINGS) = None;
    *lock(&MESSAGE_COUNTS) = None;
}

/// Snapshot of the validation counters
pub fn validation_stats() -> ValidationStats {
    ValidationStats {
        errors: ERRORS.load(Ordering::Relaxed),
        warnings: WARNINGS.load(Ordering::Relaxed),
        info: INFOS.load(Ordering::Relaxed),
        verbose: VERBOSES.load(Ordering::Relaxed),
    }
}

pub fn reset_validation_stats() {
    ERRORS.store(0, Ordering::Relaxed);
    WARNINGS.store(0, Ordering::Relaxed);
    INFOS.store(0, Ordering::Relaxed);
    VERBOSES.store(0, Ordering::Relaxed);
}

/// Print the validation counters to stderr
pub fn print_validation_stats_report() {
    let stats = validation_stats();
    eprintln!("\n{}", "=== Vulkan Validation Statistics ===".bright_blue().bold());
    eprintln!("  {}: {}", "Errors".red().bold(), stats.errors);
    eprintln!("  {}: {}", "Warnings".yellow().bold(), stats.warnings);
    eprintln!("  {}: {}", "Info".cyan(), stats.info);
    eprintln!("  {}: {}", "Verbose".bright_black(), stats.verbose);
    eprintln!("  Total: {}", stats.total());
    if stats.errors == 0 && stats.warnings == 0 {
        eprintln!("  {}", "No validation errors or warnings".green());
    }
    eprintln!();
}

/// Severity mask handed to the messenger at creation
pub(crate) fn severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

/// Messenger create info shared by instance creation and the standalone messenger
pub(crate) fn messenger_create_info(
    severity: DebugSeverity,
) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(severity_flags(severity))
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
}

/// Should a message of this severity be shown under `severity`?
pub(crate) fn severity_passes(
    severity: DebugSeverity,
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
) -> bool {
    message_severity.intersects(severity_flags(severity))
}

/// Message category label, or None if the filter hides it
pub(crate) fn category(
    settings: &DebugSettings,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
) -> Option<&'static str> {
    let filter = &settings.message_filter;
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        filter.show_validation.then_some("Validation")
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        filter.show_performance.then_some("Performance")
    } else {
        filter.show_general.then_some("General")
    }
}

fn count(message_severity: vk::DebugUtilsMessageSeverityFlagsEXT) {
    let counter = if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        &ERRORS
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        &WARNINGS
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        &INFOS
    } else {
        &VERBOSES
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

fn track(message_id: &str) -> u32 {
    let mut counts = lock(&MESSAGE_COUNTS);
    let occurrences = counts.get_or_insert_with(FxHashMap::default).entry(message_id.to_string()).or_insert(0);
    *occurrences += 1;
    *occurrences
}

fn write_to_file(path: &str, message: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", message);
    }
}

/// Route one validation message according to the installed settings
pub(crate) fn handle_message(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    message_id: &str,
    message: &str,
) {
    let Some(settings) = lock(&DEBUG_SETTINGS).clone() else {
        return;
    };
    if !severity_passes(settings.severity, message_severity) {
        return;
    }
    let Some(category) = category(&settings, message_type) else {
        return;
    };

    let occurrences = if settings.enable_stats {
        count(message_severity);
        track(message_id)
    } else {
        1
    };
    let repeat = if occurrences > 1 { format!(" [x{}]", occurrences) } else { String::new() };
    let text = format!("[{}]{} {}: {}", category, repeat, message_id, message);

    let is_error = message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
    let to_console = matches!(settings.output, DebugOutput::Console | DebugOutput::Both(_));
    if to_console {
        if is_error {
            engine_error!(SOURCE, "{}", text);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            engine_warn!(SOURCE, "{}", text);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            engine_info!(SOURCE, "{}", text);
        } else {
            engine_trace!(SOURCE, "{}", text);
        }
    }
    if let DebugOutput::File(path) | DebugOutput::Both(path) = &settings.output {
        write_to_file(path, &text);
    }

    if is_error && settings.panic_on_error {
        panic!("Vulkan validation error (panic_on_error): {}", text);
    }
    if is_error && settings.break_on_error {
        engine_debug!(SOURCE, "break_on_error set, aborting");
        std::process::abort();
    }
}

/// Debug messenger callback registered with the validation layers
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let data = &*p_callback_data;
    let message_id = if data.p_message_id_name.is_null() {
        "Unknown".into()
    } else {
        CStr::from_ptr(data.p_message_id_name).to_string_lossy()
    };
    let message = if data.p_message.is_null() {
        "".into()
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };
    handle_message(message_severity, message_type, &message_id, &message);
    vk::FALSE
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
