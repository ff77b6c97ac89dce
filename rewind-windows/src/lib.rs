//! # rewind-windows
//!
//! Windows WASAPI capture source for the rewind engine.
//!
//! Provides:
//! - `WasapiCaptureSource`: microphone capture via a shared-mode WASAPI endpoint
//! - `list_capture_devices`: active microphones via the MMDevice API
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use rewind_core::{CaptureEngine, WavSinkFactory};
//! use rewind_windows::WasapiCaptureSource;
//!
//! let source = WasapiCaptureSource::default_device();
//! let sinks = Arc::new(WavSinkFactory::new(recordings_dir));
//! let engine = CaptureEngine::builder(Box::new(source), sinks).spawn()?;
//! ```

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;

#[cfg(target_os = "windows")]
pub use device_enumerator::list_capture_devices;
#[cfg(target_os = "windows")]
pub use wasapi_capture::WasapiCaptureSource;
