//! Microphone enumeration via the MMDevice API.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use rewind_core::models::audio_models::SourceInfo;
use rewind_core::models::error::CaptureError;

/// RAII pairing of `CoInitializeEx` with `CoUninitialize`.
pub(crate) struct ComGuard;

impl ComGuard {
    pub(crate) fn init() -> std::result::Result<Self, CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| CaptureError::SourceUnavailable(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

/// List active capture endpoints. Callable from any thread.
pub fn list_capture_devices() -> std::result::Result<Vec<SourceInfo>, CaptureError> {
    let _com = ComGuard::init()?;
    unsafe {
        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
            .map_err(|e| CaptureError::SourceUnavailable(format!("failed to create enumerator: {}", e)))?;

        let collection = enumerator
            .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
            .map_err(|e| CaptureError::SourceUnavailable(format!("EnumAudioEndpoints failed: {}", e)))?;
        let count = collection
            .GetCount()
            .map_err(|e| CaptureError::SourceUnavailable(format!("GetCount failed: {}", e)))?;

        let default_id = enumerator
            .GetDefaultAudioEndpoint(eCapture, eConsole)
            .ok()
            .and_then(|d| d.GetId().ok())
            .and_then(|id| id.to_string().ok());

        let mut devices = Vec::new();
        for i in 0..count {
            let Ok(device) = collection.Item(i) else {
                continue;
            };
            let Some(id) = device.GetId().ok().and_then(|id| id.to_string().ok()) else {
                continue;
            };
            let name = friendly_name(&device).unwrap_or_else(|| format!("Microphone {}", i + 1));
            let is_default = default_id.as_deref() == Some(id.as_str());
            devices.push(SourceInfo { id, name, is_default });
        }
        Ok(devices)
    }
}

/// Read `PKEY_Device_FriendlyName` from the device property store.
unsafe fn friendly_name(device: &IMMDevice) -> Option<String> {
    let store = device.OpenPropertyStore(STGM_READ).ok()?;
    let value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
    let name = BSTR::try_from(&value).ok()?.to_string();
    (!name.is_empty()).then_some(name)
}
