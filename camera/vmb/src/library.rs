use std::convert::TryInto;

use vmbc_sys::{VmbCameraInfo_t, VmbVersionInfo_t};

use crate::{
    camera::AccessMode,
    error::{vmb_call, vmb_call_no_err, Error, Result},
    handle::{InterfaceHandle, LocalDeviceHandle, StreamHandle, TransportLayerHandle},
};

/// The loaded VmbC shared library.
///
/// `VmbStartup` runs on construction and `VmbShutdown` on drop, exactly
/// once. All other wrapper types borrow this, which pins the driver's
/// lifetime to one value.
pub struct VmbLibrary {
    pub raw: vmbc_sys::VimbaC,
    started: bool,
}

impl VmbLibrary {
    pub fn new() -> Result<Self> {
        let vmbc_path = match std::env::var_os("VIMBA_X_HOME") {
            Some(vimba_x_home) => std::path::PathBuf::from(vimba_x_home)
                .join("api")
                .join("lib"),
            None => {
                #[cfg(target_os = "windows")]
                let vmbc_path = {
                    // Tell Windows to add this directory to DLL search path.
                    let dll_path =
                        windows::core::s!(r#"C:\Program Files\Allied Vision\Vimba X\bin"#);
                    unsafe { windows::Win32::System::LibraryLoader::SetDllDirectoryA(dll_path) }?;
                    // Now we directly open this DLL, which should now be on the search path.
                    "VmbC.dll"
                };

                #[cfg(target_os = "linux")]
                let vmbc_path = "/opt/VimbaX_2024-1/api/lib/libVmbC.so";

                #[cfg(target_os = "macos")]
                let vmbc_path = "/Library/Frameworks/VmbC.framework/Versions/A/VmbC";

                std::path::PathBuf::from(vmbc_path)
            }
        };

        Self::from_dynamic_lib_path(vmbc_path)
    }

    pub fn from_dynamic_lib_path<P: AsRef<std::path::Path>>(vmbc_path: P) -> Result<Self> {
        let raw = match unsafe { vmbc_sys::VimbaC::new(vmbc_path.as_ref()) } {
            Ok(raw) => raw,
            Err(source) => {
                return Err(Error::LibLoading {
                    source,
                    vmbc_path: vmbc_path.as_ref().to_path_buf(),
                });
            }
        };

        vmb_call!(raw.VmbStartup(std::ptr::null()))?;
        Ok(VmbLibrary { raw, started: true })
    }

    /// This is unsafe because really you should drop [VmbLibrary] rather
    /// than call this. After calling it, nothing guarantees `VmbShutdown`
    /// will not run again.
    pub unsafe fn shutdown(&self) {
        vmb_call_no_err!(self.raw.VmbShutdown());
    }

    /// How many cameras the driver currently sees.
    pub fn n_cameras(&self) -> Result<usize> {
        let mut n_count = 0;
        vmb_call!(self
            .raw
            .VmbCamerasList(std::ptr::null_mut(), 0, &mut n_count, 0))?;
        Ok(n_count as usize)
    }

    /// Enumerate up to `n_count` cameras. The usual two-call pattern: get
    /// the count with [VmbLibrary::n_cameras], then fill.
    pub fn camera_info(&self, n_count: usize) -> Result<Vec<CameraInfo>> {
        let mut cameras: Vec<VmbCameraInfo_t> = vec![
            VmbCameraInfo_t {
                cameraIdString: std::ptr::null_mut(),
                cameraIdExtended: std::ptr::null_mut(),
                cameraName: std::ptr::null_mut(),
                modelName: std::ptr::null_mut(),
                serialString: std::ptr::null_mut(),
                transportLayerHandle: std::ptr::null_mut(),
                interfaceHandle: std::ptr::null_mut(),
                localDeviceHandle: std::ptr::null_mut(),
                streamHandles: std::ptr::null_mut(),
                streamCount: 0,
                permittedAccess: 0,
            };
            n_count
        ];

        let mut n_found_count = 0;
        vmb_call!(self.raw.VmbCamerasList(
            cameras[..].as_mut_ptr(),
            n_count.try_into().unwrap(),
            &mut n_found_count,
            std::mem::size_of::<VmbCameraInfo_t>().try_into().unwrap()
        ))?;

        cameras
            .into_iter()
            .take(n_found_count as usize)
            .map(CameraInfo::from_raw)
            .collect()
    }
}

impl Drop for VmbLibrary {
    fn drop(&mut self) {
        if self.started {
            vmb_call_no_err!(self.raw.VmbShutdown());
            self.started = false;
        }
    }
}

/// Driver version, from `VmbVersionQuery`.
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionInfo {
    pub fn new(lib: &VmbLibrary) -> Result<Self> {
        let mut version_info = VmbVersionInfo_t {
            major: 0,
            minor: 0,
            patch: 0,
        };
        vmb_call!(lib.raw.VmbVersionQuery(
            &mut version_info,
            std::mem::size_of::<VmbVersionInfo_t>() as u32
        ))?;
        Ok(Self {
            major: version_info.major,
            minor: version_info.minor,
            patch: version_info.patch,
        })
    }
}

/// Static information about one enumerated camera.
#[derive(Debug)]
pub struct CameraInfo {
    pub camera_id_string: String,
    pub camera_id_extended: String,
    pub camera_name: String,
    pub model_name: String,
    pub serial_string: String,
    pub permitted_access: AccessMode,
    /// The transport layer this camera is reachable through.
    pub transport_layer: TransportLayerHandle,
    /// The interface this camera is reachable through.
    pub interface: InterfaceHandle,
    /// Populated only while the camera is open.
    pub local_device: Option<LocalDeviceHandle>,
    /// Populated only while the camera is open.
    pub streams: Vec<StreamHandle>,
}

impl CameraInfo {
    fn from_raw(ci: VmbCameraInfo_t) -> Result<Self> {
        fn cstr(ptr: *const std::os::raw::c_char) -> Result<String> {
            Ok(unsafe { std::ffi::CStr::from_ptr(ptr).to_str() }?.to_string())
        }

        Ok(CameraInfo {
            camera_id_string: cstr(ci.cameraIdString)?,
            camera_id_extended: cstr(ci.cameraIdExtended)?,
            camera_name: cstr(ci.cameraName)?,
            model_name: cstr(ci.modelName)?,
            serial_string: cstr(ci.serialString)?,
            permitted_access: AccessMode::new(ci.permittedAccess.try_into().unwrap()),
            transport_layer: TransportLayerHandle::new(ci.transportLayerHandle),
            interface: InterfaceHandle::new(ci.interfaceHandle),
            local_device: if ci.localDeviceHandle.is_null() {
                None
            } else {
                Some(LocalDeviceHandle::new(ci.localDeviceHandle))
            },
            streams: if ci.streamHandles.is_null() {
                Vec::new()
            } else {
                unsafe { std::slice::from_raw_parts(ci.streamHandles, ci.streamCount as usize) }
                    .iter()
                    .map(|&raw| StreamHandle::new(raw))
                    .collect()
            },
        })
    }
}
