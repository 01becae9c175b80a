use std::convert::TryInto;

use vmbc_sys::{VmbFeaturePersistSettings_t, VmbFrameCallback, VmbFrame_t};

use crate::{
    error::{vmb_call, Error, Result},
    frame::Frame,
    handle::CameraHandle,
};

/// Access mode requested when opening a camera.
#[derive(Debug, Clone, Copy)]
pub struct AccessMode {
    code: u32,
}

impl AccessMode {
    pub fn new(code: u32) -> Self {
        Self { code }
    }
    pub fn as_u32(&self) -> u32 {
        self.code
    }
}

pub mod access_mode {
    use vmbc_sys::VmbAccessModeType::*;
    pub const FULL: crate::AccessMode = crate::AccessMode {
        code: VmbAccessModeFull,
    };
    pub const READ: crate::AccessMode = crate::AccessMode {
        code: VmbAccessModeRead,
    };
}

/// An opened camera.
///
/// Closed on drop. All driver access goes through the borrowed library so a
/// camera can never outlive the loaded VmbC module.
pub struct Camera<'lib> {
    handle: CameraHandle,
    is_open: bool,
    lib: &'lib vmbc_sys::VimbaC,
}

fn _test_camera_is_send() {
    // Compile-time test to ensure Camera implements Send trait.
    fn implements<T: Send>() {}
    implements::<Camera>();
}

impl<'lib> std::fmt::Debug for Camera<'lib> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Camera")
            .field("handle", &self.handle)
            .finish()
    }
}

impl<'lib> Camera<'lib> {
    pub fn open(
        camera_id: &str,
        access_mode: AccessMode,
        lib: &'lib vmbc_sys::VimbaC,
    ) -> Result<Self> {
        let id = std::ffi::CString::new(camera_id)?;
        let mut handle = std::mem::MaybeUninit::<vmbc_sys::VmbHandle_t>::uninit();
        vmb_call!(lib.VmbCameraOpen(id.as_ptr(), access_mode.as_u32(), handle.as_mut_ptr()))?;
        let handle = CameraHandle::new(unsafe { handle.assume_init() });
        let result = Self {
            handle,
            is_open: true,
            lib,
        };
        tracing::debug!("opened {:?}", result);
        Ok(result)
    }

    pub fn close(mut self) -> Result<()> {
        if self.is_open {
            vmb_call!(self.lib.VmbCameraClose(self.handle.as_raw()))?;
        }
        self.is_open = false; // prevent closing again on drop
        Ok(())
    }

    pub fn handle(&self) -> CameraHandle {
        self.handle
    }

    // ----- typed feature access by string name -----

    pub fn feature_int(&self, name: &str) -> Result<i64> {
        let mut value = 0;
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self
            .lib
            .VmbFeatureIntGet(self.handle.as_raw(), name_c.as_ptr(), &mut value))?;
        Ok(value)
    }

    pub fn feature_int_set(&self, name: &str, value: i64) -> Result<()> {
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self
            .lib
            .VmbFeatureIntSet(self.handle.as_raw(), name_c.as_ptr(), value))?;
        Ok(())
    }

    pub fn feature_float(&self, name: &str) -> Result<f64> {
        let mut value = 0.0;
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self
            .lib
            .VmbFeatureFloatGet(self.handle.as_raw(), name_c.as_ptr(), &mut value))?;
        Ok(value)
    }

    pub fn feature_float_set(&self, name: &str, value: f64) -> Result<()> {
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self
            .lib
            .VmbFeatureFloatSet(self.handle.as_raw(), name_c.as_ptr(), value))?;
        Ok(())
    }

    pub fn feature_float_range_query(&self, name: &str) -> Result<(f64, f64)> {
        let mut min = 0.0;
        let mut max = 0.0;
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self.lib.VmbFeatureFloatRangeQuery(
            self.handle.as_raw(),
            name_c.as_ptr(),
            &mut min,
            &mut max
        ))?;
        Ok((min, max))
    }

    pub fn feature_boolean(&self, name: &str) -> Result<bool> {
        let mut value = 0;
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self
            .lib
            .VmbFeatureBoolGet(self.handle.as_raw(), name_c.as_ptr(), &mut value))?;
        Ok(value != 0)
    }

    pub fn feature_boolean_set(&self, name: &str, value: bool) -> Result<()> {
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self.lib.VmbFeatureBoolSet(
            self.handle.as_raw(),
            name_c.as_ptr(),
            if value { 1 } else { 0 }
        ))?;
        Ok(())
    }

    pub fn feature_enum(&self, name: &str) -> Result<&'static str> {
        let mut value: *const std::os::raw::c_char = std::ptr::null_mut();
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self
            .lib
            .VmbFeatureEnumGet(self.handle.as_raw(), name_c.as_ptr(), &mut value))?;
        Ok(unsafe { std::ffi::CStr::from_ptr(value).to_str()? })
    }

    pub fn feature_enum_set(&self, name: &str, value: &str) -> Result<()> {
        let value_c = std::ffi::CString::new(value)?;
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self.lib.VmbFeatureEnumSet(
            self.handle.as_raw(),
            name_c.as_ptr(),
            value_c.as_ptr()
        ))?;
        Ok(())
    }

    /// All enum entries the feature currently offers.
    pub fn feature_enum_range_query(&self, name: &str) -> Result<Vec<String>> {
        let name_c = std::ffi::CString::new(name)?;
        // initial query: get size of array
        let mut num_found = 0;
        vmb_call!(self.lib.VmbFeatureEnumRangeQuery(
            self.handle.as_raw(),
            name_c.as_ptr(),
            std::ptr::null_mut(),
            0,
            &mut num_found,
        ))?;

        let mut entries = vec![std::ptr::null(); num_found.try_into().unwrap()];
        let mut num_filled = 0;
        vmb_call!(self.lib.VmbFeatureEnumRangeQuery(
            self.handle.as_raw(),
            name_c.as_ptr(),
            entries.as_mut_ptr(),
            num_found,
            &mut num_filled,
        ))?;

        entries[..num_filled as usize]
            .iter()
            .map(|&ptr| {
                let value = unsafe { std::ffi::CStr::from_ptr(ptr) }.to_str()?.to_string();
                Ok(value)
            })
            .collect()
    }

    pub fn feature_string_set(&self, name: &str, value: &str) -> Result<()> {
        let value_c = std::ffi::CString::new(value)?;
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self.lib.VmbFeatureStringSet(
            self.handle.as_raw(),
            name_c.as_ptr(),
            value_c.as_ptr()
        ))?;
        Ok(())
    }

    pub fn feature_string(&self, name: &str) -> Result<String> {
        let name_c = std::ffi::CString::new(name)?;
        // initial query: get required buffer size
        let mut size_filled = 0;
        vmb_call!(self.lib.VmbFeatureStringGet(
            self.handle.as_raw(),
            name_c.as_ptr(),
            std::ptr::null_mut(),
            0,
            &mut size_filled,
        ))?;
        let mut buf = vec![0u8; size_filled.try_into().unwrap()];
        vmb_call!(self.lib.VmbFeatureStringGet(
            self.handle.as_raw(),
            name_c.as_ptr(),
            buf.as_mut_ptr() as *mut std::os::raw::c_char,
            size_filled,
            &mut size_filled,
        ))?;
        // trailing NUL is included in the reported size
        let s = std::ffi::CStr::from_bytes_until_nul(&buf)
            .map_err(|_| Error::InvalidCall {})?
            .to_str()?
            .to_string();
        Ok(s)
    }

    /// Query the access permissions of feature with `name`.
    ///
    /// The return value is (is_readable, is_writeable).
    pub fn feature_access_query(&self, name: &str) -> Result<(bool, bool)> {
        let name_c = std::ffi::CString::new(name)?;
        let mut is_readable = 0;
        let mut is_writeable = 0;
        vmb_call!(self.lib.VmbFeatureAccessQuery(
            self.handle.as_raw(),
            name_c.as_ptr(),
            &mut is_readable,
            &mut is_writeable,
        ))?;
        Ok((is_readable != 0, is_writeable != 0))
    }

    /// Run a command feature. The call returns as soon as the command is
    /// dispatched; completion of asynchronously completing commands is
    /// checked with [Camera::command_done].
    pub fn command_run(&self, name: &str) -> Result<()> {
        tracing::debug!("camera {:?} command_run {}", self, name);
        let name_c = std::ffi::CString::new(name)?;
        vmb_call!(self
            .lib
            .VmbFeatureCommandRun(self.handle.as_raw(), name_c.as_ptr()))?;
        Ok(())
    }

    /// Whether a previously run command feature has completed.
    pub fn command_done(&self, name: &str) -> Result<bool> {
        let name_c = std::ffi::CString::new(name)?;
        let mut is_done = 0;
        vmb_call!(self.lib.VmbFeatureCommandIsDone(
            self.handle.as_raw(),
            name_c.as_ptr(),
            &mut is_done
        ))?;
        Ok(is_done != 0)
    }

    pub fn pixel_format(&self) -> Result<machine_vision_formats::PixFmt> {
        let pixel_format = self.feature_enum("PixelFormat")?;
        crate::pixfmt::str_to_pixel_format(pixel_format)
    }

    // ----- frame buffer protocol -----

    /// The buffer size one frame of the current configuration needs.
    pub fn payload_size(&self) -> Result<usize> {
        let mut payload_size: u32 = 0;
        vmb_call!(self
            .lib
            .VmbPayloadSizeGet(self.handle.as_raw(), &mut payload_size))?;
        Ok(payload_size as usize)
    }

    /// The buffer alignment the streaming engine requires, or pointer size
    /// when the driver does not report one.
    pub fn buffer_alignment(&self) -> usize {
        match self.feature_int("StreamBufferAlignment") {
            Ok(alignment) if alignment > 0 => alignment as usize,
            Ok(_) | Err(_) => {
                tracing::debug!("StreamBufferAlignment unavailable, using pointer size");
                std::mem::size_of::<usize>()
            }
        }
    }

    /// Allocate one correctly sized, correctly aligned frame buffer for this
    /// camera's current configuration.
    pub fn alloc_frame(&self) -> Result<Frame> {
        let payload_size = self.payload_size()?;
        Frame::with_layout(payload_size, self.buffer_alignment())
    }

    /// Register a frame buffer with the driver's streaming engine.
    pub fn frame_announce(&self, frame: &mut Frame) -> Result<()> {
        if frame.announced {
            return Err(Error::InvalidCall {});
        }

        tracing::debug!("camera {:?} announcing frame {:?}", self, frame);

        vmb_call!(self.lib.VmbFrameAnnounce(
            self.handle.as_raw(),
            frame.descriptor(),
            std::mem::size_of::<VmbFrame_t>().try_into().unwrap()
        ))?;

        frame.announced = true;
        Ok(())
    }

    /// Deregister a frame buffer. Fails with an in-use error while the
    /// capture engine still references the buffer.
    pub fn frame_revoke(&self, frame: &mut Frame) -> Result<()> {
        tracing::debug!("camera {:?} revoking frame {:?}", self, frame);
        vmb_call!(self
            .lib
            .VmbFrameRevoke(self.handle.as_raw(), frame.descriptor()))?;
        frame.announced = false;
        Ok(())
    }

    /// Start the capture engine. Buffers must already be announced.
    pub fn capture_start(&self) -> Result<()> {
        tracing::debug!("camera {:?} capture start", self);
        vmb_call!(self.lib.VmbCaptureStart(self.handle.as_raw()))?;
        Ok(())
    }

    /// Stop the capture engine. Blocks until an in-flight frame-done
    /// callback has returned.
    pub fn capture_end(&self) -> Result<()> {
        vmb_call!(self.lib.VmbCaptureEnd(self.handle.as_raw()))?;
        Ok(())
    }

    pub fn capture_frame_queue(&self, frame: &mut Frame) -> Result<()> {
        tracing::debug!("camera {:?} queueing frame {:?}", self, frame);
        vmb_call!(self
            .lib
            .VmbCaptureFrameQueue(self.handle.as_raw(), frame.descriptor(), None))?;
        Ok(())
    }

    pub fn capture_frame_queue_with_callback(
        &self,
        frame: &mut Frame,
        callback: VmbFrameCallback,
    ) -> Result<()> {
        tracing::debug!("camera {:?} queueing frame {:?}", self, frame);
        vmb_call!(self.lib.VmbCaptureFrameQueue(
            self.handle.as_raw(),
            frame.descriptor(),
            callback
        ))?;
        Ok(())
    }

    pub fn capture_queue_flush(&self) -> Result<()> {
        vmb_call!(self.lib.VmbCaptureQueueFlush(self.handle.as_raw()))?;
        Ok(())
    }

    /// Block until the next queued frame is filled or `timeout` (msec)
    /// expires.
    pub fn capture_frame_wait(&self, frame: &mut Frame, timeout: u32) -> Result<()> {
        tracing::debug!("camera {:?} waiting for frame {:?}", self, frame);
        vmb_call!(self.lib.VmbCaptureFrameWait(
            self.handle.as_raw(),
            frame.descriptor(),
            timeout
        ))?;
        Ok(())
    }

    // ----- settings persistence -----

    pub fn settings_save<P: AsRef<std::path::Path>>(
        &self,
        out_path: P,
        settings: &VmbFeaturePersistSettings_t,
    ) -> Result<()> {
        let mut buf = path_to_bytes(out_path);
        buf.push(0);
        let sz = std::mem::size_of::<VmbFeaturePersistSettings_t>();
        let sz = sz.try_into().unwrap(); // convert to u32 from usize
        vmb_call!(self.lib.VmbSettingsSave(
            self.handle.as_raw(),
            buf.as_ptr() as *const i8,
            settings as *const _,
            sz
        ))?;
        Ok(())
    }

    pub fn settings_load<P: AsRef<std::path::Path>>(
        &self,
        in_path: P,
        settings: &VmbFeaturePersistSettings_t,
    ) -> Result<()> {
        let mut buf = path_to_bytes(in_path);
        buf.push(0);
        let sz = std::mem::size_of::<VmbFeaturePersistSettings_t>();
        let sz = sz.try_into().unwrap(); // convert to u32 from usize
        vmb_call!(self.lib.VmbSettingsLoad(
            self.handle.as_raw(),
            buf.as_ptr() as *const i8,
            settings as *const _,
            sz
        ))?;
        Ok(())
    }
}

impl<'lib> Drop for Camera<'lib> {
    fn drop(&mut self) {
        if self.is_open {
            if let Err(e) = vmb_call!(self.lib.VmbCameraClose(self.handle.as_raw())) {
                tracing::error!("closing camera {:?}: {}", self.handle, e);
            }
            self.is_open = false;
        }
    }
}

pub fn default_feature_persist_settings() -> VmbFeaturePersistSettings_t {
    // Defaults as used by the Vimba X viewer.
    VmbFeaturePersistSettings_t {
        persistType: vmbc_sys::VmbFeaturePersistType::VmbFeaturePersistStreamable,
        modulePersistFlags: vmbc_sys::VmbModulePersistFlagsType::VmbModulePersistFlagsNone,
        maxIterations: 10,
        loggingLevel: 4,
    }
}

/// Convert path to bytes
#[cfg(unix)]
fn path_to_bytes<P: AsRef<std::path::Path>>(path: P) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_ref().as_os_str().as_bytes().to_vec()
}

/// Convert path to bytes
#[cfg(not(unix))]
fn path_to_bytes<P: AsRef<std::path::Path>>(path: P) -> Vec<u8> {
    // The VmbC docs do not specify the path encoding on Windows, so this is
    // likely wrong for non-ASCII paths.
    path.as_ref().to_string_lossy().to_string().into_bytes()
}
