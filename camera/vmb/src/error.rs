use vmbc_sys::VmbErrorType;

/// Coarse classification of a driver-reported error code.
///
/// The driver defines the taxonomy; we only consume it. The variants a
/// caller typically branches on are [ErrorKind::InUse] (buffer revoke while
/// a frame is still referenced by the capture engine) and
/// [ErrorKind::Timeout].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadHandle,
    BadParameter,
    InvalidAccess,
    WrongType,
    InvalidValue,
    Timeout,
    Resources,
    Busy,
    InUse,
    Already,
    RetriesExceeded,
    NotSupported,
    Other,
}

fn classify(code: i32) -> ErrorKind {
    use ErrorKind::*;
    #[allow(non_upper_case_globals)]
    match code {
        VmbErrorType::VmbErrorNotFound | VmbErrorType::VmbErrorTLNotFound => NotFound,
        VmbErrorType::VmbErrorBadHandle => BadHandle,
        VmbErrorType::VmbErrorBadParameter | VmbErrorType::VmbErrorStructSize => BadParameter,
        VmbErrorType::VmbErrorInvalidAccess => InvalidAccess,
        VmbErrorType::VmbErrorWrongType => WrongType,
        VmbErrorType::VmbErrorInvalidValue => InvalidValue,
        VmbErrorType::VmbErrorTimeout => Timeout,
        VmbErrorType::VmbErrorResources | VmbErrorType::VmbErrorInsufficientBufferCount => {
            Resources
        }
        VmbErrorType::VmbErrorBusy => Busy,
        VmbErrorType::VmbErrorInUse => InUse,
        VmbErrorType::VmbErrorAlready => Already,
        VmbErrorType::VmbErrorRetriesExceeded => RetriesExceeded,
        VmbErrorType::VmbErrorNotImplemented | VmbErrorType::VmbErrorNotSupported => NotSupported,
        _ => Other,
    }
}

fn err_str(err: i32) -> &'static str {
    use VmbErrorType::*;
    #[allow(non_upper_case_globals)]
    match err {
        VmbErrorSuccess => "VmbErrorSuccess",
        VmbErrorInternalFault => "VmbErrorInternalFault",
        VmbErrorApiNotStarted => "VmbErrorApiNotStarted",
        VmbErrorNotFound => "VmbErrorNotFound",
        VmbErrorBadHandle => "VmbErrorBadHandle",
        VmbErrorDeviceNotOpen => "VmbErrorDeviceNotOpen",
        VmbErrorInvalidAccess => "VmbErrorInvalidAccess",
        VmbErrorBadParameter => "VmbErrorBadParameter",
        VmbErrorStructSize => "VmbErrorStructSize",
        VmbErrorMoreData => "VmbErrorMoreData",
        VmbErrorWrongType => "VmbErrorWrongType",
        VmbErrorInvalidValue => "VmbErrorInvalidValue",
        VmbErrorTimeout => "VmbErrorTimeout",
        VmbErrorOther => "VmbErrorOther",
        VmbErrorResources => "VmbErrorResources",
        VmbErrorInvalidCall => "VmbErrorInvalidCall",
        VmbErrorNoTL => "VmbErrorNoTL",
        VmbErrorNotImplemented => "VmbErrorNotImplemented",
        VmbErrorNotSupported => "VmbErrorNotSupported",
        VmbErrorIncomplete => "VmbErrorIncomplete",
        VmbErrorIO => "VmbErrorIO",
        VmbErrorValidValueSetNotPresent => "VmbErrorValidValueSetNotPresent",
        VmbErrorGenTLUnspecified => "VmbErrorGenTLUnspecified",
        VmbErrorUnspecified => "VmbErrorUnspecified",
        VmbErrorBusy => "VmbErrorBusy",
        VmbErrorNoData => "VmbErrorNoData",
        VmbErrorParsingChunkData => "VmbErrorParsingChunkData",
        VmbErrorInUse => "VmbErrorInUse",
        VmbErrorUnknown => "VmbErrorUnknown",
        VmbErrorXml => "VmbErrorXml",
        VmbErrorNotAvailable => "VmbErrorNotAvailable",
        VmbErrorNotInitialized => "VmbErrorNotInitialized",
        VmbErrorInvalidAddress => "VmbErrorInvalidAddress",
        VmbErrorAlready => "VmbErrorAlready",
        VmbErrorNoChunkData => "VmbErrorNoChunkData",
        VmbErrorUserCallbackException => "VmbErrorUserCallbackException",
        VmbErrorFeaturesUnavailable => "VmbErrorFeaturesUnavailable",
        VmbErrorTLNotFound => "VmbErrorTLNotFound",
        VmbErrorAmbiguous => "VmbErrorAmbiguous",
        VmbErrorRetriesExceeded => "VmbErrorRetriesExceeded",
        VmbErrorInsufficientBufferCount => "VmbErrorInsufficientBufferCount",
        VmbErrorCustom => "VmbErrorCustom",
        _ => "unknown error",
    }
}

/// An error code returned by a VmbC call.
#[derive(thiserror::Error, Debug, Clone, Copy)]
#[error("VmbC error {code}: {msg}")]
pub struct VmbError {
    pub code: i32,
    pub msg: &'static str,
}

impl VmbError {
    pub fn kind(&self) -> ErrorKind {
        classify(self.code)
    }

    #[inline]
    pub fn is_in_use(&self) -> bool {
        self.kind() == ErrorKind::InUse
    }
}

impl From<i32> for VmbError {
    fn from(code: i32) -> VmbError {
        VmbError {
            code,
            msg: err_str(code),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("loading VmbC library at {vmbc_path}")]
    LibLoading {
        source: libloading::Error,
        vmbc_path: std::path::PathBuf,
    },
    #[error("{source}")]
    Vmb {
        #[from]
        source: VmbError,
    },
    #[error("{source}")]
    NulError {
        #[from]
        source: std::ffi::NulError,
    },
    #[error("{source}")]
    Utf8Error {
        #[from]
        source: std::str::Utf8Error,
    },
    #[error("allocation of {size} bytes (alignment {alignment}) failed")]
    AllocFailed { size: usize, alignment: usize },
    #[error("invalid buffer layout: {size} bytes, alignment {alignment}")]
    BadLayout { size: usize, alignment: usize },
    #[error("unknown pixel format {fmt}")]
    UnknownPixelFormat { fmt: String },
    #[error("unknown pixel format code 0x{code:X}")]
    UnknownPixelFormatCode { code: u32 },
    #[error("invalid call")]
    InvalidCall {},
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn vmb_err(err: i32) -> std::result::Result<(), VmbError> {
    if err == VmbErrorType::VmbErrorSuccess {
        Ok(())
    } else {
        Err(VmbError::from(err))
    }
}

macro_rules! vmb_call_no_err {
    ($expr: expr) => {{
        tracing::debug!("calling: {} {}:{}", stringify!($expr), file!(), line!());
        unsafe { $expr }
    }};
}

macro_rules! vmb_call {
    ($expr: expr) => {{
        let errcode = $crate::error::vmb_call_no_err!($expr);
        tracing::debug!("  errcode: {}", errcode);

        $crate::error::vmb_err(errcode)
    }};
}

pub(crate) use {vmb_call, vmb_call_no_err};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_driver_codes() {
        let e = VmbError::from(VmbErrorType::VmbErrorInUse);
        assert!(e.is_in_use());
        assert_eq!(
            VmbError::from(VmbErrorType::VmbErrorTimeout).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            VmbError::from(VmbErrorType::VmbErrorResources).kind(),
            ErrorKind::Resources
        );
        // anything unrecognized falls into the generic bucket
        assert_eq!(VmbError::from(-12345).kind(), ErrorKind::Other);
        assert_eq!(VmbError::from(-12345).msg, "unknown error");
    }
}
