//! Newtype wrappers for the driver's opaque module handles.
//!
//! VmbC uses one `VmbHandle_t` type for every module kind (transport layer,
//! interface, camera, local device, stream). Passing the wrong kind to a
//! call is accepted by the compiler and rejected only at runtime by the
//! driver, so each kind gets its own wrapper type here. The underlying
//! resource is owned by the driver; these are identifiers only.

use vmbc_sys::VmbHandle_t;

macro_rules! module_handle {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub struct $name(VmbHandle_t);

        impl $name {
            pub(crate) fn new(raw: VmbHandle_t) -> Self {
                Self(raw)
            }

            /// The raw driver handle, for passing back into VmbC calls.
            #[inline]
            pub fn as_raw(&self) -> VmbHandle_t {
                self.0
            }

            /// The handle's pointer value, usable as a map key.
            #[inline]
            pub fn key(&self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(fmt, "{}({:p})", stringify!($name), self.0)
            }
        }

        // The handle is an opaque identifier, not a reference to memory we
        // may dereference, so moving it across threads is sound.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}
    };
}

module_handle!(
    /// Handle of an opened camera (remote device).
    CameraHandle
);
module_handle!(
    /// Handle of the interface a camera is reachable through.
    InterfaceHandle
);
module_handle!(
    /// Handle of a GenTL transport layer module.
    TransportLayerHandle
);
module_handle!(
    /// Handle of one stream of an opened camera.
    StreamHandle
);
module_handle!(
    /// Handle of the local device module of an opened camera.
    LocalDeviceHandle
);

fn _test_handles_are_send() {
    fn implements<T: Send + Sync>() {}
    implements::<CameraHandle>();
    implements::<StreamHandle>();
}
