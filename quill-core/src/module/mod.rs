//! Module identity, loading and surface extraction

pub mod identity;
pub mod loader;
pub mod registry;
pub mod scan;
pub mod surface;
pub mod transport;

pub use identity::{ModuleIdentity, RegistryKind, RegistrySpecifier, SourceKind, Specifier};
pub use loader::{ModuleLoader, Resolved};
pub use registry::{publish_allowed, OfflineRegistry, RegistryClient, StaticRegistry};
pub use scan::scan_native;
pub use surface::{
    extract_guest, Binding, EdgeKind, EdgeOrigin, ExportSurface, ImportRequest, SurfaceRecord,
    SIDE_EFFECT_MARKER,
};
pub use transport::{OfflineTransport, StaticTransport, Transport};
