pub mod allocator;
pub mod deploy;
pub mod fake;
pub mod filesystem;
pub mod health;
pub mod lifecycle;
pub mod pipeline;
pub mod rollback;
pub mod traits;
pub mod validate;

pub use allocator::{reconcile_ports, NoPortsAvailable, PortAllocator};
pub use lifecycle::{Instance, LifecycleState, TenantRecord};
pub use pipeline::{HealthPolicy, PipelineDeps, ProvisionError, ProvisionInstancePipeline};
