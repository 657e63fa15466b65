//! Application services sitting between the HTTP handlers and the pipeline crates.

pub mod acquisition;
pub mod maintenance;

pub use acquisition::{
    Acquired, AcquisitionService, BatchEntry, BatchFailure, BatchReport, Compensation,
    DirectUploadForm, ImportReport, RollbackFailure, StoredUpload,
};
pub use maintenance::{MaintenanceService, ReloadFailure, ReloadReport};
