pub mod backup;
pub mod module;
pub mod restore;

pub use backup::{BackupOptions, BackupRecord, BackupStatus, BackupType};
pub use module::DataModule;
pub use restore::{monotonic_progress, RestoreFlags, RestoreOperation, RestoreStatus};
