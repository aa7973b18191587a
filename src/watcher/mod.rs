pub mod reconciler;
pub mod subscription;

pub use reconciler::{run_reconciler, ReconcileReport, WatcherReconciler, WatcherSnapshot};
pub use subscription::Watcher;
