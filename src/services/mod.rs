pub mod backend;
pub mod capture;
pub mod checkout;
pub mod config;
pub mod debounce;
pub mod highlight;
pub mod item_registry;
pub mod links;
pub mod realtime;
pub mod region_registry;
pub mod sync;

// Re-export main types
pub use backend::MenuServer;
pub use checkout::{CheckoutSession, EntryMode};
pub use realtime::{EventChannel, KioskChannel, RecordingChannel, SocketIoChannel};
pub use sync::SyncCoordinator;
