pub mod memory;
pub mod persistence;
pub mod subscription;

pub use memory::MirrorStore;
pub use persistence::StoreSnapshotFile;
pub use subscription::{KeyState, StoreCallback, SubscriptionId};
