//! Type definitions

pub mod catalog;
pub mod edit;
pub mod event;
pub mod location;
pub mod messages;
pub mod money;
pub mod proposal;
pub mod snapshot;

pub use catalog::*;
pub use edit::*;
pub use event::*;
pub use location::*;
pub use messages::*;
pub use money::*;
pub use proposal::*;
pub use snapshot::*;
