//! Domain model (ids, mutation records, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod mutation;

pub use self::errors::{HandlerError, QueueError};
pub use self::events::QueueEvent;
pub use self::ids::{ActionType, MutationId};
pub use self::mutation::{MutationStatus, NewMutation, QueuedMutation};
