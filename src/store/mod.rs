//! Counter storage for throttle state.

mod backend;
mod key;
mod memory;
mod redis;

pub use self::redis::RedisStore;
pub use backend::CounterStore;
pub use key::CounterKey;
pub use memory::MemoryStore;
