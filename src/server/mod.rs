pub mod dispatch;
pub mod listener;
pub mod pool;
pub mod registry;
pub mod session;

pub use dispatch::{DispatchError, Dispatcher, Outcome};
pub use listener::{bind, Server};
pub use pool::WorkerPool;
pub use registry::{SessionHandle, SessionId, SessionRegistry};
pub use session::SessionContext;
