mod author;
mod backend;
mod clock;
mod error;
mod event;
mod host;
mod message;
mod mode;
mod script;
mod session;

pub use author::*;
pub use backend::*;
pub use clock::*;
pub use error::*;
pub use event::*;
pub use host::*;
pub use message::*;
pub use mode::*;
pub use script::*;
pub use session::*;
