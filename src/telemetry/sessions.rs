//! Sessions: lifecycle, registry, scoping and the client service.

pub mod policy;
pub mod registry;
pub mod scope;
pub mod service;
pub mod session;

pub use policy::{EndState, SessionLifecycle};
pub use registry::SessionRegistry;
pub use service::{Client, ClientBuilder};
pub use session::{Session, SessionAnalytics, SessionOptions};
