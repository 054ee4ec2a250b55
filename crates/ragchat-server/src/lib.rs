//! RAGChat server: session store, credential resolution, the chat session
//! controller and the HTTP/SSE surface around it.

pub mod controller;
pub mod credentials;
pub mod routes;
pub mod session;
pub mod state;

pub use controller::{Controller, ControllerState, PassInput, View};
pub use routes::build_router;
pub use session::{SessionContext, SessionStore};
pub use state::AppState;
