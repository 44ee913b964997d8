//! Remote command bridge for a browser-hosted molecular viewer.
//!
//! A controller process issues discrete visualization commands to a stateful
//! rendering session and deterministically retrieves a rendered snapshot
//! after each one, as if the call were a normal synchronous function. The
//! bridge turns the fire-and-forget websocket transport into blocking
//! request/response semantics:
//!
//! ```text
//! ┌────────────┐  dispatch()   ┌──────────────┐
//! │ controller │──────────────▶│  Dispatcher  │  one in-flight call
//! └────────────┘               └──────┬───────┘
//!                                     │ correlation id
//!                              ┌──────▼───────┐
//!                              │ Correlation  │  pending waiters
//!                              │    Table     │
//!                              └──────┬───────┘
//!                                     │ websocket frame
//!                              ┌──────▼───────┐
//!                              │   primary    │  Executor: render state
//!                              │   session    │  machine + snapshot
//!                              └──────────────┘
//! ```
//!
//! - **Session registry**: at most one primary session; observers are
//!   admitted read-only and promoted when the primary disconnects.
//! - **Correlation table**: responses match waiters strictly by id; a late
//!   response after its deadline resolves nothing.
//! - **Render state machine**: the closed command set as pure, deterministic
//!   transitions over one visualization state.
//! - **Snapshot encoder**: a PNG raster that is a pure function of the state.

pub mod correlate;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod registry;
pub mod render;
pub mod server;
pub mod session;
pub mod snapshot;

pub use correlate::CorrelationTable;
pub use dispatch::{DEFAULT_TIMEOUT, Dispatcher};
pub use error::{Error, Result};
pub use executor::Executor;
pub use registry::{RegistryPolicy, SessionId, SessionRegistry};
pub use render::{Camera, RenderState, StructureSource, SyntheticStructures};
pub use server::{Bridge, BridgeConfig};
pub use session::HeadlessSession;
pub use snapshot::{Snapshot, capture};
