pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gateway;
pub mod reconciler;
pub mod recovery;
pub mod runtime;
pub mod working_set;

pub use dispatcher::{Dispatcher, DispatcherSettings, DispatcherStatus, TickOutcome};
pub use error::{EngineError, Result};
pub use events::{EventBus, LifecycleEvent, LifecycleEventKind};
pub use gateway::{
    CallbackTargets, GatewayError, HttpGateway, PlaceCallRequest, PlacedCall, TelephonyGateway,
};
pub use reconciler::{connect_instructions, ConnectInstructions, Reconciled, Reconciler};
pub use recovery::reset_stuck_leads;
pub use runtime::{spawn, DispatcherHandle, RuntimeSettings};
pub use working_set::{InFlight, WorkingSet};

#[cfg(any(test, feature = "test-support"))]
pub use gateway::{FakeGateway, PlacedCallLog};
