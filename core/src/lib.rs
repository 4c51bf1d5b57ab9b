//! # Courier Core
//!
//! Pure core of the Courier request execution engine.
//!
//! This crate holds everything about executing a request that can be decided
//! without doing I/O: the request data model, the [`RequestBuilder`](builder::RequestBuilder)
//! that turns a spec into a wire request, and the execution state machine.
//! The runtime crate owns the imperative shell that actually talks to the
//! network and to storage.
//!
//! ## Core Concepts
//!
//! - **State**: one [`Execution`](machine::Execution) per in-flight request
//! - **Action**: [`ExecutionAction`](machine::ExecutionAction), everything that can happen to an execution
//! - **Reducer**: [`ExecutionReducer`](machine::ExecutionReducer), `(State, Action, Environment) → Effects`
//! - **Effect**: descriptions of I/O for the runtime to perform
//! - **Environment**: collaborators injected via traits ([`environment`])
//!
//! ## Lifecycle
//!
//! ```text
//! Preparing ──build ok──▶ Sending ──transport done──▶ Completed
//!     │                      │
//!     └──build failed────────┴──cancel──────────────▶ Cancelled
//! ```
//!
//! `Completed` and `Cancelled` are terminal.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Request building: spec → wire request
pub mod builder;

/// Collaborator traits and the execution environment
pub mod environment;

/// Error taxonomy
pub mod error;

/// Events published by an execution
pub mod event;

/// Execution state machine and reducer
pub mod machine;

/// User-authored request model
pub mod request;

/// Transport results and response records
pub mod response;

/// Wire-level request representation
pub mod wire;

/// Reducer module - the core trait for execution logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They hold all decision logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for ExecutionReducer {
    ///     type State = Execution;
    ///     type Action = ExecutionAction;
    ///     type Environment = ExecutionEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut Execution,
    ///         action: ExecutionAction,
    ///         env: &ExecutionEnvironment,
    ///     ) -> SmallVec<[Effect<ExecutionAction>; 4]> {
    ///         match action {
    ///             ExecutionAction::Start => { /* build and send */ smallvec![] }
    ///             _ => smallvec![Effect::None],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most actions produce at most a handful of effects, so they are
        /// returned inline without a heap allocation.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects describe side effects to be performed by the runtime. They are
/// values, not execution.
pub mod effect {
    use crate::event::ExecutionEvent;
    use std::fmt;
    use std::future::Future;
    use std::pin::Pin;

    /// Identifies a cancellable effect within one execution
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EffectId(&'static str);

    impl EffectId {
        /// Create an effect identifier
        #[must_use]
        pub const fn new(name: &'static str) -> Self {
            Self(name)
        }

        /// The identifier's name
        #[must_use]
        pub const fn name(&self) -> &'static str {
            self.0
        }
    }

    impl fmt::Display for EffectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are returned from reducers
    /// and executed by the `RequestManager`.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// An effect that can later be aborted with [`Effect::Cancel`]
        Cancellable {
            /// Identifier used to cancel it
            id: EffectId,
            /// The wrapped effect
            effect: Box<Effect<Action>>,
        },

        /// Abort the running cancellable effect with this id, if any
        Cancel(EffectId),

        /// Publish an event to the execution's subscribers
        Emit(ExecutionEvent),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
                Effect::Emit(event) => f.debug_tuple("Effect::Emit").field(event).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap an effect so it can be cancelled by `id`
        #[must_use]
        pub fn cancellable(id: EffectId, effect: Self) -> Self {
            Effect::Cancellable {
                id,
                effect: Box::new(effect),
            }
        }

        /// The event this effect emits, if it is an [`Effect::Emit`]
        #[must_use]
        pub const fn as_event(&self) -> Option<&ExecutionEvent> {
            match self {
                Effect::Emit(event) => Some(event),
                _ => None,
            }
        }

        /// Short variant name, used in logs and metrics labels
        #[must_use]
        pub const fn kind(&self) -> &'static str {
            match self {
                Effect::None => "none",
                Effect::Future(_) => "future",
                Effect::Cancellable { .. } => "cancellable",
                Effect::Cancel(_) => "cancel",
                Effect::Emit(_) => "emit",
            }
        }
    }
}
