//! Core library of the shipwright cluster operation engine.
//!
//! Installing, expanding or reconfiguring a cluster is modelled as an
//! operation with a persisted plan: a tree of phases with dependency edges.
//! The [`fsm`] executes the plan phase by phase and records every state
//! transition, so an interrupted operation resumes where it stopped and a
//! failed phase can be inspected, retried or rolled back by an operator.
//!
//! - [`plan`]: deterministic plan builders for install, expand and
//!   reconfigure operations
//! - [`fsm`]: plan execution, phase dispatch and the executor contract
//! - [`phases`]: the executors for each kind of phase
//! - [`checks`]: preflight checks (hardware, OS, clock skew, disk
//!   performance, network)
//! - [`engine`]: end-to-end drivers tying configuration, plan and FSM
//!   together
//! - [`operator`]: persistence of operations, plans and progress
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use shipwright_core::{fsm::Fsm, display::PlanView, OperatorBuilder};
//! use shipwright_core::models::OperationKey;
//!
//! # async fn example(dispatch: Arc<dyn shipwright_core::fsm::Dispatch>) -> Result<(), Box<dyn std::error::Error>> {
//! let operator = Arc::new(OperatorBuilder::new().build().await?);
//! let key = OperationKey::new("system", "example.com", "op-1");
//!
//! let fsm = Fsm::new(key, operator, dispatch);
//! let plan = fsm.plan().await?;
//! let state = fsm.plan_state().await?;
//! println!("{}", PlanView::new(&plan, &state));
//!
//! fsm.resume().await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod checks;
pub mod config;
pub mod db;
pub mod display;
pub mod engine;
pub mod error;
pub mod fsm;
pub mod models;
pub mod operator;
pub mod phases;
pub mod plan;
pub mod remote;
pub mod services;

// Re-export commonly used types
pub use error::{OpsError, Result};
pub use operator::{LocalOperator, Operator, OperatorBuilder};
