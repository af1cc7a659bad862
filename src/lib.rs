//! # jitsdp
//!
//! Online just-in-time software defect prediction under verification
//! latency. Commits arrive in time order and must be scored immediately,
//! but their labels only become known later: when a fix lands, or once a
//! waiting time passes without one.
//!
//! ## Pipeline
//!
//! - **Events**: commits become label-availability events ([`events`])
//! - **Cleaning**: noisy late bug labels are dropped ([`noise`]) and the
//!   event stream is interleaved clean/bug ([`balance`])
//! - **Scheduling**: scoring and training alternate in timestamp order
//!   ([`schedule`])
//! - **Learning**: ORB keeps the bug-prediction rate near a target by
//!   boosting the under-predicted class ([`orb`], [`model`])
//! - **Evaluation**: prequential fading recalls and g-mean ([`metrics`])
//!
//! ```no_run
//! use jitsdp::prelude::*;
//!
//! fn main() -> jitsdp::Result<()> {
//!     let config = ExperimentConfig::default().with_dataset(Dataset::Camel);
//!     let outcome = run_experiment(&config, &JsonLinesLoader::new("data"))?;
//!     println!("g-mean: {:.3}", outcome.summary.gmean);
//!     Ok(())
//! }
//! ```

pub mod balance;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod experiment;
pub mod metrics;
pub mod model;
pub mod noise;
pub mod orb;
pub mod report;
pub mod sampling;
pub mod schedule;
pub mod threshold;

pub use error::{JitError, Result};

/// Re-exports for convenient access
pub mod prelude {
    pub use crate::config::{ExperimentConfig, ModelConfig, ModelKind};
    pub use crate::data::{
        Commit, Dataset, DatasetLoader, Event, JsonLinesLoader, PredictionRecord, SyntheticLoader,
    };
    pub use crate::error::{JitError, Result};
    pub use crate::experiment::{run_experiment, RunContext, RunOutcome};
    pub use crate::metrics::{MetricRow, Summary};
    pub use crate::model::{Classifier, Learner};
    pub use crate::orb::{Orb, OrbParams, Reweighting};
    pub use crate::schedule::{Schedule, Step};
    pub use crate::threshold::Threshold;
}
