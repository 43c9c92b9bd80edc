//! Surface Code Environment - syndrome decoding as a sequential decision task
//!
//! A `d x d` grid of data qubits accumulates Pauli errors over `stack_depth`
//! time slices. The agent observes the stacked syndrome history on a
//! `(d+1) x (d+1)` stabilizer grid and applies single-qubit Pauli
//! corrections until the final syndrome is clear, or declares itself done.
//!
//! # Simplifications
//!
//! The stabilizer layout is a checkerboard over the full `(d+1) x (d+1)`
//! grid: even sites are vertices (detect X and Y), odd sites are plaquettes
//! (detect Z and Y). Logical errors are not tracked. The environment is a
//! workload for training pipelines, not a physically faithful simulator.
//!
//! ```ignore
//! use surface_code_env::{SurfaceCode, SurfaceCodeConfig};
//!
//! let mut env = SurfaceCode::new(SurfaceCodeConfig::new().with_distance(5), 42)?;
//! let state = env.reset().to_vec();
//! let outcome = env.step(0)?;
//! ```

pub mod code;
pub mod config;
pub mod env;
pub mod error;

pub use code::{decode_action, encode_action, Pauli, QubitAction};
pub use config::SurfaceCodeConfig;
pub use env::{StepOutcome, SurfaceCode};
pub use error::SurfaceCodeError;
