pub mod cartesian;
pub mod casefile;
pub mod check;
pub mod directive;
pub mod error;
pub mod fs;
pub mod host;
pub mod memory;
pub mod names;
pub mod value;
pub mod varlist;

pub use cartesian::{build_cartesian, CartesianOptions, CartesianOutcome, CartesianRequest};
pub use check::{check_inputs, CheckedInputs};
pub use directive::{Directive, ReplicaSink};
pub use error::{CartError, CartResult, ExitCode, MissingVariable, Side};
pub use host::Host;
pub use memory::{Dataset, MemoryEngine};
pub use names::NameAllocator;
pub use value::Value;
