pub mod poll_use_case;
pub mod ports;

pub use poll_use_case::{CycleOutcome, PollUseCase, SharedCache};
