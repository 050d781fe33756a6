//! External transcoder supervision
//!
//! - [`Launcher`] decides how the transcoder is invoked for each mode
//! - [`TranscoderProcess`] owns the running process and guarantees it stops

pub mod launcher;
pub mod supervisor;

pub use launcher::{FfmpegLauncher, Invocation, Launcher};
pub use supervisor::{TerminateOutcome, TranscoderProcess};
