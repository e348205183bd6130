pub mod options;
pub mod process;
pub mod reader;
pub mod supervisor;

pub use options::{TranscodeInput, TranscodeOptions, build_args};
pub use process::{ProcessExit, ProcessHandle, ProcessMonitor, process_channel};
pub use reader::{OutputGate, PipelineReader};
pub use supervisor::{FfmpegSupervisor, PipelineOutput, SpawnedPipeline, Transcoder};
