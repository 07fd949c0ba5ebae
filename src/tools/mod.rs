mod extraction_permits;
mod ffmpeg_command;
mod ffprobe_info;
mod job_signal;
mod path_validator;

pub use extraction_permits::{ExtractionPermits, Permit};
pub use ffmpeg_command::{CommandOutput, run_command, tool_available};
pub use ffprobe_info::{VideoMetadata, get_video_metadata, parse_ffprobe_output};
pub use job_signal::JobSignal;
pub use path_validator::{ensure_directory_exists, is_non_empty_file};
