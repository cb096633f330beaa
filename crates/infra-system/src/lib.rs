// Mediafetch Infrastructure - System Adapters
// Implements: ExtractionBackend and MediaInfoSource (yt-dlp subprocess)

pub mod process;
pub mod ytdlp_args;
pub mod ytdlp_backend;
pub mod ytdlp_info;

pub use ytdlp_args::NetworkOptions;
pub use ytdlp_backend::{YtDlpBackend, YtDlpConfig};
