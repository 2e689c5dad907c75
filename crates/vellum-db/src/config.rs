use std::path::PathBuf;

/// Session-level knobs. Plain data; loading them from any outer
/// configuration surface is the host's concern.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Force index paths to zero cost so the planner always prefers them.
    pub force_index_scans: bool,
    /// Directory for spilled cursor result files. `None` disables spilling.
    pub cursor_dir: Option<PathBuf>,
    /// Maximum number of live cursor files.
    pub max_open_cursors: usize,
    /// Age after which an on-disk cursor file is considered expired.
    pub cursor_ttl_secs: u64,
    /// Background cleanup tick. `u64::MAX` disables the sweep thread.
    pub cursor_sweep_interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            force_index_scans: false,
            cursor_dir: None,
            max_open_cursors: 128,
            cursor_ttl_secs: 600,
            cursor_sweep_interval_secs: u64::MAX,
        }
    }
}
