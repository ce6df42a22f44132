pub const DEFAULT_PRELOAD_WINDOW: usize = 3;
pub const DEFAULT_PRELOAD_BYTES: u64 = 512 * 1024;
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

#[derive(Clone, Debug)]
pub struct PlayerSettings {
    /// How many upcoming tracks keep a preload handle.
    pub preload_window: usize,
    /// Bytes fetched ahead of time for each track in the window.
    pub preload_bytes: u64,
    pub initial_volume: f32,
    pub history_limit: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            preload_window: DEFAULT_PRELOAD_WINDOW,
            preload_bytes: DEFAULT_PRELOAD_BYTES,
            initial_volume: 1.0,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}
