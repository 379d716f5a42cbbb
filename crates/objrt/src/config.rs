//! Runtime configuration.

use objrt_log::Level;

/// Tunables for a [`Runtime`](crate::runtime::Runtime).
///
/// ```rust
/// use objrt::RuntimeConfig;
///
/// let config = RuntimeConfig::default()
///     .with_selector_buckets(256)
///     .with_eager_dispatch_tables(true);
/// assert_eq!(config.selector_buckets, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Initial bucket count of the selector table. Rounded up to a power of two.
    pub selector_buckets: usize,
    /// Grow the selector table once `len * den > buckets * num`.
    pub selector_load_factor: (usize, usize),
    /// Build dispatch tables when a class reaches `Loaded` instead of on
    /// the first message send.
    pub eager_dispatch_tables: bool,
    /// Applied to the global logger when the runtime is constructed.
    /// The logger is shared by the whole process, so this also changes
    /// the level seen by every other runtime. `None` keeps whatever
    /// `OBJRT_LOG` selected.
    pub log_level: Option<Level>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            selector_buckets: 64,
            selector_load_factor: (3, 4),
            eager_dispatch_tables: false,
            log_level: None,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_selector_buckets(mut self, buckets: usize) -> Self {
        self.selector_buckets = buckets;
        self
    }

    /// # Panics
    ///
    /// Panics if either part of the ratio is zero.
    #[must_use]
    pub fn with_selector_load_factor(mut self, num: usize, den: usize) -> Self {
        assert!(num > 0 && den > 0, "load factor must be a positive ratio");
        self.selector_load_factor = (num, den);
        self
    }

    #[must_use]
    pub fn with_eager_dispatch_tables(mut self, eager: bool) -> Self {
        self.eager_dispatch_tables = eager;
        self
    }

    #[must_use]
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.selector_buckets.max(1).next_power_of_two()
    }
}
