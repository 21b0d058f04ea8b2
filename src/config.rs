/// Default minimum body size for compression (approximately 1 MTU).
pub const DEFAULT_MIN_GZIP_SIZE: u64 = 860;

/// Default size of the gzip output scratch buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Configuration for the compression exchange core.
///
/// Responses with a known Content-Length smaller than `min_gzip_size`
/// are passed through with their exact declared length. Content types
/// matching an excluded prefix are passed through when the length is
/// unknown at commit time.
#[derive(Debug, Clone)]
pub struct GzipConfig {
    pub(crate) min_gzip_size: u64,
    pub(crate) buffer_size: usize,
    pub(crate) excluded_content_types: Vec<String>,
}

impl GzipConfig {
    /// Creates a configuration with default settings.
    ///
    /// The default minimum size for compression is 860 bytes; already
    /// compressed media families (`audio/`, `video/`, `image/`) are
    /// excluded.
    pub fn new() -> Self {
        Self {
            min_gzip_size: DEFAULT_MIN_GZIP_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            excluded_content_types: vec![
                "audio/".to_owned(),
                "video/".to_owned(),
                "image/".to_owned(),
            ],
        }
    }

    /// Sets the minimum declared body size required for compression.
    pub fn min_gzip_size(mut self, size: u64) -> Self {
        self.min_gzip_size = size;
        self
    }

    /// Sets the size of the gzip output scratch buffer.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Adds a content-type prefix to the excluded list.
    pub fn exclude_content_type(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_content_types.push(prefix.into());
        self
    }
}

impl Default for GzipConfig {
    fn default() -> Self {
        Self::new()
    }
}
